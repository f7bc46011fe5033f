#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use event_study::calendar::SessionCalendar;
use event_study::config::{StudyConfig, load_config_str};
use event_study::models::bar::{PriceBar, PriceSeries};
use event_study::models::event::{Event, Sentiment};

/// April 2025 is EDT, so 09:30 New York is 13:30Z.
pub fn utc(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, day, h, m, 0).unwrap()
}

pub fn bar(timestamp: DateTime<Utc>, close: f64) -> PriceBar {
    PriceBar {
        timestamp,
        open: close,
        high: close,
        low: close,
        close,
        volume: 100,
    }
}

/// 5-minute bars from the 09:30 open of each `(day, closes)` entry.
pub fn session_series(days: &[(u32, Vec<f64>)]) -> PriceSeries {
    let mut bars = Vec::new();
    for (day, closes) in days {
        let open = utc(*day, 13, 30);
        for (k, c) in closes.iter().enumerate() {
            bars.push(bar(open + Duration::minutes(5 * k as i64), *c));
        }
    }
    PriceSeries::new(bars, SessionCalendar::default()).expect("valid series")
}

/// Full 09:30-16:00 sessions (78 bars) on every weekday of 2025-04-07..=18,
/// drifting up by 0.01 a bar with a small saw-tooth so returns vary.
pub fn two_week_series() -> PriceSeries {
    let days: Vec<(u32, Vec<f64>)> = [7, 8, 9, 10, 11, 14, 15, 16, 17, 18]
        .into_iter()
        .enumerate()
        .map(|(d, day)| {
            let closes = (0..78)
                .map(|k| 100.0 + 0.01 * (d * 78 + k) as f64 + if k % 3 == 0 { 0.05 } else { 0.0 })
                .collect();
            (day, closes)
        })
        .collect();
    session_series(&days)
}

pub fn event(id: &str, timestamp: DateTime<Utc>, category: &str, sentiment: Sentiment) -> Event {
    Event {
        id: id.to_string(),
        timestamp,
        category: category.to_string(),
        sentiment,
        confidence: None,
    }
}

pub fn config(toml: &str) -> StudyConfig {
    load_config_str(toml).expect("valid config")
}
