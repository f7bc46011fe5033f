//! Matched control-event sampling.
//!
//! Each real event contributes one control drawn from its own stratum: the
//! same exchange-local weekday and the same time-of-day bucket, on a trading
//! day that exists in the series. Candidates too close to any real event, or
//! identical to an already drawn control, are rejected and redrawn. A seeded
//! [`ChaCha8Rng`] makes the draw reproducible bit for bit.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::baseline::near_event;
use crate::config::ControlCfg;
use crate::models::bar::PriceSeries;
use crate::models::event::Event;

/// `(weekday from Monday, time-of-day bucket)` in the exchange zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Stratum {
    pub weekday: u32,
    pub bucket: u32,
}

/// Output of one sampling run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlSample {
    pub events: Vec<Event>,
    /// Events that got no control.
    pub shortfall: usize,
    /// Source event ids without a control.
    pub unmatched: Vec<String>,
    pub attempts: u64,
}

pub struct ControlSampler<'a> {
    series: &'a PriceSeries,
    cfg: &'a ControlCfg,
}

impl<'a> ControlSampler<'a> {
    pub fn new(series: &'a PriceSeries, cfg: &'a ControlCfg) -> Self {
        Self { series, cfg }
    }

    pub fn stratum_of(&self, ts: DateTime<Utc>) -> Stratum {
        let local = self.series.calendar().local(ts);
        let minute = local.hour() * 60 + local.minute();
        Stratum {
            weekday: local.weekday().num_days_from_monday(),
            bucket: minute / self.cfg.hour_bucket_minutes,
        }
    }

    /// Draw one control per event. Controls inherit the source event's
    /// category and sentiment so group-level comparisons line up.
    ///
    /// `real` holds the sorted timestamps of every real event, including
    /// ones that are not being studied; candidates near any of them are
    /// rejected.
    pub fn sample(&self, events: &[Event], real: &[DateTime<Utc>]) -> ControlSample {
        let calendar = self.series.calendar();
        let mut rng = ChaCha8Rng::seed_from_u64(self.cfg.seed);
        let radius = Duration::minutes(self.cfg.exclusion_radius_minutes as i64);
        let width = self.cfg.hour_bucket_minutes;

        let mut dates_by_weekday: BTreeMap<u32, Vec<NaiveDate>> = BTreeMap::new();
        for day in self.series.trading_days() {
            dates_by_weekday
                .entry(day.date.weekday().num_days_from_monday())
                .or_default()
                .push(day.date);
        }

        // Fixed draw order independent of input order.
        let mut order: Vec<&Event> = events.iter().collect();
        order.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let mut taken: BTreeSet<DateTime<Utc>> = BTreeSet::new();
        let mut out = Vec::with_capacity(events.len());
        let mut unmatched = Vec::new();
        let mut attempts = 0u64;

        for source in order {
            let stratum = self.stratum_of(source.timestamp);
            let Some(dates) = dates_by_weekday.get(&stratum.weekday) else {
                unmatched.push(source.id.clone());
                continue;
            };
            let lo = stratum.bucket * width;
            let hi = (lo + width).min(24 * 60);

            let mut found = None;
            for _ in 0..self.cfg.max_attempts {
                attempts += 1;
                let date = dates[rng.random_range(0..dates.len())];
                let minute = rng.random_range(lo..hi);
                let Some(time) = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0) else {
                    continue;
                };
                let Ok(ts) = calendar.to_utc(date, time) else {
                    continue;
                };
                if near_event(real, ts, ts, radius) || taken.contains(&ts) {
                    continue;
                }
                found = Some(ts);
                break;
            }

            match found {
                Some(ts) => {
                    taken.insert(ts);
                    out.push(Event {
                        id: format!("control_{:04}", out.len() + 1),
                        timestamp: ts,
                        category: source.category.clone(),
                        sentiment: source.sentiment,
                        confidence: None,
                    });
                }
                None => unmatched.push(source.id.clone()),
            }
        }

        if !unmatched.is_empty() {
            warn!(
                shortfall = unmatched.len(),
                requested = events.len(),
                "control sampler could not match every event"
            );
        }
        debug!(controls = out.len(), attempts, seed = self.cfg.seed, "controls drawn");

        ControlSample {
            events: out,
            shortfall: unmatched.len(),
            unmatched,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SessionCalendar;
    use crate::models::bar::PriceBar;
    use crate::models::event::Sentiment;
    use chrono::TimeZone;

    /// Six weeks of weekday sessions, hourly bars 09:30..15:30 local.
    fn weeks() -> PriceSeries {
        let mut bars = Vec::new();
        let mut date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 4, 11).unwrap();
        let cal = SessionCalendar::default();
        while date <= end {
            if SessionCalendar::is_weekday(date) {
                for h in 0..7 {
                    let t = NaiveTime::from_hms_opt(9 + h, 30, 0).unwrap();
                    bars.push(PriceBar {
                        timestamp: cal.to_utc(date, t).unwrap(),
                        open: 100.0,
                        high: 100.0,
                        low: 100.0,
                        close: 100.0,
                        volume: 1,
                    });
                }
            }
            date = date.succ_opt().unwrap();
        }
        PriceSeries::new(bars, cal).unwrap()
    }

    fn ev(id: &str, ts: DateTime<Utc>) -> Event {
        Event {
            id: id.into(),
            timestamp: ts,
            category: "china".into(),
            sentiment: Sentiment::Aggressive,
            confidence: None,
        }
    }

    fn times(events: &[Event]) -> Vec<DateTime<Utc>> {
        let mut t: Vec<_> = events.iter().map(|e| e.timestamp).collect();
        t.sort_unstable();
        t
    }

    fn events() -> Vec<Event> {
        vec![
            // Wed 2025-04-09 10:15 EDT.
            ev("a", Utc.with_ymd_and_hms(2025, 4, 9, 14, 15, 0).unwrap()),
            // Tue 2025-03-18 13:40 EDT.
            ev("b", Utc.with_ymd_and_hms(2025, 3, 18, 17, 40, 0).unwrap()),
        ]
    }

    #[test]
    fn controls_match_stratum_and_avoid_events() {
        let s = weeks();
        let cfg = ControlCfg::default();
        let sampler = ControlSampler::new(&s, &cfg);
        let evs = events();
        let sample = sampler.sample(&evs, &times(&evs));
        assert_eq!(sample.shortfall, 0);
        assert_eq!(sample.events.len(), 2);
        // Draw order is by timestamp: "b" first.
        let by_source = [&evs[1], &evs[0]];
        for (c, src) in sample.events.iter().zip(by_source) {
            assert_eq!(sampler.stratum_of(c.timestamp), sampler.stratum_of(src.timestamp));
            assert_eq!(c.category, "china");
            for e in &evs {
                assert!((c.timestamp - e.timestamp).abs() > Duration::days(3));
            }
        }
        assert_eq!(sample.events[0].id, "control_0001");
    }

    #[test]
    fn same_seed_same_controls() {
        let s = weeks();
        let cfg = ControlCfg::default();
        let evs = events();
        let a = ControlSampler::new(&s, &cfg).sample(&evs, &times(&evs));
        let b = ControlSampler::new(&s, &cfg).sample(&evs, &times(&evs));
        assert_eq!(a, b);
        let other = ControlCfg {
            seed: 7,
            ..ControlCfg::default()
        };
        let c = ControlSampler::new(&s, &other).sample(&evs, &times(&evs));
        assert_eq!(c.events.len(), 2);
    }

    #[test]
    fn controls_avoid_events_that_are_not_sampled_from() {
        let s = weeks();
        let cfg = ControlCfg::default();
        let sampler = ControlSampler::new(&s, &cfg);
        let evs = events();
        // A noon event on every weekday leaves no candidate outside the radius.
        let mut others = Vec::new();
        let mut date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        while date <= NaiveDate::from_ymd_opt(2025, 4, 11).unwrap() {
            if SessionCalendar::is_weekday(date) {
                others.push(s.calendar().to_utc(date, NaiveTime::from_hms_opt(12, 0, 0).unwrap()).unwrap());
            }
            date = date.succ_opt().unwrap();
        }
        let mut real = times(&evs);
        real.extend(others.iter().copied());
        real.sort_unstable();

        let sample = sampler.sample(&evs, &real);
        assert_eq!(sample.shortfall, 2);
        assert!(sample.events.is_empty());

        // Only the sources themselves block candidates when nothing else is real.
        let free = sampler.sample(&evs, &times(&evs));
        assert_eq!(free.shortfall, 0);
    }

    #[test]
    fn shortfall_is_recorded_when_no_date_qualifies() {
        let s = weeks();
        // A radius wider than the whole series excludes every candidate.
        let cfg = ControlCfg {
            exclusion_radius_minutes: 200 * 24 * 60,
            max_attempts: 50,
            ..ControlCfg::default()
        };
        let evs = events();
        let sample = ControlSampler::new(&s, &cfg).sample(&evs, &times(&evs));
        assert_eq!(sample.events.len(), 0);
        assert_eq!(sample.shortfall, 2);
        assert_eq!(sample.unmatched, ["b", "a"]);
        assert_eq!(sample.attempts, 100);
    }

    #[test]
    fn weekend_event_with_no_weekend_sessions_is_unmatched() {
        let s = weeks();
        let cfg = ControlCfg::default();
        let sat = ev("sat", Utc.with_ymd_and_hms(2025, 3, 22, 16, 0, 0).unwrap());
        let real = [sat.timestamp];
        let sample = ControlSampler::new(&s, &cfg).sample(&[sat], &real);
        assert_eq!(sample.shortfall, 1);
        assert_eq!(sample.attempts, 0);
    }
}
