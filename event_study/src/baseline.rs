//! Baseline (expected-return) estimators and abnormal-return assembly.
//!
//! Three estimators, independently selectable per run:
//!
//! - **prior day**: per-bar return moments over the `lookback_days` trading
//!   days before the anchor's day, scaled to the window's bar count.
//! - **pre-event**: per-bar moments over a short slice ending a few minutes
//!   before the event, scaled the same way.
//! - **population**: the distribution of the same window shape anchored at
//!   every `stride`-th bar of the series, skipping anything that overlaps an
//!   event's exclusion radius. Its mean is the expected window return and its
//!   sample std the dispersion.
//!
//! Scaling uses `mean * n` and `std * sqrt(n)` for an `n`-bar window, i.e.
//! bar returns are treated as i.i.d. Only intraday bar pairs feed the
//! per-bar moments so overnight gaps do not inflate them.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::bar::PriceSeries;
use crate::models::results::{AbnormalReturn, WindowResult};
use crate::models::window_spec::WindowSpec;
use crate::returns::{self, CarMode, ReturnMode};
use crate::stats;
use crate::window::WindowExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineKind {
    PriorDay,
    Population,
    PreEvent,
}

impl BaselineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselineKind::PriorDay => "prior_day",
            BaselineKind::Population => "population",
            BaselineKind::PreEvent => "pre_event",
        }
    }
}

/// Expected return and dispersion for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BaselineEstimate {
    /// Expected return over the whole window.
    pub expected: f64,
    /// Standard deviation of the window return under the baseline.
    pub dispersion: Option<f64>,
    /// Expected return of a single bar, used for CARs.
    pub per_bar: f64,
    pub samples: usize,
}

/// Per-bar return moments from a reference sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerBarMoments {
    pub mean: f64,
    pub std: Option<f64>,
    pub samples: usize,
}

impl PerBarMoments {
    pub fn from_returns(xs: &[f64]) -> Option<Self> {
        Some(Self {
            mean: stats::mean(xs)?,
            std: stats::std_dev(xs),
            samples: xs.len(),
        })
    }

    /// Scale to an `n`-bar window.
    pub fn scaled(&self, bars: usize) -> BaselineEstimate {
        let n = bars as f64;
        BaselineEstimate {
            expected: self.mean * n,
            dispersion: self.std.map(|s| s * n.sqrt()),
            per_bar: self.mean,
            samples: self.samples,
        }
    }
}

/// Moments over the `lookback_days` trading days preceding the anchor's day.
pub fn prior_day(
    series: &PriceSeries,
    anchor: usize,
    lookback_days: usize,
    mode: ReturnMode,
) -> Option<PerBarMoments> {
    let day = series.day_ordinal(anchor);
    if lookback_days == 0 || day < lookback_days {
        return None;
    }
    let days = series.trading_days();
    let lo = days[day - lookback_days].first;
    let hi = days[day - 1].last + 1;
    PerBarMoments::from_returns(&returns::intraday_bar_returns(series, lo..hi, mode))
}

/// Moments over bars stamped in `[t - gap - minutes, t - gap)`.
pub fn pre_event(
    series: &PriceSeries,
    event_time: DateTime<Utc>,
    minutes: u32,
    gap_minutes: u32,
    mode: ReturnMode,
) -> Option<PerBarMoments> {
    let end = event_time - Duration::minutes(gap_minutes as i64);
    let start = end - Duration::minutes(minutes as i64);
    let lo = series.partition_at(start);
    let hi = series.partition_at(end);
    PerBarMoments::from_returns(&returns::intraday_bar_returns(series, lo..hi, mode))
}

/// True if any of the sorted `events` lies within `radius` of `[lo, hi]`.
pub fn near_event(events: &[DateTime<Utc>], lo: DateTime<Utc>, hi: DateTime<Utc>, radius: Duration) -> bool {
    let i = events.partition_point(|t| *t < lo - radius);
    events.get(i).is_some_and(|t| *t <= hi + radius)
}

/// Reference distribution of `spec` anchored at every `stride`-th bar away
/// from events. `events` must be sorted.
pub fn population(
    extractor: &WindowExtractor<'_>,
    spec: &WindowSpec,
    events: &[DateTime<Utc>],
    stride: usize,
    radius: Duration,
    mode: ReturnMode,
) -> Option<BaselineEstimate> {
    let series = extractor.series();
    let stride = stride.max(1);

    let window_returns: Vec<f64> = (0..series.len())
        .step_by(stride)
        .filter_map(|anchor| {
            let (s, e) = extractor.span(anchor, spec)?;
            let (ts, te) = (series.bar(s).timestamp, series.bar(e).timestamp);
            if near_event(events, ts, te, radius) {
                return None;
            }
            returns::period_return(series.bar(s).close, series.bar(e).close, mode)
        })
        .collect();

    let bar_returns: Vec<f64> = (1..series.len())
        .filter(|&i| series.day_ordinal(i) == series.day_ordinal(i - 1))
        .filter(|&i| {
            !near_event(
                events,
                series.bar(i - 1).timestamp,
                series.bar(i).timestamp,
                radius,
            )
        })
        .filter_map(|i| returns::period_return(series.bar(i - 1).close, series.bar(i).close, mode))
        .collect();

    Some(BaselineEstimate {
        expected: stats::mean(&window_returns)?,
        dispersion: stats::std_dev(&window_returns),
        per_bar: stats::mean(&bar_returns).unwrap_or(0.0),
        samples: window_returns.len(),
    })
}

/// Net a window result against a baseline estimate.
pub fn abnormal(
    result: Arc<WindowResult>,
    kind: BaselineKind,
    estimate: Option<&BaselineEstimate>,
    series: &PriceSeries,
    mode: ReturnMode,
    car_mode: CarMode,
) -> AbnormalReturn {
    let actual = if result.is_ok() {
        result.period_return(mode)
    } else {
        None
    };
    let baseline_return = estimate.map(|e| e.expected);
    let abnormal_return = actual.zip(baseline_return).map(|(a, b)| a - b);
    let car = match (result.span(), estimate, actual) {
        (Some((s, e)), Some(est), Some(_)) => returns::car(series, s, e, est.per_bar, mode, car_mode),
        _ => None,
    };
    let z_score = match (abnormal_return, estimate.and_then(|e| e.dispersion)) {
        (Some(ar), Some(d)) if d > 0.0 => Some(ar / d),
        _ => None,
    };
    AbnormalReturn {
        result,
        baseline: kind,
        baseline_return,
        abnormal_return,
        car,
        z_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{AlignPolicy, Resolver};
    use crate::calendar::SessionCalendar;
    use crate::models::bar::PriceBar;
    use crate::models::event::Sentiment;
    use crate::models::results::{Population, WindowStatus};
    use crate::models::window_spec::{Direction, WindowOffset};
    use chrono::TimeZone;

    /// Monday gains 1 per bar, Tuesday flat, 7 bars a day from 09:30 local.
    fn series() -> PriceSeries {
        let mut bars = Vec::new();
        for (day, step) in [(7, 1.0), (8, 0.0)] {
            let open = Utc.with_ymd_and_hms(2025, 4, day, 13, 30, 0).unwrap();
            for k in 0..7 {
                let c = 100.0 + step * k as f64;
                bars.push(PriceBar {
                    timestamp: open + Duration::minutes(5 * k),
                    open: c,
                    high: c,
                    low: c,
                    close: c,
                    volume: 1,
                });
            }
        }
        PriceSeries::new(bars, SessionCalendar::default()).unwrap()
    }

    #[test]
    fn prior_day_uses_previous_session_only() {
        let s = series();
        let m = prior_day(&s, 9, 1, ReturnMode::Simple).unwrap();
        // Six intraday returns on Monday: 1/100, 1/101, ... 1/105.
        assert_eq!(m.samples, 6);
        let expect = (0..6).map(|k| 1.0 / (100.0 + k as f64)).sum::<f64>() / 6.0;
        assert!((m.mean - expect).abs() < 1e-12);
        // No day before Monday.
        assert!(prior_day(&s, 3, 1, ReturnMode::Simple).is_none());
    }

    #[test]
    fn scaling_is_linear_in_mean_and_sqrt_in_std() {
        let m = PerBarMoments {
            mean: 0.001,
            std: Some(0.002),
            samples: 10,
        };
        let e = m.scaled(4);
        assert!((e.expected - 0.004).abs() < 1e-15);
        assert!((e.dispersion.unwrap() - 0.004).abs() < 1e-15);
        assert_eq!(e.per_bar, 0.001);
    }

    #[test]
    fn pre_event_slice_excludes_the_last_minutes() {
        let s = series();
        // Event Monday 10:00 local: slice [09:25, 09:55) holds bars 09:30..09:50.
        let t = Utc.with_ymd_and_hms(2025, 4, 7, 14, 0, 0).unwrap();
        let m = pre_event(&s, t, 30, 5, ReturnMode::Simple).unwrap();
        assert_eq!(m.samples, 4);
    }

    #[test]
    fn population_skips_event_neighbourhood() {
        let s = series();
        let resolver = Resolver::new(&s, AlignPolicy::default(), Duration::days(1));
        let ex = WindowExtractor::new(resolver, None);
        let spec = WindowSpec::new("post_1b", WindowOffset::Bars(1), Direction::Post);
        // An event on Monday with a wide radius leaves only Tuesday's flat bars.
        let ev = [Utc.with_ymd_and_hms(2025, 4, 7, 13, 45, 0).unwrap()];
        let est = population(&ex, &spec, &ev, 1, Duration::minutes(60), ReturnMode::Simple).unwrap();
        assert_eq!(est.expected, 0.0);
        assert_eq!(est.per_bar, 0.0);
        assert_eq!(est.samples, 6);
    }

    #[test]
    fn abnormal_return_and_z_score() {
        let s = series();
        let result = Arc::new(WindowResult {
            population: Population::Treatment,
            event_id: "e1".into(),
            category: "general".into(),
            sentiment: Sentiment::Neutral,
            window: "post_2b".into(),
            anchor_index: 7,
            anchor_time: s.bar(7).timestamp,
            anchor_gap_minutes: 0,
            gap_exceeded: false,
            status: WindowStatus::Ok,
            start_index: Some(7),
            end_index: Some(9),
            start_time: Some(s.bar(7).timestamp),
            end_time: Some(s.bar(9).timestamp),
            price_start: Some(100.0),
            price_end: Some(100.0),
            simple_return: Some(0.0),
            log_return: Some(0.0),
            bars_spanned: 2,
        });
        let est = PerBarMoments {
            mean: 0.01,
            std: Some(0.01),
            samples: 6,
        }
        .scaled(2);
        let ar = abnormal(result, BaselineKind::PriorDay, Some(&est), &s, ReturnMode::Simple, CarMode::Additive);
        assert!((ar.abnormal_return.unwrap() + 0.02).abs() < 1e-12);
        assert!((ar.car.unwrap() + 0.02).abs() < 1e-12);
        assert!((ar.z_score.unwrap() + 0.02 / (0.01 * 2f64.sqrt())).abs() < 1e-12);
    }

    #[test]
    fn near_event_window_edges() {
        let t = Utc.with_ymd_and_hms(2025, 4, 7, 14, 0, 0).unwrap();
        let r = Duration::minutes(10);
        assert!(near_event(&[t], t + r, t + r * 2, r));
        assert!(!near_event(&[t], t + r * 2, t + r * 3, Duration::minutes(9)));
        assert!(near_event(&[t], t - r * 3, t - r, r));
    }
}
