//! Timestamp → bar alignment.
//!
//! [`Resolver::resolve`] maps an arbitrary instant onto a bar index of a
//! [`PriceSeries`] with a binary search. The default policy is
//! [`AlignPolicy::NextAtOrAfter`]: an event at time `t` can only move bars
//! that close after it, so the anchor is the first bar stamped at or after
//! `t`. The other policies exist for sensitivity checks.
//!
//! Instants before the first bar or after the last bar are
//! [`Unresolved::OutOfRange`]. Instants inside a non-trading gap still
//! resolve; the elapsed gap is reported so callers can filter on it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::bar::PriceSeries;

/// Tie-break rule for instants that fall between bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignPolicy {
    /// First bar stamped at or after the instant.
    #[default]
    NextAtOrAfter,
    /// Last bar stamped at or before the instant.
    PreviousAtOrBefore,
    /// Closest bar; an exact tie goes to the later bar.
    Nearest,
}

/// A successfully aligned instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub index: usize,
    /// Absolute distance between the instant and the chosen bar.
    pub gap: Duration,
    /// `gap` is larger than the resolver's `max_gap`.
    pub gap_exceeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unresolved {
    #[error("timestamp outside series coverage")]
    OutOfRange,
}

/// Binary-search resolver over a borrowed series.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    series: &'a PriceSeries,
    policy: AlignPolicy,
    max_gap: Duration,
}

impl<'a> Resolver<'a> {
    pub fn new(series: &'a PriceSeries, policy: AlignPolicy, max_gap: Duration) -> Self {
        Self {
            series,
            policy,
            max_gap,
        }
    }

    pub fn series(&self) -> &'a PriceSeries {
        self.series
    }

    pub fn policy(&self) -> AlignPolicy {
        self.policy
    }

    /// Same series and gap limit, different policy.
    pub fn with_policy(self, policy: AlignPolicy) -> Self {
        Self { policy, ..self }
    }

    /// Resolve `ts` to a bar index. Deterministic and monotone in `ts`.
    pub fn resolve(&self, ts: DateTime<Utc>) -> Result<Resolution, Unresolved> {
        let series = self.series;
        if ts < series.first_timestamp() || ts > series.last_timestamp() {
            return Err(Unresolved::OutOfRange);
        }
        // ts <= last, so `next` is a valid index.
        let next = series.partition_at(ts);
        let exact = series.bar(next).timestamp == ts;

        let index = match self.policy {
            AlignPolicy::NextAtOrAfter => next,
            // ts >= first, so a non-exact hit has a predecessor.
            AlignPolicy::PreviousAtOrBefore if exact => next,
            AlignPolicy::PreviousAtOrBefore => next - 1,
            AlignPolicy::Nearest if exact => next,
            AlignPolicy::Nearest => {
                let after = series.bar(next).timestamp - ts;
                let before = ts - series.bar(next - 1).timestamp;
                if before < after { next - 1 } else { next }
            }
        };

        let gap = (series.bar(index).timestamp - ts).abs();
        Ok(Resolution {
            index,
            gap,
            gap_exceeded: gap > self.max_gap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SessionCalendar;
    use crate::models::bar::PriceBar;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        // 2025-04-08 is a Tuesday; EDT so 09:30 local = 13:30Z.
        Utc.with_ymd_and_hms(2025, 4, 8, h + 4, m, 0).unwrap()
    }

    fn series(times: &[DateTime<Utc>]) -> PriceSeries {
        let bars = times
            .iter()
            .enumerate()
            .map(|(i, &ts)| PriceBar {
                timestamp: ts,
                open: 100.0,
                high: 100.0,
                low: 100.0,
                close: 100.0 + i as f64,
                volume: 1,
            })
            .collect();
        PriceSeries::new(bars, SessionCalendar::default()).unwrap()
    }

    #[test]
    fn event_between_bars_goes_to_next_bar() {
        let s = series(&[t(9, 30), t(9, 35), t(9, 40)]);
        let r = Resolver::new(&s, AlignPolicy::default(), Duration::days(1));
        let res = r.resolve(t(9, 33)).unwrap();
        assert_eq!(res.index, 1);
        assert_eq!(res.gap, Duration::minutes(2));
        assert!(!res.gap_exceeded);
    }

    #[test]
    fn exact_hit_is_that_bar_for_every_policy() {
        let s = series(&[t(9, 30), t(9, 35), t(9, 40)]);
        for policy in [
            AlignPolicy::NextAtOrAfter,
            AlignPolicy::PreviousAtOrBefore,
            AlignPolicy::Nearest,
        ] {
            let r = Resolver::new(&s, policy, Duration::days(1));
            assert_eq!(r.resolve(t(9, 35)).unwrap().index, 1, "{policy:?}");
        }
    }

    #[test]
    fn previous_and_nearest_policies() {
        let s = series(&[t(9, 30), t(9, 35), t(9, 40)]);
        let prev = Resolver::new(&s, AlignPolicy::PreviousAtOrBefore, Duration::days(1));
        assert_eq!(prev.resolve(t(9, 39)).unwrap().index, 1);
        let near = Resolver::new(&s, AlignPolicy::Nearest, Duration::days(1));
        assert_eq!(near.resolve(t(9, 31)).unwrap().index, 0);
        assert_eq!(near.resolve(t(9, 34)).unwrap().index, 1);
    }

    #[test]
    fn outside_coverage_is_out_of_range() {
        let s = series(&[t(9, 30), t(9, 35), t(9, 40)]);
        let r = Resolver::new(&s, AlignPolicy::default(), Duration::days(1));
        assert_eq!(r.resolve(t(9, 41)), Err(Unresolved::OutOfRange));
        assert_eq!(r.resolve(t(9, 29)), Err(Unresolved::OutOfRange));
    }

    #[test]
    fn weekend_gap_resolves_to_monday_and_flags_gap() {
        // Friday close bar, then Monday open bar.
        let fri = Utc.with_ymd_and_hms(2025, 4, 11, 19, 55, 0).unwrap();
        let mon = Utc.with_ymd_and_hms(2025, 4, 14, 13, 30, 0).unwrap();
        let s = series(&[fri, mon]);
        let r = Resolver::new(&s, AlignPolicy::default(), Duration::days(1));
        let sat = Utc.with_ymd_and_hms(2025, 4, 12, 15, 0, 0).unwrap();
        let res = r.resolve(sat).unwrap();
        assert_eq!(res.index, 1);
        assert!(res.gap_exceeded);
    }

    proptest! {
        #[test]
        fn resolve_is_monotone(
            steps in proptest::collection::vec(1i64..240, 2..40),
            probes in proptest::collection::vec(0i64..20_000, 2..30),
            policy_ix in 0usize..3,
        ) {
            let start = t(9, 30);
            let mut times = Vec::with_capacity(steps.len());
            let mut acc = 0;
            for s in &steps {
                times.push(start + Duration::minutes(acc));
                acc += s;
            }
            let s = series(&times);
            let policy = [
                AlignPolicy::NextAtOrAfter,
                AlignPolicy::PreviousAtOrBefore,
                AlignPolicy::Nearest,
            ][policy_ix];
            let r = Resolver::new(&s, policy, Duration::days(1));

            let mut probes = probes;
            probes.sort_unstable();
            let mut last: Option<usize> = None;
            for p in probes {
                if let Ok(res) = r.resolve(start + Duration::minutes(p)) {
                    if let Some(prev) = last {
                        prop_assert!(res.index >= prev);
                    }
                    last = Some(res.index);
                }
            }
        }
    }
}
