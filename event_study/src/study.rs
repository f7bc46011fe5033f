//! The study runner: one entry point that wires every component together.
//!
//! Per-event work (anchor resolution, window extraction, baselines, abnormal
//! returns, trades) runs through [`par::map_slice`] over a shared
//! `&PriceSeries`; each event fills its own output slot, so results come back
//! in input order whether or not the `parallel` feature is on. Aggregation,
//! significance testing and the run-wide correction start only once every row
//! exists.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::{self, EventPopulationStats, Grouping};
use crate::align::Resolver;
use crate::baseline::{self, BaselineEstimate, BaselineKind};
use crate::config::StudyConfig;
use crate::control::{ControlSample, ControlSampler};
use crate::errors::{Error, Result};
use crate::models::bar::PriceSeries;
use crate::models::event::Event;
use crate::models::results::{AbnormalReturn, Exclusion, ExclusionReason, Population, WindowResult};
use crate::models::window_spec::{Alternative, WindowSpec};
use crate::par;
use crate::significance::{self, CorrectionSummary, PValue, TTest};
use crate::strategy::{self, PortfolioMetrics, StrategySimulator, Trade};
use crate::window::WindowExtractor;

/// Two sentiment groups compared against each other.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairwiseComparison {
    pub window: String,
    pub baseline: BaselineKind,
    pub left: String,
    pub right: String,
    pub left_n: usize,
    pub right_n: usize,
    pub test: TTest,
}

/// Shared population benchmark of one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationBenchmark {
    pub window: String,
    pub estimate: Option<BaselineEstimate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    pub trades: Vec<Trade>,
    pub portfolio: PortfolioMetrics,
    pub control_trades: Vec<Trade>,
    pub control_portfolio: Option<PortfolioMetrics>,
    /// Per-trade returns, treatment vs control.
    pub vs_control: Option<TTest>,
}

/// Everything a run produces. Serializes to a stable JSON document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyReport {
    pub windows: Vec<WindowSpec>,
    pub baselines: Vec<BaselineKind>,
    pub events_received: usize,
    pub events_filtered_out: usize,
    pub events_studied: usize,
    pub window_results: Vec<Arc<WindowResult>>,
    pub abnormal_returns: Vec<AbnormalReturn>,
    pub population_benchmarks: Vec<PopulationBenchmark>,
    pub controls: Option<ControlSample>,
    pub stats: Vec<EventPopulationStats>,
    pub pairwise: Vec<PairwiseComparison>,
    pub strategy: Option<StrategyReport>,
    pub correction: CorrectionSummary,
    pub exclusions: Vec<Exclusion>,
    pub display_precision: u32,
}

impl StudyReport {
    pub fn stats_for<'r>(
        &'r self,
        population: Population,
        window: &'r str,
        baseline: BaselineKind,
    ) -> impl Iterator<Item = &'r EventPopulationStats> + 'r {
        self.stats.iter().filter(move |s| {
            s.population == population && s.window == window && s.baseline == baseline
        })
    }
}

#[derive(Default)]
struct Measured {
    results: Vec<Arc<WindowResult>>,
    abnormal: Vec<AbnormalReturn>,
    exclusions: Vec<Exclusion>,
}

impl Measured {
    fn absorb(&mut self, other: Measured) {
        self.results.extend(other.results);
        self.abnormal.extend(other.abnormal);
        self.exclusions.extend(other.exclusions);
    }
}

/// A configured study over one price series.
pub struct EventStudy<'a> {
    series: &'a PriceSeries,
    config: &'a StudyConfig,
    windows: Vec<WindowSpec>,
    extractor: WindowExtractor<'a>,
}

impl<'a> EventStudy<'a> {
    /// `config` is expected to have gone through
    /// [`load_config_str`](crate::config::load_config_str) or equivalent.
    pub fn new(series: &'a PriceSeries, config: &'a StudyConfig) -> Self {
        let resolver = Resolver::new(series, config.alignment.policy, config.alignment.max_gap());
        Self {
            series,
            config,
            windows: config.window_specs(),
            extractor: WindowExtractor::new(resolver, config.alignment.target_tolerance()),
        }
    }

    pub fn run(&self, events: &[Event]) -> Result<StudyReport> {
        let cfg = self.config;

        let mut seen = BTreeSet::new();
        for e in events {
            if !seen.insert(e.id.as_str()) {
                return Err(Error::DuplicateEventId(e.id.clone()));
            }
        }

        let studied: Vec<Event> = events.iter().filter(|e| cfg.filter.matches(e)).cloned().collect();
        info!(
            received = events.len(),
            studied = studied.len(),
            windows = self.windows.len(),
            bars = self.series.len(),
            "starting event study"
        );

        // Filtered-out events still move the market, so every real event
        // counts when keeping reference windows and controls away from news.
        let mut real_times: Vec<DateTime<Utc>> = events.iter().map(|e| e.timestamp).collect();
        real_times.sort_unstable();

        let benchmarks = self.population_benchmarks(&real_times);
        let estimates: Vec<Option<BaselineEstimate>> = benchmarks.iter().map(|b| b.estimate).collect();

        let mut measured = self.measure(&studied, Population::Treatment, &estimates);

        let controls = cfg
            .control
            .enabled
            .then(|| ControlSampler::new(self.series, &cfg.control).sample(&studied, &real_times));
        if let Some(sample) = &controls {
            measured.absorb(self.measure(&sample.events, Population::Control, &estimates));
        }

        let mut stats = Vec::new();
        let mut pairwise = Vec::new();
        for spec in &self.windows {
            for &kind in &cfg.baseline.modes {
                let (s, p) = self.aggregate_window(&measured.abnormal, spec, kind, controls.is_some());
                stats.extend(s);
                pairwise.extend(p);
            }
        }

        let mut strategy = cfg.strategy.as_ref().map(|s| {
            let sim = StrategySimulator::new(self.extractor, s);
            let (trades, skipped) = self.simulate(&sim, &studied, Population::Treatment);
            measured.exclusions.extend(skipped);
            let (control_trades, control_skipped) = match &controls {
                Some(sample) => self.simulate(&sim, &sample.events, Population::Control),
                None => (Vec::new(), Vec::new()),
            };
            measured.exclusions.extend(control_skipped);

            let vs_control = significance::two_sample_t(
                &trade_returns(&trades),
                &trade_returns(&control_trades),
                Alternative::TwoSided,
                cfg.significance.two_sample,
            );
            StrategyReport {
                portfolio: strategy::portfolio(&trades, s.periods_per_year),
                control_portfolio: controls
                    .is_some()
                    .then(|| strategy::portfolio(&control_trades, s.periods_per_year)),
                trades,
                control_trades,
                vs_control,
            }
        });

        let mut pvalues: Vec<&mut PValue> = Vec::new();
        for s in &mut stats {
            if let Some(t) = &mut s.t_test {
                pvalues.push(&mut t.p);
            }
            if let Some(t) = &mut s.sign_test {
                pvalues.push(&mut t.p);
            }
            if let Some(t) = &mut s.vs_control {
                pvalues.push(&mut t.p);
            }
        }
        for c in &mut pairwise {
            pvalues.push(&mut c.test.p);
        }
        if let Some(t) = strategy.as_mut().and_then(|s| s.vs_control.as_mut()) {
            pvalues.push(&mut t.p);
        }
        let correction = significance::apply_correction(
            pvalues,
            cfg.significance.alpha,
            cfg.significance.correction,
        );

        if !measured.exclusions.is_empty() {
            warn!(
                exclusions = measured.exclusions.len(),
                "some event windows produced no usable return"
            );
        }
        info!(
            results = measured.results.len(),
            populations = stats.len(),
            hypotheses = correction.hypotheses,
            alpha_adjusted = correction.alpha_adjusted,
            "event study finished"
        );

        Ok(StudyReport {
            windows: self.windows.clone(),
            baselines: cfg.baseline.modes.clone(),
            events_received: events.len(),
            events_filtered_out: events.len() - studied.len(),
            events_studied: studied.len(),
            window_results: measured.results,
            abnormal_returns: measured.abnormal,
            population_benchmarks: benchmarks,
            controls,
            stats,
            pairwise,
            strategy,
            correction,
            exclusions: measured.exclusions,
            display_precision: cfg.returns.display_precision,
        })
    }

    /// One benchmark per window when the population baseline is selected.
    /// `real_times` must be sorted.
    fn population_benchmarks(&self, real_times: &[DateTime<Utc>]) -> Vec<PopulationBenchmark> {
        let cfg = &self.config.baseline;
        if !cfg.modes.contains(&BaselineKind::Population) {
            return self
                .windows
                .iter()
                .map(|w| PopulationBenchmark {
                    window: w.name.clone(),
                    estimate: None,
                })
                .collect();
        }
        let radius = chrono::Duration::minutes(cfg.exclusion_radius_minutes as i64);

        par::map_slice(
            &self.windows,
            |w| {
                let estimate = baseline::population(
                    &self.extractor,
                    w,
                    real_times,
                    cfg.population_stride as usize,
                    radius,
                    self.config.returns.mode,
                );
                debug!(window = %w.name, samples = estimate.map_or(0, |e| e.samples), "population benchmark");
                PopulationBenchmark {
                    window: w.name.clone(),
                    estimate,
                }
            },
            self.config.execution.sequential,
        )
    }

    fn measure(
        &self,
        events: &[Event],
        population: Population,
        estimates: &[Option<BaselineEstimate>],
    ) -> Measured {
        let per_event = par::map_slice(
            events,
            |e| self.measure_event(e, population, estimates),
            self.config.execution.sequential,
        );
        let mut out = Measured::default();
        for m in per_event {
            out.absorb(m);
        }
        out
    }

    fn measure_event(
        &self,
        event: &Event,
        population: Population,
        estimates: &[Option<BaselineEstimate>],
    ) -> Measured {
        let cfg = self.config;
        let mode = cfg.returns.mode;
        let mut out = Measured::default();

        let anchor = match self.extractor.resolver().resolve(event.timestamp) {
            Ok(a) => a,
            Err(_) => {
                warn!(event_id = %event.id, timestamp = %event.timestamp, "event outside price coverage");
                out.exclusions = self
                    .windows
                    .iter()
                    .map(|w| Exclusion {
                        population,
                        event_id: event.id.clone(),
                        window: w.name.clone(),
                        reason: ExclusionReason::OutOfRange,
                        baseline: None,
                    })
                    .collect();
                return out;
            }
        };
        if anchor.gap_exceeded {
            debug!(
                event_id = %event.id,
                gap_minutes = anchor.gap.num_minutes(),
                "anchor bar is far from the event"
            );
        }

        let modes = &cfg.baseline.modes;
        let prior = modes
            .contains(&BaselineKind::PriorDay)
            .then(|| {
                baseline::prior_day(
                    self.series,
                    anchor.index,
                    cfg.baseline.lookback_days as usize,
                    mode,
                )
            })
            .flatten();
        let pre = modes
            .contains(&BaselineKind::PreEvent)
            .then(|| {
                baseline::pre_event(
                    self.series,
                    event.timestamp,
                    cfg.baseline.pre_event_minutes,
                    cfg.baseline.pre_event_gap_minutes,
                    mode,
                )
            })
            .flatten();

        for (i, spec) in self.windows.iter().enumerate() {
            let result = Arc::new(self.extractor.extract(event, population, &anchor, spec));
            if let Some(reason) = result.status.exclusion_reason() {
                out.exclusions.push(Exclusion {
                    population,
                    event_id: event.id.clone(),
                    window: spec.name.clone(),
                    reason,
                    baseline: None,
                });
            }
            for &kind in modes {
                let estimate = match kind {
                    BaselineKind::PriorDay => prior.map(|m| m.scaled(result.bars_spanned)),
                    BaselineKind::PreEvent => pre.map(|m| m.scaled(result.bars_spanned)),
                    BaselineKind::Population => estimates.get(i).copied().flatten(),
                };
                let row = baseline::abnormal(
                    Arc::clone(&result),
                    kind,
                    estimate.as_ref(),
                    self.series,
                    mode,
                    cfg.returns.car,
                );
                if result.is_ok() && row.baseline_return.is_none() {
                    debug!(event_id = %event.id, window = %spec.name, baseline = kind.as_str(), "no baseline reference data");
                    out.exclusions.push(Exclusion {
                        population,
                        event_id: event.id.clone(),
                        window: spec.name.clone(),
                        reason: ExclusionReason::NoBaseline,
                        baseline: Some(kind),
                    });
                }
                out.abnormal.push(row);
            }
            out.results.push(result);
        }
        out
    }

    fn aggregate_window(
        &self,
        rows: &[AbnormalReturn],
        spec: &WindowSpec,
        kind: BaselineKind,
        with_controls: bool,
    ) -> (Vec<EventPopulationStats>, Vec<PairwiseComparison>) {
        let sig = &self.config.significance;
        let select = |population: Population| {
            rows.iter()
                .filter(|r| {
                    r.result.population == population && r.result.window == spec.name && r.baseline == kind
                })
                .collect::<Vec<_>>()
        };
        let treated = select(Population::Treatment);
        let control = select(Population::Control);

        let mut stats = aggregate::aggregate(
            &treated,
            Population::Treatment,
            &spec.name,
            kind,
            &sig.groupings,
            sig.min_sample_size,
        );
        for s in &mut stats {
            let vals = aggregate::group_values(&treated, &s.group);
            s.t_test = significance::one_sample_t(&vals, 0.0, spec.alternative);
            s.sign_test = significance::sign_test(&vals, spec.alternative);
            if with_controls {
                let cvals = aggregate::group_values(&control, &s.group);
                s.vs_control = significance::two_sample_t(&vals, &cvals, spec.alternative, sig.two_sample);
            }
        }
        if with_controls {
            stats.extend(aggregate::aggregate(
                &control,
                Population::Control,
                &spec.name,
                kind,
                &sig.groupings,
                sig.min_sample_size,
            ));
        }

        let mut pairs = Vec::new();
        if sig.pairwise_sentiment {
            let groups: Vec<_> = aggregate::partition(treated.iter().copied(), Grouping::Sentiment)
                .into_iter()
                .map(|(k, members)| (k.label, aggregate::values(&members)))
                .collect();
            for (i, (left, lv)) in groups.iter().enumerate() {
                for (right, rv) in &groups[i + 1..] {
                    if let Some(test) =
                        significance::two_sample_t(lv, rv, Alternative::TwoSided, sig.two_sample)
                    {
                        pairs.push(PairwiseComparison {
                            window: spec.name.clone(),
                            baseline: kind,
                            left: left.clone(),
                            right: right.clone(),
                            left_n: lv.len(),
                            right_n: rv.len(),
                            test,
                        });
                    }
                }
            }
        }
        (stats, pairs)
    }

    fn simulate(
        &self,
        sim: &StrategySimulator<'_>,
        events: &[Event],
        population: Population,
    ) -> (Vec<Trade>, Vec<Exclusion>) {
        let outcomes = par::map_slice(
            events,
            |e| sim.simulate(e, population),
            self.config.execution.sequential,
        );
        let mut trades = Vec::new();
        let mut skipped = Vec::new();
        for (event, outcome) in events.iter().zip(outcomes) {
            match outcome {
                Ok(t) => trades.push(t),
                Err(reason) => skipped.push(Exclusion {
                    population,
                    event_id: event.id.clone(),
                    window: "strategy".into(),
                    reason,
                    baseline: None,
                }),
            }
        }
        (trades, skipped)
    }
}

fn trade_returns(trades: &[Trade]) -> Vec<f64> {
    trades.iter().map(|t| t.trade_return).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SessionCalendar;
    use crate::config::load_config_str;
    use crate::models::bar::PriceBar;
    use crate::models::event::Sentiment;
    use chrono::{Duration, TimeZone, Utc};

    fn series() -> PriceSeries {
        let mut bars = Vec::new();
        for day in [7, 8] {
            let open = Utc.with_ymd_and_hms(2025, 4, day, 13, 30, 0).unwrap();
            for k in 0..7 {
                let c = 100.0 + k as f64;
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

    fn ev(id: &str, h: u32, m: u32) -> Event {
        Event {
            id: id.into(),
            timestamp: Utc.with_ymd_and_hms(2025, 4, 8, h, m, 0).unwrap(),
            category: "general".into(),
            sentiment: Sentiment::Neutral,
            confidence: None,
        }
    }

    const CFG: &str = r#"
        [control]
        enabled = false
        [windows.post_2b]
        offset = "2b"
        direction = "post"
    "#;

    #[test]
    fn duplicate_ids_abort_the_run() {
        let s = series();
        let cfg = load_config_str(CFG).unwrap();
        let err = EventStudy::new(&s, &cfg)
            .run(&[ev("x", 13, 30), ev("x", 13, 35)])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEventId(id) if id == "x"));
    }

    #[test]
    fn rows_share_the_window_result() {
        let s = series();
        let cfg = load_config_str(CFG).unwrap();
        let report = EventStudy::new(&s, &cfg).run(&[ev("a", 13, 32)]).unwrap();
        assert_eq!(report.window_results.len(), 1);
        assert_eq!(report.abnormal_returns.len(), 1);
        assert!(Arc::ptr_eq(
            &report.window_results[0],
            &report.abnormal_returns[0].result
        ));
        // 13:32Z -> 13:35Z bar (index 8), +2 bars.
        assert_eq!(report.window_results[0].span(), Some((8, 10)));
        assert!(report.strategy.is_none());
        assert!(report.controls.is_none());
    }

    #[test]
    fn filter_drops_events_before_measurement() {
        let s = series();
        let cfg = load_config_str(&format!("[filter]\nsentiments = [\"aggressive\"]\n{CFG}")).unwrap();
        let report = EventStudy::new(&s, &cfg).run(&[ev("a", 13, 32)]).unwrap();
        assert_eq!(report.events_filtered_out, 1);
        assert!(report.window_results.is_empty());
    }
}
