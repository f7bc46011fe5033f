//! Event-driven trade simulation and portfolio metrics.
//!
//! One trade per event: enter at the close of the bar resolved for
//! `event + entry_delay` (rolled to the next session open when the instant is
//! outside the regular session), exit at the close `holding` after the entry
//! bar. Trades that cannot be filled are reported with the same reasons as
//! window exclusions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::AlignPolicy;
use crate::config::StrategyCfg;
use crate::models::event::Event;
use crate::models::results::{ExclusionReason, Population};
use crate::models::window_spec::Direction;
use crate::returns::simple_return;
use crate::stats;
use crate::window::WindowExtractor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[default]
    Long,
    Short,
}

impl Side {
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub population: Population,
    pub event_id: String,
    pub side: Side,
    /// `event + entry_delay`, before any session roll.
    pub requested_entry: DateTime<Utc>,
    pub rolled_to_session: bool,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_index: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    /// Return in the direction of the trade.
    pub trade_return: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortfolioMetrics {
    pub trades: usize,
    pub total_pnl: f64,
    pub mean_return: Option<f64>,
    pub std_return: Option<f64>,
    /// Fraction (0..=1) of trades with a strictly positive return.
    pub win_rate: Option<f64>,
    pub sharpe: Option<f64>,
    /// Largest peak-to-trough fall of cumulative P&L, in currency units.
    pub max_drawdown: f64,
}

pub struct StrategySimulator<'a> {
    extractor: WindowExtractor<'a>,
    cfg: &'a StrategyCfg,
}

impl<'a> StrategySimulator<'a> {
    pub fn new(extractor: WindowExtractor<'a>, cfg: &'a StrategyCfg) -> Self {
        Self { extractor, cfg }
    }

    pub fn simulate(&self, event: &Event, population: Population) -> Result<Trade, ExclusionReason> {
        let series = self.extractor.series();
        let delay = self.cfg.entry_delay.as_duration().unwrap_or_else(Duration::zero);
        let requested = event.timestamp + delay;

        let (entry_at, rolled) = if self.cfg.roll_to_session {
            series
                .calendar()
                .roll_to_session(requested)
                .map_err(|_| ExclusionReason::OutOfRange)?
        } else {
            (requested, false)
        };
        if rolled {
            debug!(event_id = %event.id, %requested, %entry_at, "entry rolled to session open");
        }

        // Entries never fill before the requested instant, whatever the
        // window alignment policy.
        let entry = self
            .extractor
            .resolver()
            .with_policy(AlignPolicy::NextAtOrAfter)
            .resolve(entry_at)
            .map_err(|_| ExclusionReason::OutOfRange)?
            .index;
        let exit = self
            .extractor
            .target_index(entry, self.cfg.holding, Direction::Post)
            .ok_or(ExclusionReason::InsufficientData)?;

        let (entry_bar, exit_bar) = (series.bar(entry), series.bar(exit));
        let raw = simple_return(entry_bar.close, exit_bar.close).ok_or(ExclusionReason::DivisionByZero)?;
        let trade_return = self.cfg.side.sign() * raw;

        Ok(Trade {
            population,
            event_id: event.id.clone(),
            side: self.cfg.side,
            requested_entry: requested,
            rolled_to_session: rolled,
            entry_index: entry,
            entry_time: entry_bar.timestamp,
            entry_price: entry_bar.close,
            exit_index: exit,
            exit_time: exit_bar.timestamp,
            exit_price: exit_bar.close,
            trade_return,
            pnl: self.cfg.notional * trade_return,
        })
    }
}

/// Largest fall of the running P&L below its running peak, starting flat.
pub fn max_drawdown(pnls: &[f64]) -> f64 {
    let mut equity = 0.0f64;
    let mut peak = 0.0f64;
    let mut worst = 0.0f64;
    for p in pnls {
        equity += p;
        peak = peak.max(equity);
        worst = worst.max(peak - equity);
    }
    worst
}

pub fn sharpe_ratio(returns: &[f64], periods_per_year: Option<f64>) -> Option<f64> {
    let sd = stats::std_dev(returns)?;
    if sd == 0.0 {
        return None;
    }
    let annualization = periods_per_year.map_or(1.0, f64::sqrt);
    Some(stats::mean(returns)? / sd * annualization)
}

/// Portfolio metrics over trades taken in entry-time order.
pub fn portfolio(trades: &[Trade], periods_per_year: Option<f64>) -> PortfolioMetrics {
    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by(|a, b| {
        a.entry_time
            .cmp(&b.entry_time)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
    let returns: Vec<f64> = ordered.iter().map(|t| t.trade_return).collect();
    let pnls: Vec<f64> = ordered.iter().map(|t| t.pnl).collect();
    let n = returns.len();

    PortfolioMetrics {
        trades: n,
        total_pnl: pnls.iter().sum(),
        mean_return: stats::mean(&returns),
        std_return: stats::std_dev(&returns),
        win_rate: (n > 0).then(|| returns.iter().filter(|r| **r > 0.0).count() as f64 / n as f64),
        sharpe: sharpe_ratio(&returns, periods_per_year),
        max_drawdown: max_drawdown(&pnls),
    }
}
