//! Return arithmetic over closes.
//!
//! Every function here is total: a zero start price or a non-finite input
//! yields `None` rather than a panic or an `inf`, and callers turn that into
//! a `DivisionByZero` status.

use serde::{Deserialize, Serialize};

use crate::models::bar::PriceSeries;

/// Which return definition feeds abnormal returns and statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    /// `(p1 - p0) / p0`
    #[default]
    Simple,
    /// `ln(p1 / p0)`
    Log,
}

/// How per-bar abnormal returns accumulate into a CAR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarMode {
    /// Plain sum. CAR over `[a, c]` equals CAR over `[a, b]` plus CAR over `[b, c]`.
    #[default]
    Additive,
    /// `prod(1 + r) - 1`. Not additive across adjoining windows.
    Compounded,
}

pub fn simple_return(p0: f64, p1: f64) -> Option<f64> {
    if p0 == 0.0 || !p0.is_finite() || !p1.is_finite() {
        return None;
    }
    Some((p1 - p0) / p0)
}

pub fn log_return(p0: f64, p1: f64) -> Option<f64> {
    if p0 <= 0.0 || p1 <= 0.0 || !p0.is_finite() || !p1.is_finite() {
        return None;
    }
    Some((p1 / p0).ln())
}

pub fn period_return(p0: f64, p1: f64, mode: ReturnMode) -> Option<f64> {
    match mode {
        ReturnMode::Simple => simple_return(p0, p1),
        ReturnMode::Log => log_return(p0, p1),
    }
}

/// Close-to-close return of every bar in `start+1..=end`.
///
/// `None` entries mark bars whose predecessor closed at zero.
pub fn bar_returns(series: &PriceSeries, start: usize, end: usize, mode: ReturnMode) -> Vec<Option<f64>> {
    ((start + 1)..=end)
        .map(|i| period_return(series.bar(i - 1).close, series.bar(i).close, mode))
        .collect()
}

/// Close-to-close returns inside `range` that do not cross a trading-day
/// boundary. Undefined returns are skipped.
pub fn intraday_bar_returns(
    series: &PriceSeries,
    range: std::ops::Range<usize>,
    mode: ReturnMode,
) -> Vec<f64> {
    let lo = range.start + 1;
    (lo..range.end.min(series.len()))
        .filter(|&i| series.day_ordinal(i) == series.day_ordinal(i - 1))
        .filter_map(|i| period_return(series.bar(i - 1).close, series.bar(i).close, mode))
        .collect()
}

/// Accumulate per-bar abnormal returns.
pub fn cumulate(abnormal: &[f64], mode: CarMode) -> f64 {
    match mode {
        CarMode::Additive => abnormal.iter().sum(),
        CarMode::Compounded => abnormal.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0,
    }
}

/// Cumulative abnormal return over bars `start..=end`, subtracting
/// `expected_per_bar` from each bar's return. `None` if any bar return in the
/// span is undefined.
pub fn car(
    series: &PriceSeries,
    start: usize,
    end: usize,
    expected_per_bar: f64,
    mode: ReturnMode,
    car_mode: CarMode,
) -> Option<f64> {
    let abnormal = bar_returns(series, start, end, mode)
        .into_iter()
        .map(|r| r.map(|r| r - expected_per_bar))
        .collect::<Option<Vec<f64>>>()?;
    Some(cumulate(&abnormal, car_mode))
}

/// Round half away from zero to `places` decimals. Display only.
pub fn round_to(v: f64, places: u32) -> f64 {
    let f = 10f64.powi(places as i32);
    (v * f).round() / f
}
