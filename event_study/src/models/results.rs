//! Per-event, per-window measurement rows.
//!
//! These are the tabular outputs of a run: one [`WindowResult`] per
//! event × window, one [`AbnormalReturn`] per result × baseline, and one
//! [`Exclusion`] for every event × window (or event × window × baseline) that
//! produced no usable number.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::baseline::BaselineKind;
use crate::models::event::Sentiment;
use crate::returns::ReturnMode;

/// Which event set a row belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Population {
    #[default]
    Treatment,
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowStatus {
    Ok,
    /// The target bar lies outside the series (or beyond the target tolerance).
    InsufficientData,
    /// The window's start close is zero.
    DivisionByZero,
}

/// Why an event × window pair contributes nothing to the statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionReason {
    /// The event timestamp itself is outside the series.
    OutOfRange,
    InsufficientData,
    DivisionByZero,
    /// The window measured fine but the named baseline had no reference data.
    NoBaseline,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::OutOfRange => "OUT_OF_RANGE",
            ExclusionReason::InsufficientData => "INSUFFICIENT_DATA",
            ExclusionReason::DivisionByZero => "DIVISION_BY_ZERO",
            ExclusionReason::NoBaseline => "NO_BASELINE",
        }
    }
}

impl WindowStatus {
    pub fn exclusion_reason(self) -> Option<ExclusionReason> {
        match self {
            WindowStatus::Ok => None,
            WindowStatus::InsufficientData => Some(ExclusionReason::InsufficientData),
            WindowStatus::DivisionByZero => Some(ExclusionReason::DivisionByZero),
        }
    }
}

/// Audit row for something that was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub population: Population,
    pub event_id: String,
    /// Window name, or `"strategy"` for a skipped trade.
    pub window: String,
    pub reason: ExclusionReason,
    /// Set for [`ExclusionReason::NoBaseline`] rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BaselineKind>,
}

/// Raw measurement of one event over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub population: Population,
    pub event_id: String,
    pub category: String,
    pub sentiment: Sentiment,
    pub window: String,

    pub anchor_index: usize,
    pub anchor_time: DateTime<Utc>,
    /// Minutes between the event and its anchor bar.
    pub anchor_gap_minutes: i64,
    pub gap_exceeded: bool,

    pub status: WindowStatus,
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub price_start: Option<f64>,
    pub price_end: Option<f64>,
    pub simple_return: Option<f64>,
    pub log_return: Option<f64>,
    /// Number of bar-to-bar steps between start and end.
    pub bars_spanned: usize,
}

impl WindowResult {
    pub fn is_ok(&self) -> bool {
        self.status == WindowStatus::Ok
    }

    pub fn period_return(&self, mode: ReturnMode) -> Option<f64> {
        match mode {
            ReturnMode::Simple => self.simple_return,
            ReturnMode::Log => self.log_return,
        }
    }

    /// `(start, end)` bar indices when the window was measurable.
    pub fn span(&self) -> Option<(usize, usize)> {
        self.start_index.zip(self.end_index)
    }
}

/// A window result net of one baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbnormalReturn {
    #[serde(flatten)]
    pub result: Arc<WindowResult>,
    pub baseline: BaselineKind,
    pub baseline_return: Option<f64>,
    pub abnormal_return: Option<f64>,
    pub car: Option<f64>,
    pub z_score: Option<f64>,
}
