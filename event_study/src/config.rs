//! Study configuration: parsing, normalization, and validation.
//!
//! A study is described by one TOML document. Every section except
//! `[windows]` has defaults, so the smallest useful file is:
//!
//! ```toml
//! [windows.post_30m]
//! offset = "30m"
//! direction = "post"
//! ```
//!
//! Key behaviors:
//! - Window names are trimmed and lowercased; two names that collide after
//!   normalization are an error, as is an empty window set.
//! - Numeric knobs are range-checked (α in (0, 1), strides and bucket widths
//!   non-zero, a parseable IANA zone and `HH:MM` session times).
//! - Window order is the file order ([`IndexMap`]), which is also the order of
//!   every per-window output.
//!
//! Entrypoints:
//! - Parse + normalize + validate from a TOML string: [`load_config_str`]
//! - Same, from a file path: [`load_config_path`]

use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::aggregate::Grouping;
use crate::align::AlignPolicy;
use crate::baseline::BaselineKind;
use crate::calendar::SessionCalendar;
use crate::errors::{Error, Result};
use crate::models::event::EventFilter;
use crate::models::window_spec::{Alternative, Direction, WindowOffset, WindowSpec};
use crate::returns::{CarMode, ReturnMode};
use crate::significance::{Correction, TwoSampleKind};
use crate::strategy::Side;

/// Top-level study configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StudyConfig {
    #[serde(default)]
    pub calendar: CalendarCfg,
    #[serde(default)]
    pub alignment: AlignmentCfg,
    #[serde(default)]
    pub returns: ReturnsCfg,
    #[serde(default)]
    pub baseline: BaselineCfg,
    /// Window name -> definition. Names are normalized by [`normalize_config`].
    pub windows: IndexMap<String, WindowCfg>,
    #[serde(default)]
    pub significance: SignificanceCfg,
    #[serde(default)]
    pub control: ControlCfg,
    /// Trading simulation; skipped when absent.
    #[serde(default)]
    pub strategy: Option<StrategyCfg>,
    #[serde(default)]
    pub filter: EventFilter,
    #[serde(default)]
    pub execution: ExecutionCfg,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct CalendarCfg {
    /// IANA zone of the exchange.
    pub timezone: String,
    /// Regular session open, `HH:MM` local.
    pub session_open: String,
    /// Regular session close, `HH:MM` local.
    pub session_close: String,
}

impl Default for CalendarCfg {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".into(),
            session_open: "09:30".into(),
            session_close: "16:00".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct AlignmentCfg {
    pub policy: AlignPolicy,
    /// Anchors farther than this from their event are flagged `gap_exceeded`.
    pub max_gap_minutes: u32,
    /// Duration targets resolved farther than this are treated as missing.
    pub target_tolerance_minutes: Option<u32>,
}

impl Default for AlignmentCfg {
    fn default() -> Self {
        Self {
            policy: AlignPolicy::default(),
            max_gap_minutes: 1440,
            target_tolerance_minutes: None,
        }
    }
}

impl AlignmentCfg {
    pub fn max_gap(&self) -> Duration {
        Duration::minutes(self.max_gap_minutes as i64)
    }

    pub fn target_tolerance(&self) -> Option<Duration> {
        self.target_tolerance_minutes
            .map(|m| Duration::minutes(m as i64))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReturnsCfg {
    pub mode: ReturnMode,
    pub car: CarMode,
    /// Decimals shown in rendered tables. Computation is never rounded.
    pub display_precision: u32,
}

impl Default for ReturnsCfg {
    fn default() -> Self {
        Self {
            mode: ReturnMode::default(),
            car: CarMode::default(),
            display_precision: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct BaselineCfg {
    /// Estimators to run; each produces its own abnormal-return rows.
    pub modes: Vec<BaselineKind>,
    /// Trading days before the anchor day used by `prior_day`.
    pub lookback_days: u32,
    /// Length of the `pre_event` slice.
    pub pre_event_minutes: u32,
    /// Minutes between the end of the `pre_event` slice and the event.
    pub pre_event_gap_minutes: u32,
    /// Every n-th bar anchors a `population` reference window.
    pub population_stride: u32,
    /// `population` reference windows this close to an event are skipped.
    pub exclusion_radius_minutes: u32,
}

impl Default for BaselineCfg {
    fn default() -> Self {
        Self {
            modes: vec![BaselineKind::PriorDay],
            lookback_days: 1,
            pre_event_minutes: 30,
            pre_event_gap_minutes: 5,
            population_stride: 1,
            exclusion_radius_minutes: 60,
        }
    }
}

/// One `[windows.<name>]` table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WindowCfg {
    pub offset: WindowOffset,
    pub direction: Direction,
    #[serde(default)]
    pub alternative: Alternative,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct SignificanceCfg {
    pub alpha: f64,
    pub correction: Correction,
    /// Populations with fewer usable values are flagged `low_n`.
    pub min_sample_size: usize,
    pub two_sample: TwoSampleKind,
    /// Compare every pair of sentiment groups.
    pub pairwise_sentiment: bool,
    pub groupings: Vec<Grouping>,
}

impl Default for SignificanceCfg {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            correction: Correction::default(),
            min_sample_size: 5,
            two_sample: TwoSampleKind::default(),
            pairwise_sentiment: true,
            groupings: vec![Grouping::All, Grouping::Category, Grouping::Sentiment],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ControlCfg {
    pub enabled: bool,
    pub seed: u64,
    /// Width of the time-of-day strata.
    pub hour_bucket_minutes: u32,
    /// Control instants this close to a real event are rejected.
    pub exclusion_radius_minutes: u32,
    /// Draws per control before giving up on its stratum.
    pub max_attempts: u32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: 42,
            hour_bucket_minutes: 60,
            exclusion_radius_minutes: 3 * 24 * 60,
            max_attempts: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct StrategyCfg {
    /// Wall-clock delay between event and entry.
    pub entry_delay: WindowOffset,
    /// Holding period from the entry bar, same grammar as windows.
    pub holding: WindowOffset,
    pub side: Side,
    pub notional: f64,
    /// Annualization factor for the Sharpe ratio.
    pub periods_per_year: Option<f64>,
    /// Move out-of-session entries to the next session open.
    pub roll_to_session: bool,
}

impl Default for StrategyCfg {
    fn default() -> Self {
        Self {
            entry_delay: WindowOffset::Minutes(0),
            holding: WindowOffset::TradingDays(1),
            side: Side::Long,
            notional: 10_000.0,
            periods_per_year: None,
            roll_to_session: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutionCfg {
    /// Run per-event work on the calling thread even when `parallel` is enabled.
    pub sequential: bool,
}

impl StudyConfig {
    /// Windows in configuration order.
    pub fn window_specs(&self) -> Vec<WindowSpec> {
        self.windows
            .iter()
            .map(|(name, w)| WindowSpec::new(name.clone(), w.offset, w.direction).with_alternative(w.alternative))
            .collect()
    }

    /// Session calendar described by `[calendar]`.
    pub fn session_calendar(&self) -> Result<SessionCalendar> {
        let tz: Tz = self.calendar.timezone.trim().parse().map_err(|_| {
            Error::InvalidConfig(format!("unknown time zone '{}'", self.calendar.timezone))
        })?;
        let open = parse_hhmm("calendar.session_open", &self.calendar.session_open)?;
        let close = parse_hhmm("calendar.session_close", &self.calendar.session_close)?;
        SessionCalendar::new(tz, open, close).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "session_open {open} must be before session_close {close}"
            ))
        })
    }
}

fn parse_hhmm(field: &str, s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| Error::InvalidConfig(format!("{field} '{s}' is not HH:MM")))
}

/// Changes made by [`normalize_config`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Window names changed by trimming/lowercasing.
    pub windows_renamed: usize,
    /// Repeated baseline modes removed.
    pub baseline_modes_deduped: usize,
}

/// Normalize a configuration in place.
///
/// - Trim + lowercase window names; reject empty names and collisions.
/// - De-duplicate `baseline.modes` and `significance.groupings`, keeping the
///   first occurrence.
pub fn normalize_config(cfg: &mut StudyConfig) -> Result<NormalizationReport> {
    let mut report = NormalizationReport::default();

    let mut rebuilt: IndexMap<String, WindowCfg> = IndexMap::new();
    for (raw, w) in std::mem::take(&mut cfg.windows) {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            return Err(Error::InvalidConfig("window name cannot be empty".into()));
        }
        if name != raw {
            report.windows_renamed += 1;
        }
        if rebuilt.contains_key(&name) {
            return Err(Error::InvalidConfig(format!(
                "duplicate window name after normalization: {name}"
            )));
        }
        rebuilt.insert(name, w);
    }
    cfg.windows = rebuilt;

    let before = cfg.baseline.modes.len();
    let mut seen = Vec::with_capacity(before);
    cfg.baseline.modes.retain(|m| {
        let fresh = !seen.contains(m);
        seen.push(*m);
        fresh
    });
    report.baseline_modes_deduped = before - cfg.baseline.modes.len();

    let mut seen = Vec::new();
    cfg.significance.groupings.retain(|g| {
        let fresh = !seen.contains(g);
        seen.push(*g);
        fresh
    });

    Ok(report)
}

/// Range-check a normalized configuration.
pub fn validate_config(cfg: &StudyConfig) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidConfig(msg));

    if cfg.windows.is_empty() {
        return invalid("at least one window is required".into());
    }
    for (name, w) in &cfg.windows {
        if w.offset.amount() == 0 {
            return invalid(format!("window '{name}' has a zero offset"));
        }
    }
    cfg.session_calendar()?;

    if cfg.baseline.modes.is_empty() {
        return invalid("baseline.modes cannot be empty".into());
    }
    if cfg.baseline.lookback_days == 0 {
        return invalid("baseline.lookback_days must be at least 1".into());
    }
    if cfg.baseline.pre_event_minutes == 0 {
        return invalid("baseline.pre_event_minutes must be at least 1".into());
    }
    if cfg.baseline.population_stride == 0 {
        return invalid("baseline.population_stride must be at least 1".into());
    }

    let alpha = cfg.significance.alpha;
    if !(alpha > 0.0 && alpha < 1.0) {
        return invalid(format!("significance.alpha must be in (0, 1), got {alpha}"));
    }
    if cfg.significance.groupings.is_empty() {
        return invalid("significance.groupings cannot be empty".into());
    }

    if cfg.control.hour_bucket_minutes == 0 || cfg.control.hour_bucket_minutes > 1440 {
        return invalid(format!(
            "control.hour_bucket_minutes must be in 1..=1440, got {}",
            cfg.control.hour_bucket_minutes
        ));
    }
    if cfg.control.max_attempts == 0 {
        return invalid("control.max_attempts must be at least 1".into());
    }

    if let Some(s) = &cfg.strategy {
        if s.entry_delay.as_duration().is_none() {
            return invalid(format!(
                "strategy.entry_delay must be minutes or hours, got '{}'",
                s.entry_delay
            ));
        }
        if s.holding.amount() == 0 {
            return invalid("strategy.holding cannot be zero".into());
        }
        if !(s.notional.is_finite() && s.notional > 0.0) {
            return invalid(format!("strategy.notional must be positive, got {}", s.notional));
        }
        if s.periods_per_year.is_some_and(|p| !(p.is_finite() && p > 0.0)) {
            return invalid("strategy.periods_per_year must be positive".into());
        }
    }

    if cfg.filter.min_confidence.is_some_and(|c| !c.is_finite()) {
        return invalid("filter.min_confidence must be finite".into());
    }
    Ok(())
}

/// Parse, normalize and validate a configuration from a TOML string.
pub fn load_config_str(toml_str: &str) -> Result<StudyConfig> {
    let mut cfg: StudyConfig = toml::from_str(toml_str)?;
    let report = normalize_config(&mut cfg)?;
    if report != NormalizationReport::default() {
        tracing::debug!(?report, "normalized study config");
    }
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Read a configuration file from disk, then [`load_config_str`].
pub fn load_config_path(path: impl AsRef<std::path::Path>) -> Result<StudyConfig> {
    let text = std::fs::read_to_string(path.as_ref())?;
    load_config_str(&text)
}
