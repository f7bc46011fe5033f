//! Event study engine: measures how a price series moves around classified,
//! timestamped events and whether that movement is statistically different
//! from normal behaviour.
//!
//! Typical use:
//!
//! 1. Load a [`config::StudyConfig`] with [`config::load_config_path`].
//! 2. Build a [`models::bar::PriceSeries`] from bars and the configured
//!    [`calendar::SessionCalendar`].
//! 3. Run [`study::EventStudy::run`] over a slice of [`models::event::Event`]s.
//!
//! The resulting [`study::StudyReport`] serializes to JSON and renders as a
//! plain-text summary through `Display`.

pub mod aggregate;
pub mod align;
pub mod baseline;
pub mod calendar;
pub mod config;
pub mod control;
pub mod errors;
pub mod io;
pub mod models;
pub mod par;
pub mod report;
pub mod returns;
pub mod significance;
pub mod stats;
pub mod strategy;
pub mod study;
pub mod window;

pub use errors::{Error, Result};
