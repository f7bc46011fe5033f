//! Canonical in-memory representation of the price series under study.
//!
//! A [`PriceSeries`] owns an ordered run of [`PriceBar`]s together with the
//! [`SessionCalendar`] used to read them, and precomputes a trading-day index
//! so that "T+3 trading days" is a lookup rather than a scan. The series is
//! validated once at construction and never mutated afterwards; every
//! per-event computation borrows it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::SessionCalendar;
use crate::errors::{Error, Result};

/// A single OHLCV bar, labelled by its UTC start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// The timestamp for this bar (UTC).
    pub timestamp: DateTime<Utc>,

    /// Opening price.
    pub open: f64,

    /// Highest price during the bar interval.
    pub high: f64,

    /// Lowest price during the bar interval.
    pub low: f64,

    /// Closing price. Every return in the crate is computed from closes.
    pub close: f64,

    /// Volume traded during the bar interval.
    pub volume: u64,
}

/// One exchange-local date that carries bars, with its bar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingDay {
    pub date: NaiveDate,
    /// Index of the first bar on this date.
    pub first: usize,
    /// Index of the last bar on this date (the day's close).
    pub last: usize,
}

/// Validated, immutable bar series plus its trading-day index.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
    calendar: SessionCalendar,
    day_of_bar: Vec<usize>,
    days: Vec<TradingDay>,
}

impl PriceSeries {
    /// Validate `bars` and build the trading-day index.
    ///
    /// Errors with [`Error::InvalidSeries`] if the series is empty, timestamps
    /// are not strictly increasing, or any price is negative or not finite.
    /// A zero price is accepted; windows starting on it report a null return.
    pub fn new(bars: Vec<PriceBar>, calendar: SessionCalendar) -> Result<Self> {
        if bars.is_empty() {
            return Err(Error::InvalidSeries("series has no bars".into()));
        }
        for (i, bar) in bars.iter().enumerate() {
            for (field, v) in [
                ("open", bar.open),
                ("high", bar.high),
                ("low", bar.low),
                ("close", bar.close),
            ] {
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::InvalidSeries(format!(
                        "bar {i} at {} has invalid {field} {v}",
                        bar.timestamp
                    )));
                }
            }
            if i > 0 && bars[i - 1].timestamp >= bar.timestamp {
                return Err(Error::InvalidSeries(format!(
                    "timestamps not strictly increasing at bar {i} ({} then {})",
                    bars[i - 1].timestamp, bar.timestamp
                )));
            }
        }

        let mut day_of_bar = Vec::with_capacity(bars.len());
        let mut days: Vec<TradingDay> = Vec::new();
        for (i, bar) in bars.iter().enumerate() {
            let date = calendar.trading_date(bar.timestamp);
            match days.last_mut() {
                Some(day) if day.date == date => day.last = i,
                _ => days.push(TradingDay {
                    date,
                    first: i,
                    last: i,
                }),
            }
            day_of_bar.push(days.len() - 1);
        }

        Ok(Self {
            bars,
            calendar,
            day_of_bar,
            days,
        })
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn bar(&self, index: usize) -> &PriceBar {
        &self.bars[index]
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn calendar(&self) -> &SessionCalendar {
        &self.calendar
    }

    pub fn first_timestamp(&self) -> DateTime<Utc> {
        self.bars[0].timestamp
    }

    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.bars[self.bars.len() - 1].timestamp
    }

    /// Index of the first bar whose timestamp is `>= ts` (may equal `len()`).
    pub fn partition_at(&self, ts: DateTime<Utc>) -> usize {
        self.bars.partition_point(|b| b.timestamp < ts)
    }

    /// Trading-day ordinal of a bar.
    pub fn day_ordinal(&self, index: usize) -> usize {
        self.day_of_bar[index]
    }

    pub fn trading_days(&self) -> &[TradingDay] {
        &self.days
    }

    /// The trading day with this exchange-local date, if the series has bars on it.
    pub fn trading_day_of(&self, date: NaiveDate) -> Option<&TradingDay> {
        self.days
            .binary_search_by_key(&date, |d| d.date)
            .ok()
            .map(|i| &self.days[i])
    }
}
