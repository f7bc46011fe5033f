//! Window specifications: named offsets from an event anchor.
//!
//! A [`WindowOffset`] is either wall-clock (`30m`, `2h`), trading-calendar
//! (`1D` = one trading day, counted over the dates present in the data) or a
//! raw bar count (`6b`). A [`WindowSpec`] names an offset, points it before or
//! after the anchor and declares which alternative hypothesis its
//! significance tests use.
//!
//! ```
//! use event_study::models::window_spec::WindowOffset;
//!
//! let off: WindowOffset = "30m".parse().unwrap();
//! assert_eq!(off, WindowOffset::Minutes(30));
//! assert_eq!(off.to_string(), "30m");
//! ```

use std::{fmt, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Distance from the anchor bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WindowOffset {
    /// Wall-clock minutes.
    Minutes(u32),
    /// Wall-clock hours.
    Hours(u32),
    /// Trading days; lands on the close (last bar) of the target day.
    TradingDays(u32),
    /// Raw bars.
    Bars(u32),
}

impl WindowOffset {
    pub fn amount(&self) -> u32 {
        match *self {
            WindowOffset::Minutes(n)
            | WindowOffset::Hours(n)
            | WindowOffset::TradingDays(n)
            | WindowOffset::Bars(n) => n,
        }
    }

    /// Wall-clock length, for duration offsets only.
    pub fn as_duration(&self) -> Option<Duration> {
        match *self {
            WindowOffset::Minutes(n) => Some(Duration::minutes(n as i64)),
            WindowOffset::Hours(n) => Some(Duration::hours(n as i64)),
            WindowOffset::TradingDays(_) | WindowOffset::Bars(_) => None,
        }
    }
}

/// Display/parse for config ergonomics (`"30m"`, `"2h"`, `"1D"`, `"6b"`).
impl fmt::Display for WindowOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let u = match self {
            WindowOffset::Minutes(_) => "m",
            WindowOffset::Hours(_) => "h",
            WindowOffset::TradingDays(_) => "D",
            WindowOffset::Bars(_) => "b",
        };
        write!(f, "{}{u}", self.amount())
    }
}

impl FromStr for WindowOffset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() < 2 || !s.is_char_boundary(s.len() - 1) {
            return Err(Error::InvalidConfig(format!("bad window offset '{s}'")));
        }
        let (digits, unit) = s.split_at(s.len() - 1);
        let amount: u32 = digits
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("bad window offset amount '{s}'")))?;
        match unit {
            "m" => Ok(WindowOffset::Minutes(amount)),
            "h" => Ok(WindowOffset::Hours(amount)),
            "D" => Ok(WindowOffset::TradingDays(amount)),
            "b" => Ok(WindowOffset::Bars(amount)),
            _ => Err(Error::InvalidConfig(format!(
                "unknown window offset unit '{unit}' in '{s}' (use m, h, D or b)"
            ))),
        }
    }
}

impl TryFrom<String> for WindowOffset {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<WindowOffset> for String {
    fn from(o: WindowOffset) -> Self {
        o.to_string()
    }
}

/// Which side of the anchor a window extends to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the target bar before the anchor, up to the anchor.
    Pre,
    /// From the anchor, up to the target bar after it.
    Post,
}

/// Alternative hypothesis for the window's tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alternative {
    #[default]
    TwoSided,
    /// The population mean is below the null ("price falls").
    Less,
    /// The population mean is above the null.
    Greater,
}

/// One named comparison interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSpec {
    pub name: String,
    pub offset: WindowOffset,
    pub direction: Direction,
    #[serde(default)]
    pub alternative: Alternative,
}

impl WindowSpec {
    pub fn new(name: impl Into<String>, offset: WindowOffset, direction: Direction) -> Self {
        Self {
            name: name.into(),
            offset,
            direction,
            alternative: Alternative::TwoSided,
        }
    }

    pub fn with_alternative(mut self, alternative: Alternative) -> Self {
        self.alternative = alternative;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_units() {
        assert_eq!("5m".parse::<WindowOffset>().unwrap(), WindowOffset::Minutes(5));
        assert_eq!("2h".parse::<WindowOffset>().unwrap(), WindowOffset::Hours(2));
        assert_eq!(" 10D ".parse::<WindowOffset>().unwrap(), WindowOffset::TradingDays(10));
        assert_eq!("6b".parse::<WindowOffset>().unwrap(), WindowOffset::Bars(6));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<WindowOffset>().is_err());
        assert!("m".parse::<WindowOffset>().is_err());
        assert!("5x".parse::<WindowOffset>().is_err());
        assert!("-5m".parse::<WindowOffset>().is_err());
        assert!("5é".parse::<WindowOffset>().is_err());
    }

    #[test]
    fn display_parse_roundtrip() {
        for s in ["30m", "1h", "3D", "12b"] {
            assert_eq!(s.parse::<WindowOffset>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn durations() {
        assert_eq!(WindowOffset::Hours(2).as_duration(), Some(Duration::minutes(120)));
        assert_eq!(WindowOffset::TradingDays(1).as_duration(), None);
    }

    #[test]
    fn window_spec_from_toml() {
        let spec: WindowSpec = toml::from_str(
            r#"
            name = "post_30m"
            offset = "30m"
            direction = "post"
            alternative = "less"
        "#,
        )
        .unwrap();
        assert_eq!(
            spec,
            WindowSpec::new("post_30m", WindowOffset::Minutes(30), Direction::Post)
                .with_alternative(Alternative::Less)
        );
    }
}
