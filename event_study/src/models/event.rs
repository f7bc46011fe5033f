//! Classified events, as handed over by the upstream classifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentiment label attached to an event.
///
/// Covers both vocabularies produced upstream: the tariff-tone labels
/// (`Aggressive`, `Defensive`, `Informational`) and the market-tone labels
/// (`MARKET_FRIENDLY`, `MARKET_HOSTILE`, `NEUTRAL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    #[serde(alias = "Aggressive")]
    Aggressive,
    #[serde(alias = "Defensive")]
    Defensive,
    #[serde(alias = "Informational")]
    Informational,
    #[serde(alias = "MARKET_FRIENDLY")]
    MarketFriendly,
    #[serde(alias = "MARKET_HOSTILE")]
    MarketHostile,
    #[serde(alias = "NEUTRAL", alias = "Neutral")]
    Neutral,
    #[serde(other)]
    Unknown,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Aggressive => "aggressive",
            Sentiment::Defensive => "defensive",
            Sentiment::Informational => "informational",
            Sentiment::MarketFriendly => "market_friendly",
            Sentiment::MarketHostile => "market_hostile",
            Sentiment::Neutral => "neutral",
            Sentiment::Unknown => "unknown",
        }
    }
}

/// A timestamped, classified occurrence whose market impact is measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier (post id upstream).
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form category label, e.g. the tariff type.
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_sentiment")]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub confidence: Option<f64>,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_sentiment() -> Sentiment {
    Sentiment::Unknown
}

/// Optional pre-filter applied to the event list before a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventFilter {
    /// Keep only these categories (case-insensitive). Empty keeps all.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Keep only these sentiments. Empty keeps all.
    #[serde(default)]
    pub sentiments: Vec<Sentiment>,
    /// Drop events strictly before this instant.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    /// Drop events whose confidence is known and below this value.
    #[serde(default)]
    pub min_confidence: Option<f64>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if !self.categories.is_empty()
            && !self
                .categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&event.category))
        {
            return false;
        }
        if !self.sentiments.is_empty() && !self.sentiments.contains(&event.sentiment) {
            return false;
        }
        if self.not_before.is_some_and(|t| event.timestamp < t) {
            return false;
        }
        if let (Some(min), Some(c)) = (self.min_confidence, event.confidence) {
            if c < min {
                return false;
            }
        }
        true
    }
}
