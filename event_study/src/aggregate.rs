//! Grouping of abnormal returns into populations and their summary statistics.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::baseline::BaselineKind;
use crate::models::results::{AbnormalReturn, Population};
use crate::significance::{SignTest, TTest};
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    All,
    Category,
    Sentiment,
}

/// Label of one population: the grouping axis plus the group's value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub grouping: Grouping,
    pub label: String,
}

impl GroupKey {
    pub fn all() -> Self {
        Self {
            grouping: Grouping::All,
            label: "all".into(),
        }
    }

    pub fn of(grouping: Grouping, row: &AbnormalReturn) -> Self {
        let label = match grouping {
            Grouping::All => "all".to_string(),
            Grouping::Category => row.result.category.to_lowercase(),
            Grouping::Sentiment => row.result.sentiment.as_str().to_string(),
        };
        Self { grouping, label }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.grouping {
            Grouping::All => f.write_str("all"),
            Grouping::Category => write!(f, "category={}", self.label),
            Grouping::Sentiment => write!(f, "sentiment={}", self.label),
        }
    }
}

/// Descriptive statistics of one population's abnormal returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    /// Rows in the population, usable or not.
    pub total: usize,
    /// Rows with a defined abnormal return.
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Percent (0..=100) of usable values above zero.
    pub pct_positive: Option<f64>,
    /// Percent (0..=100) of usable values below zero.
    pub pct_negative: Option<f64>,
}

impl Summary {
    pub fn from_values(values: &[f64], total: usize) -> Self {
        let n = values.len();
        let share = |pred: fn(&f64) -> bool| {
            (n > 0).then(|| 100.0 * values.iter().filter(|v| pred(*v)).count() as f64 / n as f64)
        };
        Self {
            total,
            count: n,
            mean: stats::mean(values),
            median: stats::median(values),
            std: stats::std_dev(values),
            min: stats::min(values),
            max: stats::max(values),
            pct_positive: share(|v| *v > 0.0),
            pct_negative: share(|v| *v < 0.0),
        }
    }
}

/// Statistics and tests for one population × window × baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPopulationStats {
    pub population: Population,
    pub window: String,
    pub baseline: BaselineKind,
    pub group: GroupKey,
    pub summary: Summary,
    /// Fewer usable values than the configured minimum sample size.
    pub low_n: bool,
    pub t_test: Option<TTest>,
    pub sign_test: Option<SignTest>,
    /// Two-sample test against the same group of the control population.
    pub vs_control: Option<TTest>,
}

/// Split rows by `grouping`, in deterministic key order.
pub fn partition<'a>(
    rows: impl IntoIterator<Item = &'a AbnormalReturn>,
    grouping: Grouping,
) -> BTreeMap<GroupKey, Vec<&'a AbnormalReturn>> {
    let mut groups: BTreeMap<GroupKey, Vec<&AbnormalReturn>> = BTreeMap::new();
    for row in rows {
        groups.entry(GroupKey::of(grouping, row)).or_default().push(row);
    }
    groups
}

/// Defined abnormal returns of a group.
pub fn values(rows: &[&AbnormalReturn]) -> Vec<f64> {
    rows.iter().filter_map(|r| r.abnormal_return).collect()
}

/// Defined abnormal returns of the rows that fall in `key`'s group.
pub fn group_values(rows: &[&AbnormalReturn], key: &GroupKey) -> Vec<f64> {
    rows.iter()
        .filter(|r| GroupKey::of(key.grouping, r) == *key)
        .filter_map(|r| r.abnormal_return)
        .collect()
}

/// Summaries for every group of `rows` (already narrowed to one window and
/// baseline). Tests are left empty for the caller to fill.
pub fn aggregate(
    rows: &[&AbnormalReturn],
    population: Population,
    window: &str,
    baseline: BaselineKind,
    groupings: &[Grouping],
    min_sample_size: usize,
) -> Vec<EventPopulationStats> {
    let mut out = Vec::new();
    for &grouping in groupings {
        for (group, members) in partition(rows.iter().copied(), grouping) {
            let vals = values(&members);
            let summary = Summary::from_values(&vals, members.len());
            out.push(EventPopulationStats {
                population,
                window: window.to_string(),
                baseline,
                group,
                low_n: summary.count < min_sample_size,
                summary,
                t_test: None,
                sign_test: None,
                vs_control: None,
            });
        }
    }
    out
}
