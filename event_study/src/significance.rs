//! Hypothesis tests over abnormal-return samples and the run-wide
//! multiple-comparison correction.
//!
//! - [`one_sample_t`]: mean abnormal return against zero (Student's t).
//! - [`two_sample_t`]: treatment vs control or one sentiment group vs another,
//!   pooled-variance by default, Welch on request.
//! - [`sign_test`]: share of positive values against a fair coin (exact binomial).
//! - [`apply_correction`]: Bonferroni over every p-value computed in a run.
//!
//! Degenerate samples (fewer than two values, zero variance) produce no test
//! rather than an infinite statistic.

use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, ContinuousCDF, DiscreteCDF, StudentsT};

use crate::models::window_spec::Alternative;
use crate::stats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    None,
    #[default]
    Bonferroni,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoSampleKind {
    /// Equal-variance Student's t.
    #[default]
    Pooled,
    /// Unequal-variance t with Welch–Satterthwaite degrees of freedom.
    Welch,
}

/// Raw and corrected p-value of one test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PValue {
    pub raw: f64,
    /// Filled in by [`apply_correction`].
    pub adjusted: Option<f64>,
    pub significant: Option<bool>,
}

impl PValue {
    fn new(raw: f64) -> Self {
        Self {
            raw: raw.clamp(0.0, 1.0),
            adjusted: None,
            significant: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TTest {
    pub statistic: f64,
    pub df: f64,
    pub alternative: Alternative,
    pub p: PValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignTest {
    pub positives: usize,
    /// Non-zero observations.
    pub trials: usize,
    pub proportion: f64,
    pub alternative: Alternative,
    pub p: PValue,
}

/// What the correction did to a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrectionSummary {
    pub method: Correction,
    /// Number of hypotheses tested in the run.
    pub hypotheses: usize,
    pub alpha: f64,
    pub alpha_adjusted: f64,
}

fn t_p_value(t: f64, df: f64, alternative: Alternative) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some(match alternative {
        Alternative::TwoSided => 2.0 * (1.0 - dist.cdf(t.abs())),
        Alternative::Less => dist.cdf(t),
        Alternative::Greater => 1.0 - dist.cdf(t),
    })
}

/// One-sample t-test of `mean(values) == mu0`.
pub fn one_sample_t(values: &[f64], mu0: f64, alternative: Alternative) -> Option<TTest> {
    let n = values.len();
    let sd = stats::std_dev(values)?;
    if sd == 0.0 || !sd.is_finite() {
        return None;
    }
    let t = (stats::mean(values)? - mu0) / (sd / (n as f64).sqrt());
    let df = (n - 1) as f64;
    Some(TTest {
        statistic: t,
        df,
        alternative,
        p: PValue::new(t_p_value(t, df, alternative)?),
    })
}

/// Two-sample t-test of `mean(a) == mean(b)`.
pub fn two_sample_t(a: &[f64], b: &[f64], alternative: Alternative, kind: TwoSampleKind) -> Option<TTest> {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (v1, v2) = (stats::variance(a)?, stats::variance(b)?);
    let diff = stats::mean(a)? - stats::mean(b)?;

    let (se, df) = match kind {
        TwoSampleKind::Pooled => {
            let df = n1 + n2 - 2.0;
            let sp2 = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / df;
            ((sp2 * (1.0 / n1 + 1.0 / n2)).sqrt(), df)
        }
        TwoSampleKind::Welch => {
            let (q1, q2) = (v1 / n1, v2 / n2);
            let df = (q1 + q2).powi(2) / (q1.powi(2) / (n1 - 1.0) + q2.powi(2) / (n2 - 1.0));
            ((q1 + q2).sqrt(), df)
        }
    };
    if se == 0.0 || !se.is_finite() || !df.is_finite() {
        return None;
    }
    let t = diff / se;
    Some(TTest {
        statistic: t,
        df,
        alternative,
        p: PValue::new(t_p_value(t, df, alternative)?),
    })
}

/// Exact binomial sign test of `P(value > 0) == 0.5`. Zeros are dropped.
pub fn sign_test(values: &[f64], alternative: Alternative) -> Option<SignTest> {
    let positives = values.iter().filter(|v| **v > 0.0).count();
    let trials = positives + values.iter().filter(|v| **v < 0.0).count();
    if trials == 0 {
        return None;
    }
    let dist = Binomial::new(0.5, trials as u64).ok()?;
    let k = positives as u64;
    let p_less = dist.cdf(k);
    let p_greater = if k == 0 { 1.0 } else { 1.0 - dist.cdf(k - 1) };
    let p = match alternative {
        Alternative::Less => p_less,
        Alternative::Greater => p_greater,
        Alternative::TwoSided => (2.0 * p_less.min(p_greater)).min(1.0),
    };
    Some(SignTest {
        positives,
        trials,
        proportion: positives as f64 / trials as f64,
        alternative,
        p: PValue::new(p),
    })
}

/// Bonferroni-adjusted significance level for `k` hypotheses.
pub fn bonferroni_alpha(alpha: f64, k: usize) -> f64 {
    alpha / k.max(1) as f64
}

/// Adjust every p-value of a run in place and decide significance.
pub fn apply_correction<'a>(
    pvalues: impl IntoIterator<Item = &'a mut PValue>,
    alpha: f64,
    method: Correction,
) -> CorrectionSummary {
    let mut all: Vec<&mut PValue> = pvalues.into_iter().collect();
    let k = all.len();
    let alpha_adjusted = match method {
        Correction::None => alpha,
        Correction::Bonferroni => bonferroni_alpha(alpha, k),
    };
    for p in all.iter_mut() {
        let adjusted = match method {
            Correction::None => p.raw,
            Correction::Bonferroni => (p.raw * k as f64).min(1.0),
        };
        p.adjusted = Some(adjusted);
        p.significant = Some(adjusted <= alpha);
    }
    CorrectionSummary {
        method,
        hypotheses: k,
        alpha,
        alpha_adjusted,
    }
}
