//! Human-readable rendering of a [`StudyReport`].
//!
//! Numbers are rounded to the report's `display_precision` here and nowhere
//! else; the serialized report keeps full precision.

use std::collections::BTreeMap;
use std::fmt;

use crate::returns::round_to;
use crate::significance::{PValue, TTest};
use crate::study::StudyReport;

struct Num(Option<f64>, u32);

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) if v.is_finite() => write!(f, "{:.*}", self.1 as usize, round_to(v, self.1)),
            Some(v) => write!(f, "{v}"),
            None => f.write_str("-"),
        }
    }
}

fn write_p(f: &mut fmt::Formatter<'_>, label: &str, p: &PValue, prec: u32) -> fmt::Result {
    write!(f, " {label}={}", Num(Some(p.raw), prec))?;
    if let Some(adj) = p.adjusted {
        write!(f, " adj={}", Num(Some(adj), prec))?;
    }
    if p.significant == Some(true) {
        f.write_str(" *")?;
    }
    Ok(())
}

fn write_t(f: &mut fmt::Formatter<'_>, label: &str, t: &TTest, prec: u32) -> fmt::Result {
    write!(f, " {label}: t={} df={}", Num(Some(t.statistic), prec), Num(Some(t.df), 1))?;
    write_p(f, "p", &t.p, prec)
}

impl fmt::Display for StudyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = self.display_precision;
        let mut wrote_any = false;
        let mut section = |title: &str,
                           body: &mut dyn FnMut(&mut fmt::Formatter<'_>) -> fmt::Result|
         -> fmt::Result {
            if wrote_any {
                writeln!(f)?;
            }
            writeln!(f, "{title}")?;
            writeln!(f, "{}", "-".repeat(title.len()))?;
            body(f)?;
            wrote_any = true;
            Ok(())
        };

        section("Run", &mut |f| {
            writeln!(
                f,
                "events: {} received, {} filtered out, {} studied",
                self.events_received, self.events_filtered_out, self.events_studied
            )?;
            let windows: Vec<String> = self
                .windows
                .iter()
                .map(|w| format!("{} ({} {:?})", w.name, w.offset, w.direction).to_lowercase())
                .collect();
            writeln!(f, "windows: {}", windows.join(", "))?;
            let baselines: Vec<&str> = self.baselines.iter().map(|b| b.as_str()).collect();
            writeln!(f, "baselines: {}", baselines.join(", "))?;
            if let Some(c) = &self.controls {
                writeln!(f, "controls: {} drawn, {} unmatched", c.events.len(), c.shortfall)?;
            }
            writeln!(
                f,
                "hypotheses: {}, alpha {} -> {}",
                self.correction.hypotheses,
                Num(Some(self.correction.alpha), prec),
                Num(Some(self.correction.alpha_adjusted), prec)
            )
        })?;

        if !self.stats.is_empty() {
            section("Abnormal returns", &mut |f| {
                for s in &self.stats {
                    let m = &s.summary;
                    write!(
                        f,
                        "{:?} {} {} {}: n={}/{} mean={} median={} std={} min={} max={} pos={}% neg={}%",
                        s.population,
                        s.window,
                        s.baseline.as_str(),
                        s.group,
                        m.count,
                        m.total,
                        Num(m.mean, prec),
                        Num(m.median, prec),
                        Num(m.std, prec),
                        Num(m.min, prec),
                        Num(m.max, prec),
                        Num(m.pct_positive, 1),
                        Num(m.pct_negative, 1),
                    )?;
                    if s.low_n {
                        f.write_str(" LOW_N")?;
                    }
                    writeln!(f)?;
                    if let Some(t) = &s.t_test {
                        write_t(f, "  t-test", t, prec)?;
                        writeln!(f)?;
                    }
                    if let Some(st) = &s.sign_test {
                        write!(f, "   sign: {}/{}", st.positives, st.trials)?;
                        write_p(f, "p", &st.p, prec)?;
                        writeln!(f)?;
                    }
                    if let Some(t) = &s.vs_control {
                        write_t(f, "  vs control", t, prec)?;
                        writeln!(f)?;
                    }
                }
                Ok(())
            })?;
        }

        if !self.pairwise.is_empty() {
            section("Sentiment comparisons", &mut |f| {
                for c in &self.pairwise {
                    write!(
                        f,
                        "{} {} {} (n={}) vs {} (n={}):",
                        c.window,
                        c.baseline.as_str(),
                        c.left,
                        c.left_n,
                        c.right,
                        c.right_n
                    )?;
                    write_t(f, "test", &c.test, prec)?;
                    writeln!(f)?;
                }
                Ok(())
            })?;
        }

        if let Some(st) = &self.strategy {
            section("Strategy", &mut |f| {
                let p = &st.portfolio;
                writeln!(
                    f,
                    "trades={} pnl={} mean={} win={} sharpe={} max_dd={}",
                    p.trades,
                    Num(Some(p.total_pnl), 2),
                    Num(p.mean_return, prec),
                    Num(p.win_rate, 3),
                    Num(p.sharpe, prec),
                    Num(Some(p.max_drawdown), 2),
                )?;
                if let Some(c) = &st.control_portfolio {
                    writeln!(
                        f,
                        "control trades={} pnl={} mean={} win={}",
                        c.trades,
                        Num(Some(c.total_pnl), 2),
                        Num(c.mean_return, prec),
                        Num(c.win_rate, 3),
                    )?;
                }
                if let Some(t) = &st.vs_control {
                    write_t(f, "vs control", t, prec)?;
                    writeln!(f)?;
                }
                Ok(())
            })?;
        }

        if !self.exclusions.is_empty() {
            section("Exclusions", &mut |f| {
                let mut by_reason: BTreeMap<String, usize> = BTreeMap::new();
                for e in &self.exclusions {
                    let key = match e.baseline {
                        Some(kind) => format!("{} ({})", e.reason.as_str(), kind.as_str()),
                        None => e.reason.as_str().to_string(),
                    };
                    *by_reason.entry(key).or_default() += 1;
                }
                for (reason, n) in by_reason {
                    writeln!(f, "{reason}: {n}")?;
                }
                Ok(())
            })?;
        }

        Ok(())
    }
}
