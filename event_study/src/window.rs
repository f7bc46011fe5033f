//! Window extraction: from an anchor bar and a [`WindowSpec`] to a
//! [`WindowResult`].
//!
//! Duration offsets go through the [`Resolver`] again (`anchor ± d`), so the
//! same alignment policy applies to both ends of a window. Trading-day offsets
//! step over the series' trading-day index and land on the close (last bar)
//! of the target day. Bar offsets are plain index arithmetic.

use chrono::Duration;

use crate::align::{Resolution, Resolver};
use crate::models::bar::PriceSeries;
use crate::models::event::Event;
use crate::models::results::{Population, WindowResult, WindowStatus};
use crate::models::window_spec::{Direction, WindowOffset, WindowSpec};
use crate::returns::{log_return, simple_return};

#[derive(Debug, Clone, Copy)]
pub struct WindowExtractor<'a> {
    resolver: Resolver<'a>,
    target_tolerance: Option<Duration>,
}

impl<'a> WindowExtractor<'a> {
    /// `target_tolerance` caps how far a duration target may land from its
    /// bar; farther targets are treated as missing data.
    pub fn new(resolver: Resolver<'a>, target_tolerance: Option<Duration>) -> Self {
        Self {
            resolver,
            target_tolerance,
        }
    }

    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    pub fn series(&self) -> &'a PriceSeries {
        self.resolver.series()
    }

    /// Bar index at the far end of the window, or `None` if the series does
    /// not reach it.
    pub fn target_index(&self, anchor: usize, offset: WindowOffset, direction: Direction) -> Option<usize> {
        let series = self.series();
        match offset {
            WindowOffset::Minutes(_) | WindowOffset::Hours(_) => {
                let d = offset.as_duration()?;
                let at = series.bar(anchor).timestamp;
                let target = match direction {
                    Direction::Pre => at.checked_sub_signed(d)?,
                    Direction::Post => at.checked_add_signed(d)?,
                };
                let res = self.resolver.resolve(target).ok()?;
                if self.target_tolerance.is_some_and(|tol| res.gap > tol) {
                    return None;
                }
                Some(res.index)
            }
            WindowOffset::TradingDays(n) => {
                let day = series.day_ordinal(anchor);
                let n = n as usize;
                let target_day = match direction {
                    Direction::Pre => day.checked_sub(n)?,
                    Direction::Post => day + n,
                };
                series.trading_days().get(target_day).map(|d| d.last)
            }
            WindowOffset::Bars(n) => {
                let n = n as usize;
                let idx = match direction {
                    Direction::Pre => anchor.checked_sub(n)?,
                    Direction::Post => anchor + n,
                };
                (idx < series.len()).then_some(idx)
            }
        }
    }

    /// `(start, end)` indices of the window, ordered in time.
    pub fn span(&self, anchor: usize, spec: &WindowSpec) -> Option<(usize, usize)> {
        let target = self.target_index(anchor, spec.offset, spec.direction)?;
        Some(match spec.direction {
            Direction::Pre => (target.min(anchor), anchor),
            Direction::Post => (anchor, target.max(anchor)),
        })
    }

    /// Measure one event over one window.
    pub fn extract(
        &self,
        event: &Event,
        population: Population,
        anchor: &Resolution,
        spec: &WindowSpec,
    ) -> WindowResult {
        let series = self.series();
        let mut out = WindowResult {
            population,
            event_id: event.id.clone(),
            category: event.category.clone(),
            sentiment: event.sentiment,
            window: spec.name.clone(),
            anchor_index: anchor.index,
            anchor_time: series.bar(anchor.index).timestamp,
            anchor_gap_minutes: anchor.gap.num_minutes(),
            gap_exceeded: anchor.gap_exceeded,
            status: WindowStatus::InsufficientData,
            start_index: None,
            end_index: None,
            start_time: None,
            end_time: None,
            price_start: None,
            price_end: None,
            simple_return: None,
            log_return: None,
            bars_spanned: 0,
        };

        let Some((start, end)) = self.span(anchor.index, spec) else {
            return out;
        };
        let (p0, p1) = (series.bar(start).close, series.bar(end).close);
        out.start_index = Some(start);
        out.end_index = Some(end);
        out.start_time = Some(series.bar(start).timestamp);
        out.end_time = Some(series.bar(end).timestamp);
        out.price_start = Some(p0);
        out.price_end = Some(p1);
        out.bars_spanned = end - start;
        out.simple_return = simple_return(p0, p1);
        out.log_return = log_return(p0, p1);
        out.status = if out.simple_return.is_some() {
            WindowStatus::Ok
        } else {
            WindowStatus::DivisionByZero
        };
        out
    }
}
