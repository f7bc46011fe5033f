//! Exchange session calendar and local-time helpers.
//!
//! What this module provides:
//! - [`SessionCalendar`]: an IANA zone plus regular session hours. It maps UTC
//!   instants to exchange-local trading dates, tells whether an instant falls
//!   inside the regular session, and rolls after-hours instants forward to the
//!   next session open.
//! - [`local_to_utc`]: convert a naive exchange-local timestamp to UTC across
//!   DST transitions.
//!
//! Notes:
//! - Trading days themselves come from the price data (the distinct local
//!   dates that carry bars), so exchange holidays need no hard-coded list.
//!   The calendar only knows about weekends and session hours.
//! - All stored instants are UTC. Local times only appear when bucketing by
//!   time of day / day of week and when building control timestamps.

use chrono::{
    DateTime, Datelike, Duration, MappedLocalTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
    Weekday,
};
use chrono_tz::Tz;
use thiserror::Error;

/// A local wall-clock time with no UTC instant within reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("nonexistent local time")]
pub struct LocalTimeError;

/// Convert a naive exchange-local timestamp to UTC.
///
/// An ambiguous time ("fall back") maps to the earlier instant. A skipped
/// time ("spring forward") shifts forward minute by minute, at most 2 hours,
/// to the first valid instant.
pub fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>, LocalTimeError> {
    match tz.from_local_datetime(&naive) {
        MappedLocalTime::Single(dt) | MappedLocalTime::Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
        MappedLocalTime::None => {
            let mut t = naive;
            for _ in 0..120 {
                t += Duration::minutes(1);
                if let MappedLocalTime::Single(dt) = tz.from_local_datetime(&t) {
                    return Ok(dt.with_timezone(&Utc));
                }
            }
            Err(LocalTimeError)
        }
    }
}

const US_EQUITY_OPEN: NaiveTime = match NaiveTime::from_hms_opt(9, 30, 0) {
    Some(t) => t,
    None => unreachable!(),
};
const US_EQUITY_CLOSE: NaiveTime = match NaiveTime::from_hms_opt(16, 0, 0) {
    Some(t) => t,
    None => unreachable!(),
};

/// Exchange zone and regular trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCalendar {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
}

impl Default for SessionCalendar {
    /// US equities: America/New_York, 09:30–16:00.
    fn default() -> Self {
        Self {
            tz: chrono_tz::America::New_York,
            open: US_EQUITY_OPEN,
            close: US_EQUITY_CLOSE,
        }
    }
}

impl SessionCalendar {
    /// Build a calendar. Returns `None` unless `open < close`.
    pub fn new(tz: Tz, open: NaiveTime, close: NaiveTime) -> Option<Self> {
        (open < close).then_some(Self { tz, open, close })
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn session_open(&self) -> NaiveTime {
        self.open
    }

    pub fn session_close(&self) -> NaiveTime {
        self.close
    }

    /// Exchange-local wall-clock time of an instant.
    pub fn local(&self, ts: DateTime<Utc>) -> NaiveDateTime {
        ts.with_timezone(&self.tz).naive_local()
    }

    /// Exchange-local calendar date of an instant (the bar's trading date).
    pub fn trading_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        self.local(ts).date()
    }

    pub fn is_weekday(date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// True if the instant lies in `[open, close)` on a weekday.
    pub fn in_session(&self, ts: DateTime<Utc>) -> bool {
        let local = self.local(ts);
        Self::is_weekday(local.date()) && local.time() >= self.open && local.time() < self.close
    }

    /// The session open at or after `ts` (same day if before the open, else the
    /// next weekday).
    pub fn next_session_open(&self, ts: DateTime<Utc>) -> Result<DateTime<Utc>, LocalTimeError> {
        let local = self.local(ts);
        let mut date = local.date();
        if !(Self::is_weekday(date) && local.time() < self.open) {
            date = date.succ_opt().ok_or(LocalTimeError)?;
        }
        while !Self::is_weekday(date) {
            date = date.succ_opt().ok_or(LocalTimeError)?;
        }
        local_to_utc(date.and_time(self.open), self.tz)
    }

    /// Leave in-session instants untouched and move everything else to the
    /// next session open. The flag tells whether a roll happened.
    pub fn roll_to_session(
        &self,
        ts: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, bool), LocalTimeError> {
        if self.in_session(ts) {
            Ok((ts, false))
        } else {
            Ok((self.next_session_open(ts)?, true))
        }
    }

    /// Local date + time-of-day to UTC, earliest instant on ambiguity and
    /// shifted forward across a DST gap.
    pub fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, LocalTimeError> {
        local_to_utc(date.and_time(time), self.tz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn ny_spring_forward_gap_shifts_to_3am() {
        // 02:30 on 2024-03-10 does not exist in New York.
        let tz = chrono_tz::America::New_York;
        let got = local_to_utc(naive(2024, 3, 10, 2, 30), tz).unwrap();
        assert_eq!(got, Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap());
    }

    #[test]
    fn ny_fall_back_takes_the_earlier_instant() {
        let tz = chrono_tz::America::New_York;
        assert_eq!(
            local_to_utc(naive(2024, 11, 3, 1, 30), tz).unwrap(),
            Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap()
        );
    }

    #[test]
    fn session_open_after_spring_forward_is_edt() {
        let cal = SessionCalendar::default();
        // Friday 2024-03-08 evening rolls over the DST weekend to Monday 09:30 EDT.
        let ts = Utc.with_ymd_and_hms(2024, 3, 8, 23, 0, 0).unwrap();
        assert_eq!(
            cal.next_session_open(ts).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 11, 13, 30, 0).unwrap()
        );
    }

    #[test]
    fn trading_date_uses_exchange_zone() {
        let cal = SessionCalendar::default();
        // 2025-04-08 01:00Z is still 2025-04-07 21:00 in New York (EDT).
        let ts = Utc.with_ymd_and_hms(2025, 4, 8, 1, 0, 0).unwrap();
        assert_eq!(cal.trading_date(ts), NaiveDate::from_ymd_opt(2025, 4, 7).unwrap());
    }

    #[test]
    fn session_membership() {
        let cal = SessionCalendar::default();
        // 13:30Z = 09:30 EDT on a Tuesday.
        assert!(cal.in_session(Utc.with_ymd_and_hms(2025, 4, 8, 13, 30, 0).unwrap()));
        // 20:00Z = 16:00 EDT, the close itself is outside.
        assert!(!cal.in_session(Utc.with_ymd_and_hms(2025, 4, 8, 20, 0, 0).unwrap()));
        // Saturday midday.
        assert!(!cal.in_session(Utc.with_ymd_and_hms(2025, 4, 12, 16, 0, 0).unwrap()));
    }

    #[test]
    fn friday_evening_rolls_to_monday_open() {
        let cal = SessionCalendar::default();
        // Friday 2025-04-11 18:00 EDT.
        let ts = Utc.with_ymd_and_hms(2025, 4, 11, 22, 0, 0).unwrap();
        let (rolled, moved) = cal.roll_to_session(ts).unwrap();
        assert!(moved);
        assert_eq!(rolled, Utc.with_ymd_and_hms(2025, 4, 14, 13, 30, 0).unwrap());
    }

    #[test]
    fn premarket_rolls_to_same_day_open() {
        let cal = SessionCalendar::default();
        // Tuesday 07:00 EDT.
        let ts = Utc.with_ymd_and_hms(2025, 4, 8, 11, 0, 0).unwrap();
        let (rolled, moved) = cal.roll_to_session(ts).unwrap();
        assert!(moved);
        assert_eq!(rolled, Utc.with_ymd_and_hms(2025, 4, 8, 13, 30, 0).unwrap());
    }

    #[test]
    fn in_session_instant_is_untouched() {
        let cal = SessionCalendar::default();
        let ts = Utc.with_ymd_and_hms(2025, 4, 8, 15, 0, 0).unwrap();
        assert_eq!(cal.roll_to_session(ts).unwrap(), (ts, false));
    }
}
