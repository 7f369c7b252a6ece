//! Trading calendar for a venue that never closes.
//!
//! Sessions run midnight to 23:59 UTC, every day of the week. Calendars are
//! registered explicitly by the host application through a
//! [`CalendarRegistry`]; nothing is registered as a side effect.

use crate::domain::BinSize;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const BITMEX_CALENDAR: &str = "bitmex";

#[derive(Debug, Error, PartialEq)]
pub enum CalendarError {
    #[error("calendar '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("no calendar registered under '{0}'")]
    NotFound(String),
}

/// Static session definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingCalendar {
    pub name: String,
    /// IANA zone name. Session times are in this zone; only UTC is used here.
    pub timezone: String,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    /// Trading days, Monday first.
    pub week_mask: [bool; 7],
}

impl TradingCalendar {
    /// The exchange calendar: UTC, 00:00–23:59, seven days a week.
    pub fn bitmex() -> Self {
        Self {
            name: BITMEX_CALENDAR.to_string(),
            timezone: "UTC".to_string(),
            open_time: NaiveTime::MIN,
            close_time: NaiveTime::MIN + Duration::minutes(23 * 60 + 59),
            week_mask: [true; 7],
        }
    }

    pub fn trades_on(&self, weekday: Weekday) -> bool {
        self.week_mask[weekday.num_days_from_monday() as usize]
    }

    pub fn is_session(&self, date: NaiveDate) -> bool {
        self.trades_on(date.weekday())
    }

    /// Every session in `[start, end]`, ascending. Empty if `start > end`.
    pub fn sessions_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_session(*d))
            .collect()
    }

    pub fn session_open(&self, date: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_time(self.open_time))
    }

    /// Open time of the session's last minute bar.
    pub fn session_close(&self, date: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_time(self.close_time))
    }

    /// Minute bars in one session, both ends inclusive.
    pub fn minutes_per_session(&self) -> usize {
        ((self.close_time - self.open_time).num_minutes() + 1) as usize
    }

    pub fn bars_per_session(&self, bin_size: BinSize) -> usize {
        match bin_size {
            BinSize::OneMinute => self.minutes_per_session(),
            BinSize::OneDay => 1,
        }
    }
}

/// Name → calendar lookup owned by the host application.
#[derive(Debug, Default, Clone)]
pub struct CalendarRegistry {
    calendars: BTreeMap<String, TradingCalendar>,
}

impl CalendarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the exchange calendar.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.calendars.insert(BITMEX_CALENDAR.to_string(), TradingCalendar::bitmex());
        registry
    }

    /// Register a calendar under its name. Replacing an existing one needs `force`.
    pub fn register(&mut self, calendar: TradingCalendar, force: bool) -> Result<(), CalendarError> {
        if !force && self.calendars.contains_key(&calendar.name) {
            return Err(CalendarError::AlreadyRegistered(calendar.name));
        }
        self.calendars.insert(calendar.name.clone(), calendar);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&TradingCalendar, CalendarError> {
        self.calendars
            .get(name)
            .ok_or_else(|| CalendarError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.calendars.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn every_day_is_a_session() {
        let cal = TradingCalendar::bitmex();
        // 2019-01-05 is a Saturday, 2019-01-06 a Sunday.
        assert!(cal.is_session(date(2019, 1, 5)));
        assert!(cal.is_session(date(2019, 1, 6)));
        assert_eq!(cal.sessions_in_range(date(2019, 1, 1), date(2019, 1, 31)).len(), 31);
    }

    #[test]
    fn session_bounds_are_utc_midnight_to_2359() {
        let cal = TradingCalendar::bitmex();
        let d = date(2019, 1, 1);
        assert_eq!(cal.session_open(d), Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(cal.session_close(d), Utc.with_ymd_and_hms(2019, 1, 1, 23, 59, 0).unwrap());
        assert_eq!(cal.timezone, "UTC");
    }

    #[test]
    fn bars_per_session() {
        let cal = TradingCalendar::bitmex();
        assert_eq!(cal.minutes_per_session(), 1440);
        assert_eq!(cal.bars_per_session(BinSize::OneMinute), 1440);
        assert_eq!(cal.bars_per_session(BinSize::OneDay), 1);
    }

    #[test]
    fn inverted_range_has_no_sessions() {
        let cal = TradingCalendar::bitmex();
        assert!(cal.sessions_in_range(date(2019, 1, 2), date(2019, 1, 1)).is_empty());
    }

    #[test]
    fn week_mask_is_respected() {
        let mut cal = TradingCalendar::bitmex();
        cal.name = "weekdays".into();
        cal.week_mask = [true, true, true, true, true, false, false];
        // Mon 2019-01-07 through Sun 2019-01-13.
        assert_eq!(cal.sessions_in_range(date(2019, 1, 7), date(2019, 1, 13)).len(), 5);
        assert!(!cal.is_session(date(2019, 1, 12)));
    }

    #[test]
    fn registration_is_explicit() {
        let mut registry = CalendarRegistry::new();
        assert!(matches!(
            registry.get(BITMEX_CALENDAR),
            Err(CalendarError::NotFound(_))
        ));

        registry.register(TradingCalendar::bitmex(), false).unwrap();
        assert_eq!(registry.get(BITMEX_CALENDAR).unwrap().minutes_per_session(), 1440);
        assert_eq!(
            registry.register(TradingCalendar::bitmex(), false),
            Err(CalendarError::AlreadyRegistered(BITMEX_CALENDAR.into()))
        );
        registry.register(TradingCalendar::bitmex(), true).unwrap();
        assert_eq!(registry.names(), vec![BITMEX_CALENDAR]);
    }
}
