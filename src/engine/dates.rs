use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use super::EngineError;

// ── Calendar dates ───────────────────────────────────────────────

/// A day identified only by year, month and day-of-month.
///
/// There is no time-of-day and no zone, so two parses of the same string are
/// always equal no matter where the code runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    /// Parse a strict `YYYY-MM-DD` string.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        if !has_iso_shape(s) {
            return Err(EngineError::InvalidDateFormat(s.to_string()));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| EngineError::InvalidDateFormat(s.to_string()))
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Today on the local calendar.
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    /// Inverse of [`CalendarDate::parse`].
    pub fn to_iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// 0 for Monday through 6 for Sunday.
    pub fn weekday_from_monday(&self) -> u32 {
        self.0.weekday().num_days_from_monday()
    }

    pub fn succ(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }

    /// Signed number of days from `self` to `other`.
    pub fn days_until(&self, other: &CalendarDate) -> i64 {
        (other.0 - self.0).num_days()
    }

    pub fn same_day(&self, other: &CalendarDate) -> bool {
        date_equals(self, other)
    }
}

fn has_iso_shape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b
            .iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for CalendarDate {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CalendarDate {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CalendarDate> for String {
    fn from(d: CalendarDate) -> Self {
        d.to_iso()
    }
}

/// Calendar-day equality: same year, month and day-of-month.
pub fn date_equals(a: &CalendarDate, b: &CalendarDate) -> bool {
    a.year() == b.year() && a.month() == b.month() && a.day() == b.day()
}

/// A day is past, and no longer selectable, when it falls on or before
/// yesterday. Today stays open so same-day stays can be booked.
pub fn is_past(date: &CalendarDate, today: &CalendarDate) -> bool {
    date < today
}

// ── Date sets ────────────────────────────────────────────────────

/// An ordered set of calendar days, the parsed form of `blocked_dates` or
/// `booked_dates`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateSet(BTreeSet<CalendarDate>);

impl DateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse stored strings, skipping malformed ones.
    ///
    /// Returns the set and the entries that failed to parse so the caller can
    /// report them; one corrupt entry never poisons the rest.
    pub fn parse_lenient<I, S>(entries: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        let mut invalid = Vec::new();
        for entry in entries {
            match CalendarDate::parse(entry.as_ref()) {
                Ok(d) => {
                    set.insert(d);
                }
                Err(_) => invalid.push(entry.as_ref().to_string()),
            }
        }
        (Self(set), invalid)
    }


    pub fn contains(&self, date: &CalendarDate) -> bool {
        self.0.contains(date)
    }

    pub fn insert(&mut self, date: CalendarDate) -> bool {
        self.0.insert(date)
    }

    pub fn remove(&mut self, date: &CalendarDate) -> bool {
        self.0.remove(date)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalendarDate> {
        self.0.iter()
    }

    pub fn is_disjoint(&self, other: &DateSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    /// Days present in both sets.
    pub fn overlap(&self, other: &DateSet) -> Vec<CalendarDate> {
        self.0.intersection(&other.0).copied().collect()
    }

    pub fn union(&self, other: &DateSet) -> DateSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn to_iso_strings(&self) -> Vec<String> {
        self.0.iter().map(CalendarDate::to_iso).collect()
    }
}

impl FromIterator<CalendarDate> for DateSet {
    fn from_iter<T: IntoIterator<Item = CalendarDate>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
