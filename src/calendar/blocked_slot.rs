use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A persisted (or pending) unbookable slot. `time == None` blocks the whole day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedSlot {
    pub id: Option<String>,
    pub date: NaiveDate,
    pub time: Option<String>,
    pub reason: Option<String>,
}

impl BlockedSlot {
    pub fn is_all_day(&self) -> bool {
        self.time.is_none()
    }

    /// True when this block makes `(date, time)` unbookable.
    pub fn covers(&self, date: NaiveDate, time: &str) -> bool {
        self.date == date && self.time.as_deref().is_none_or(|t| t == time)
    }

    pub fn key(&self) -> SlotKey {
        match &self.time {
            Some(time) => SlotKey::timed(self.date, time),
            None => SlotKey::WholeDay(self.date),
        }
    }
}

/// Payload for `POST blocked-slots`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlockedSlot {
    pub date: NaiveDate,
    pub time: Option<String>,
    pub reason: Option<String>,
}

impl NewBlockedSlot {
    pub fn from_key(key: &SlotKey, reason: Option<String>) -> Self {
        Self {
            date: key.date(),
            time: key.time().map(str::to_string),
            reason,
        }
    }

    pub fn key(&self) -> SlotKey {
        match &self.time {
            Some(time) => SlotKey::timed(self.date, time),
            None => SlotKey::WholeDay(self.date),
        }
    }
}

/// One cell of the calendar grid: a timed slot in week view, a whole day in month view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    WholeDay(NaiveDate),
    Timed { date: NaiveDate, time: String },
}

impl SlotKey {
    pub fn timed(date: NaiveDate, time: &str) -> Self {
        SlotKey::Timed {
            date,
            time: time.to_string(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            SlotKey::WholeDay(date) => *date,
            SlotKey::Timed { date, .. } => *date,
        }
    }

    pub fn time(&self) -> Option<&str> {
        match self {
            SlotKey::WholeDay(_) => None,
            SlotKey::Timed { time, .. } => Some(time),
        }
    }

    pub fn is_whole_day(&self) -> bool {
        matches!(self, SlotKey::WholeDay(_))
    }
}

// Date first, whole day before any time of that date. "HH:MM" strings sort chronologically.
impl Ord for SlotKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date()
            .cmp(&other.date())
            .then_with(|| self.time().cmp(&other.time()))
    }
}

impl PartialOrd for SlotKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::WholeDay(date) => write!(f, "{} (all day)", date),
            SlotKey::Timed { date, time } => write!(f, "{} {}", date, time),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Builds an inclusive range, swapping the bounds if given backwards.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            dates.push(current);
            match current.checked_add_days(Days::new(1)) {
                Some(next) => current = next,
                None => break,
            }
        }
        dates
    }
}
