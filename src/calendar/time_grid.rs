use chrono::NaiveDate;
use thiserror::Error;

use crate::calendar::blocked_slot::{BlockedSlot, SlotKey};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("Invalid time slot: {0}")]
    InvalidTimeSlot(String),
}

/// The fixed, ordered time-of-day sequence shared by every view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSlots {
    times: Vec<String>,
}

impl TimeSlots {
    pub fn new(times: Vec<String>) -> Self {
        Self { times }
    }

    /// Every `step_minutes` from `start_hour:00` up to and including `end_hour:00`.
    pub fn every(step_minutes: u32, start_hour: u32, end_hour: u32) -> Self {
        let mut times = Vec::new();
        let mut minutes = start_hour * 60;
        let step = step_minutes.max(1);
        while minutes <= end_hour * 60 {
            times.push(format!("{:02}:{:02}", minutes / 60, minutes % 60));
            minutes += step;
        }
        Self { times }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.times.get(index).map(String::as_str)
    }

    pub fn index_of(&self, time: &str) -> Result<usize, GridError> {
        self.times
            .iter()
            .position(|t| t == time)
            .ok_or_else(|| GridError::InvalidTimeSlot(time.to_string()))
    }

    /// Inclusive run of times between two entries, in sequence order whichever comes first.
    pub fn span(&self, a: &str, b: &str) -> Result<&[String], GridError> {
        let first = self.index_of(a)?;
        let second = self.index_of(b)?;
        Ok(&self.times[first.min(second)..=first.max(second)])
    }
}

impl Default for TimeSlots {
    fn default() -> Self {
        Self::every(30, 9, 23)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStatus {
    Open,
    PartiallyBlocked,
    Blocked,
}

/// Read-only view of the visible window crossed with the slot sequence, answering
/// availability questions against a snapshot of the blocked-slot store.
#[derive(Debug, Clone, Copy)]
pub struct TimeGrid<'a> {
    slots: &'a TimeSlots,
    blocked: &'a [BlockedSlot],
    window: &'a [NaiveDate],
}

impl<'a> TimeGrid<'a> {
    pub fn new(slots: &'a TimeSlots, blocked: &'a [BlockedSlot], window: &'a [NaiveDate]) -> Self {
        Self {
            slots,
            blocked,
            window,
        }
    }

    pub fn slots(&self) -> &'a TimeSlots {
        self.slots
    }

    pub fn window(&self) -> &'a [NaiveDate] {
        self.window
    }

    pub fn in_window(&self, date: NaiveDate) -> bool {
        self.window.contains(&date)
    }

    pub fn is_blocked(&self, date: NaiveDate, time: &str) -> bool {
        self.blocked.iter().any(|slot| slot.covers(date, time))
    }

    /// Only an all-day block makes a day blocked; per-time blocks leave it partial.
    pub fn is_day_blocked(&self, date: NaiveDate) -> bool {
        self.blocked
            .iter()
            .any(|slot| slot.date == date && slot.is_all_day())
    }

    pub fn day_status(&self, date: NaiveDate) -> DayStatus {
        if self.is_day_blocked(date) {
            DayStatus::Blocked
        } else if self.blocked.iter().any(|slot| slot.date == date) {
            DayStatus::PartiallyBlocked
        } else {
            DayStatus::Open
        }
    }

    pub fn is_key_blocked(&self, key: &SlotKey) -> bool {
        match key {
            SlotKey::WholeDay(date) => self.is_day_blocked(*date),
            SlotKey::Timed { date, time } => self.is_blocked(*date, time),
        }
    }

    /// The block responsible for `(date, time)` being unavailable: the per-time row if there
    /// is one, otherwise the all-day row.
    pub fn block_at(&self, date: NaiveDate, time: &str) -> Option<&'a BlockedSlot> {
        self.blocked
            .iter()
            .find(|slot| slot.date == date && slot.time.as_deref() == Some(time))
            .or_else(|| self.all_day_block(date))
    }

    pub fn all_day_block(&self, date: NaiveDate) -> Option<&'a BlockedSlot> {
        self.blocked
            .iter()
            .find(|slot| slot.date == date && slot.is_all_day())
    }
}
