pub mod blocked_slot;
pub mod recurrence;
pub mod time_grid;

pub use blocked_slot::{BlockedSlot, DateRange, NewBlockedSlot, SlotKey};
pub use recurrence::{Coverage, Frequency, RecurringBlock};
pub use time_grid::{DayStatus, GridError, TimeGrid, TimeSlots};
