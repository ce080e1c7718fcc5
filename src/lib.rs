pub mod calendar;
pub mod input;
pub mod sync;
pub mod storage;
pub mod app;

pub use calendar::{BlockedSlot, SlotKey, TimeGrid, TimeSlots};
pub use app::{AppState, CalendarNavigator, ViewType, SyncStatus};

pub use input::selection::{Selection, SelectionEngine, SelectionState};
