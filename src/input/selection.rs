use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::calendar::{DateRange, GridError, SlotKey, TimeGrid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    Idle,
    Selecting {
        gesture: u64,
        anchor: SlotKey,
        cursor: SlotKey,
        keys: BTreeSet<SlotKey>,
    },
}

/// A finished selection handed over for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub gesture: u64,
    pub keys: BTreeSet<SlotKey>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Drag-to-select over the calendar grid.
///
/// Week layout cells are [`SlotKey::Timed`], month layout cells are [`SlotKey::WholeDay`]; the
/// anchor decides which layout a gesture belongs to and cells of the other kind are ignored.
/// Every cursor move rebuilds the selection as the unblocked cells of the rectangle spanned by
/// anchor and cursor.
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    state: SelectionState,
    gestures: u64,
}

impl SelectionEngine {
    pub fn new() -> Self {
        Self {
            state: SelectionState::Idle,
            gestures: 0,
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn is_selecting(&self) -> bool {
        matches!(self.state, SelectionState::Selecting { .. })
    }

    pub fn selected(&self) -> Option<&BTreeSet<SlotKey>> {
        match &self.state {
            SelectionState::Idle => None,
            SelectionState::Selecting { keys, .. } => Some(keys),
        }
    }

    /// Starts a gesture on `cell`. Blocked cells and week cells outside the visible window do
    /// not start one; `Ok(false)` is returned and the engine stays idle.
    pub fn pointer_down(&mut self, cell: SlotKey, grid: &TimeGrid) -> Result<bool, GridError> {
        if let SlotKey::Timed { date, time } = &cell {
            if let Err(e) = grid.slots().index_of(time) {
                tracing::error!("Pointer down on {} which is not in the slot sequence", cell);
                self.state = SelectionState::Idle;
                return Err(e);
            }
            if !grid.in_window(*date) {
                return Ok(false);
            }
        }

        if grid.is_key_blocked(&cell) {
            tracing::debug!("Pointer down on blocked cell {}, no selection started", cell);
            self.state = SelectionState::Idle;
            return Ok(false);
        }

        self.gestures += 1;
        let mut keys = BTreeSet::new();
        keys.insert(cell.clone());
        self.state = SelectionState::Selecting {
            gesture: self.gestures,
            anchor: cell.clone(),
            cursor: cell,
            keys,
        };
        Ok(true)
    }

    /// Moves the cursor while the button is held. No-op when idle.
    pub fn pointer_enter(&mut self, cell: SlotKey, grid: &TimeGrid) -> Result<(), GridError> {
        let SelectionState::Selecting { anchor, .. } = &self.state else {
            return Ok(());
        };

        match rectangle(anchor, &cell, grid) {
            Ok(Some(rebuilt)) => {
                if let SelectionState::Selecting { cursor, keys, .. } = &mut self.state {
                    *cursor = cell;
                    *keys = rebuilt;
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                tracing::error!("Selection aborted, grid and slot sequence disagree: {}", e);
                self.state = SelectionState::Idle;
                Err(e)
            }
        }
    }

    /// Ends the gesture. Returns the selection when it holds at least one cell.
    pub fn pointer_up(&mut self) -> Option<Selection> {
        match std::mem::replace(&mut self.state, SelectionState::Idle) {
            SelectionState::Idle => None,
            SelectionState::Selecting { keys, .. } if keys.is_empty() => None,
            SelectionState::Selecting { gesture, keys, .. } => {
                tracing::info!("Selection {} finished with {} cells", gesture, keys.len());
                Some(Selection { gesture, keys })
            }
        }
    }

    /// Drops any gesture in progress, e.g. on release outside the grid. Returns whether one was
    /// in progress.
    pub fn cancel(&mut self) -> bool {
        let was_selecting = self.is_selecting();
        self.state = SelectionState::Idle;
        was_selecting
    }

    /// Month-view single tap: a one-day whole-day selection, bypassing the drag gesture.
    pub fn tap_day(&mut self, date: NaiveDate, today: NaiveDate, grid: &TimeGrid) -> Option<Selection> {
        if self.is_selecting() || date < today || grid.is_day_blocked(date) {
            return None;
        }

        self.gestures += 1;
        let mut keys = BTreeSet::new();
        keys.insert(SlotKey::WholeDay(date));
        Some(Selection {
            gesture: self.gestures,
            keys,
        })
    }
}

impl Default for SelectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Unblocked cells of the closed rectangle between `anchor` and `cursor`, or `None` when the
/// two cells belong to different layouts.
fn rectangle(
    anchor: &SlotKey,
    cursor: &SlotKey,
    grid: &TimeGrid,
) -> Result<Option<BTreeSet<SlotKey>>, GridError> {
    let dates = DateRange::new(anchor.date(), cursor.date()).dates();

    let keys = match (anchor, cursor) {
        (SlotKey::Timed { time: from, .. }, SlotKey::Timed { time: to, .. }) => {
            let times = grid.slots().span(from, to)?;
            dates
                .into_iter()
                .filter(|date| grid.in_window(*date))
                .flat_map(move |date| times.iter().map(move |time| (date, time)))
                .filter(|(date, time)| !grid.is_blocked(*date, time))
                .map(|(date, time)| SlotKey::timed(date, time))
                .collect()
        }
        (SlotKey::WholeDay(_), SlotKey::WholeDay(_)) => dates
            .into_iter()
            .filter(|date| !grid.is_day_blocked(*date))
            .map(SlotKey::WholeDay)
            .collect(),
        _ => return Ok(None),
    };

    Ok(Some(keys))
}
