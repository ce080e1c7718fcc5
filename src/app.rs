use std::sync::Arc;

use chrono::{Datelike, Days, Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::{BlockedSlot, DateRange, GridError, SlotKey, TimeGrid, TimeSlots};
use crate::input::selection::{Selection, SelectionEngine};
use crate::storage::blocked_store::BlockedSlotStore;
use crate::sync::orchestrator::{BatchOutcome, BlockOrchestrator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewType {
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Synced,
    Syncing,
    Error(String),
}

/// Anchor date plus view mode; the visible window is always derived from the two.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarNavigator {
    anchor: NaiveDate,
    view: ViewType,
}

impl CalendarNavigator {
    pub fn new(anchor: NaiveDate, view: ViewType) -> Self {
        Self { anchor, view }
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn view(&self) -> ViewType {
        self.view
    }

    pub fn set_view(&mut self, view: ViewType) {
        self.view = view;
    }

    pub fn jump_to(&mut self, date: NaiveDate) {
        self.anchor = date;
    }

    pub fn next(&mut self) {
        let moved = match self.view {
            ViewType::Week => self.anchor.checked_add_days(Days::new(7)),
            ViewType::Month => self.anchor.checked_add_months(Months::new(1)),
        };
        if let Some(date) = moved {
            self.anchor = date;
        }
    }

    pub fn previous(&mut self) {
        let moved = match self.view {
            ViewType::Week => self.anchor.checked_sub_days(Days::new(7)),
            ViewType::Month => self.anchor.checked_sub_months(Months::new(1)),
        };
        if let Some(date) = moved {
            self.anchor = date;
        }
    }

    pub fn week_start(date: NaiveDate) -> NaiveDate {
        let days_from_monday = date.weekday().num_days_from_monday() as u64;
        date.checked_sub_days(Days::new(days_from_monday))
            .unwrap_or(date)
    }

    pub fn visible_range(&self) -> DateRange {
        match self.view {
            ViewType::Week => {
                let start = Self::week_start(self.anchor);
                let end = start.checked_add_days(Days::new(6)).unwrap_or(start);
                DateRange::new(start, end)
            }
            ViewType::Month => {
                let first = self.anchor.with_day(1).unwrap_or(self.anchor);
                let last = first
                    .checked_add_months(Months::new(1))
                    .and_then(|d| d.pred_opt())
                    .unwrap_or(first);
                DateRange::new(first, last)
            }
        }
    }

    pub fn visible_dates(&self) -> Vec<NaiveDate> {
        self.visible_range().dates()
    }
}

/// Everything one calendar screen holds between events: navigation, the gesture in progress
/// and the selection waiting for confirmation.
pub struct AppState {
    pub navigator: CalendarNavigator,
    pub selection: SelectionEngine,
    pub pending: Option<Selection>,
    pub sync_status: SyncStatus,
    pub slots: Arc<TimeSlots>,
    pub today: NaiveDate,
}

impl AppState {
    pub fn new(slots: impl Into<Arc<TimeSlots>>, view: ViewType) -> Self {
        let today = Local::now().date_naive();
        Self {
            navigator: CalendarNavigator::new(today, view),
            selection: SelectionEngine::new(),
            pending: None,
            sync_status: SyncStatus::Synced,
            slots: slots.into(),
            today,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self.navigator.jump_to(today);
        self
    }

    pub fn next(&mut self) {
        self.selection.cancel();
        self.navigator.next();
    }

    pub fn previous(&mut self) {
        self.selection.cancel();
        self.navigator.previous();
    }

    pub fn set_view(&mut self, view: ViewType) {
        self.selection.cancel();
        self.navigator.set_view(view);
    }

    /// Starts a drag. Refused while a previous selection still awaits confirmation.
    pub fn pointer_down(&mut self, cell: SlotKey, blocked: &[BlockedSlot]) -> Result<bool, GridError> {
        if self.pending.is_some() {
            return Ok(false);
        }
        let window = self.navigator.visible_dates();
        let grid = TimeGrid::new(&self.slots, blocked, &window);
        self.selection.pointer_down(cell, &grid)
    }

    pub fn pointer_enter(&mut self, cell: SlotKey, blocked: &[BlockedSlot]) -> Result<(), GridError> {
        let window = self.navigator.visible_dates();
        let grid = TimeGrid::new(&self.slots, blocked, &window);
        self.selection.pointer_enter(cell, &grid)
    }

    /// Ends the drag; a non-empty selection becomes the pending confirmation.
    pub fn pointer_up(&mut self) -> bool {
        match self.selection.pointer_up() {
            Some(selection) => {
                self.pending = Some(selection);
                true
            }
            None => false,
        }
    }

    pub fn cancel_selection(&mut self) {
        self.selection.cancel();
    }

    /// Month-view tap on a day: goes straight to confirmation with a whole-day selection.
    pub fn tap_day(&mut self, date: NaiveDate, blocked: &[BlockedSlot]) -> bool {
        if self.navigator.view() != ViewType::Month || self.pending.is_some() {
            return false;
        }
        let window = self.navigator.visible_dates();
        let grid = TimeGrid::new(&self.slots, blocked, &window);
        match self.selection.tap_day(date, self.today, &grid) {
            Some(selection) => {
                self.pending = Some(selection);
                true
            }
            None => false,
        }
    }

    pub fn dismiss(&mut self) {
        self.pending = None;
    }

    /// Persists the pending selection. `gesture` must name the selection the operator
    /// confirmed; a stale confirmation for an older gesture is ignored.
    pub async fn confirm(
        &mut self,
        gesture: u64,
        orchestrator: &BlockOrchestrator,
        store: &mut BlockedSlotStore,
        reason: Option<&str>,
    ) -> Result<Option<BatchOutcome>, GridError> {
        let Some(selection) = self.pending.take_if(|p| p.gesture == gesture) else {
            tracing::debug!("Ignoring confirmation for stale gesture {}", gesture);
            return Ok(None);
        };

        self.sync_status = SyncStatus::Syncing;
        let outcome = match orchestrator.confirm_block(store, &selection.keys, reason).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Selection {} could not be blocked: {}", gesture, e);
                self.sync_status = SyncStatus::Error(e.to_string());
                return Err(e);
            }
        };

        self.sync_status = match &outcome.refresh_error {
            Some(e) => SyncStatus::Error(format!("Refresh failed: {}", e)),
            None => SyncStatus::Synced,
        };
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::in_memory_api::InMemoryBlockedSlotsApi;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn three_slots() -> TimeSlots {
        TimeSlots::new(vec!["09:00".into(), "09:30".into(), "10:00".into()])
    }

    #[test]
    fn week_window_is_monday_to_sunday_of_anchor() {
        let nav = CalendarNavigator::new(date(2025, 3, 13), ViewType::Week);

        let dates = nav.visible_dates();

        assert_eq!(dates.len(), 7);
        assert_eq!(dates[0], date(2025, 3, 10));
        assert_eq!(dates[6], date(2025, 3, 16));
    }

    #[test]
    fn month_window_covers_every_day_of_month() {
        let nav = CalendarNavigator::new(date(2024, 2, 17), ViewType::Month);

        let range = nav.visible_range();

        assert_eq!(range.start, date(2024, 2, 1));
        assert_eq!(range.end, date(2024, 2, 29));
        assert_eq!(nav.visible_dates().len(), 29);
    }

    #[test]
    fn week_navigation_moves_seven_days() {
        let mut nav = CalendarNavigator::new(date(2025, 3, 13), ViewType::Week);

        nav.next();
        assert_eq!(nav.anchor(), date(2025, 3, 20));
        nav.previous();
        nav.previous();
        assert_eq!(nav.anchor(), date(2025, 3, 6));
    }

    #[test]
    fn month_navigation_clamps_day_of_month() {
        let mut nav = CalendarNavigator::new(date(2025, 1, 31), ViewType::Month);

        nav.next();
        assert_eq!(nav.anchor(), date(2025, 2, 28));

        let mut nav = CalendarNavigator::new(date(2025, 3, 31), ViewType::Month);
        nav.previous();
        assert_eq!(nav.anchor(), date(2025, 2, 28));
    }

    #[test]
    fn month_navigation_crosses_year_boundary() {
        let mut nav = CalendarNavigator::new(date(2024, 12, 15), ViewType::Month);

        nav.next();

        assert_eq!(nav.anchor(), date(2025, 1, 15));
    }

    #[test]
    fn switching_view_keeps_anchor() {
        let mut nav = CalendarNavigator::new(date(2025, 3, 13), ViewType::Week);

        nav.set_view(ViewType::Month);

        assert_eq!(nav.anchor(), date(2025, 3, 13));
        assert_eq!(nav.visible_range().start, date(2025, 3, 1));
    }

    #[test]
    fn pointer_up_moves_selection_to_pending() {
        let mut app = AppState::new(three_slots(), ViewType::Week).with_today(date(2025, 3, 10));

        app.pointer_down(SlotKey::timed(date(2025, 3, 10), "09:00"), &[]).unwrap();
        app.pointer_enter(SlotKey::timed(date(2025, 3, 11), "10:00"), &[]).unwrap();

        assert!(app.pointer_up());
        assert_eq!(app.pending.as_ref().map(Selection::len), Some(6));
        assert!(!app.selection.is_selecting());
    }

    #[test]
    fn new_gesture_refused_while_confirmation_pending() {
        let mut app = AppState::new(three_slots(), ViewType::Week).with_today(date(2025, 3, 10));
        app.pointer_down(SlotKey::timed(date(2025, 3, 10), "09:00"), &[]).unwrap();
        app.pointer_up();

        let started = app.pointer_down(SlotKey::timed(date(2025, 3, 11), "09:00"), &[]).unwrap();

        assert!(!started);
    }

    #[test]
    fn navigating_cancels_gesture_in_progress() {
        let mut app = AppState::new(three_slots(), ViewType::Week).with_today(date(2025, 3, 10));
        app.pointer_down(SlotKey::timed(date(2025, 3, 10), "09:00"), &[]).unwrap();

        app.next();

        assert!(!app.pointer_up());
    }

    #[test]
    fn tap_day_only_applies_in_month_view() {
        let mut app = AppState::new(three_slots(), ViewType::Week).with_today(date(2025, 3, 10));

        assert!(!app.tap_day(date(2025, 3, 12), &[]));

        app.set_view(ViewType::Month);
        assert!(app.tap_day(date(2025, 3, 12), &[]));
    }

    #[tokio::test]
    async fn month_tap_then_confirm_creates_all_day_block() {
        let api = InMemoryBlockedSlotsApi::new();
        let mut store = BlockedSlotStore::new(Box::new(api.clone()));
        let orchestrator = BlockOrchestrator::new(three_slots());
        let mut app = AppState::new(three_slots(), ViewType::Month).with_today(date(2025, 3, 10));
        let day = date(2025, 3, 20);

        assert!(app.tap_day(day, store.slots()));
        let gesture = app.pending.as_ref().map(|p| p.gesture).unwrap();
        let outcome = app
            .confirm(gesture, &orchestrator, &mut store, Some("Congés"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.count(), 1);
        let stored = api.snapshot();
        assert_eq!(stored[0].date, day);
        assert_eq!(stored[0].time, None);
        assert_eq!(app.sync_status, SyncStatus::Synced);
        assert!(app.pending.is_none());
    }

    #[tokio::test]
    async fn shared_slot_sequence_keeps_view_and_orchestrator_in_step() {
        let api = InMemoryBlockedSlotsApi::new();
        let mut store = BlockedSlotStore::new(Box::new(api.clone()));
        let orchestrator = BlockOrchestrator::new(three_slots());
        let mut app = AppState::new(orchestrator.shared_slots(), ViewType::Week).with_today(date(2025, 3, 10));

        assert!(Arc::ptr_eq(&app.slots, &orchestrator.shared_slots()));
        app.pointer_down(SlotKey::timed(date(2025, 3, 10), "10:00"), &[]).unwrap();
        app.pointer_up();
        let gesture = app.pending.as_ref().map(|p| p.gesture).unwrap();
        let outcome = app
            .confirm(gesture, &orchestrator, &mut store, None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.count(), 1);
        assert_eq!(app.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn confirm_rejected_by_orchestrator_reports_error_status() {
        let api = InMemoryBlockedSlotsApi::new();
        let mut store = BlockedSlotStore::new(Box::new(api.clone()));
        let orchestrator = BlockOrchestrator::new(TimeSlots::new(vec!["09:00".into()]));
        let mut app = AppState::new(
            TimeSlots::new(vec!["09:00".into(), "09:30".into()]),
            ViewType::Week,
        )
        .with_today(date(2025, 3, 10));
        app.pointer_down(SlotKey::timed(date(2025, 3, 10), "09:30"), &[]).unwrap();
        app.pointer_up();
        let gesture = app.pending.as_ref().map(|p| p.gesture).unwrap();

        let result = app.confirm(gesture, &orchestrator, &mut store, None).await;

        assert_eq!(result.unwrap_err(), GridError::InvalidTimeSlot("09:30".to_string()));
        assert_eq!(
            app.sync_status,
            SyncStatus::Error("Invalid time slot: 09:30".to_string())
        );
        assert!(app.pending.is_none());
        assert!(api.snapshot().is_empty());
    }

    #[tokio::test]
    async fn stale_confirmation_is_ignored() {
        let api = InMemoryBlockedSlotsApi::new();
        let mut store = BlockedSlotStore::new(Box::new(api.clone()));
        let orchestrator = BlockOrchestrator::new(three_slots());
        let mut app = AppState::new(three_slots(), ViewType::Week).with_today(date(2025, 3, 10));
        app.pointer_down(SlotKey::timed(date(2025, 3, 10), "09:00"), &[]).unwrap();
        app.pointer_up();
        let gesture = app.pending.as_ref().map(|p| p.gesture).unwrap();

        let outcome = app
            .confirm(gesture + 1, &orchestrator, &mut store, None)
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert!(app.pending.is_some());
        assert!(api.snapshot().is_empty());
    }
}
