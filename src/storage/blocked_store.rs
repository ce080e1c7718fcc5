use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::calendar::{BlockedSlot, DateRange, NewBlockedSlot, TimeGrid, TimeSlots};
use crate::sync::blocked_slots_api::{ApiError, BlockedSlotsApi};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to fetch blocked slots: {0}")]
    Fetch(#[source] ApiError),
    #[error("Slot already blocked or unavailable: {0}")]
    Conflict(String),
    #[error("Blocked slot not found: {0}")]
    NotFound(String),
    #[error("Blocked slot has not been persisted yet")]
    MissingId,
    #[error("API error: {0}")]
    Api(#[source] ApiError),
}

impl StoreError {
    fn from_write(error: ApiError) -> Self {
        match error {
            ApiError::Conflict(key) => StoreError::Conflict(key),
            ApiError::NotFound(id) => StoreError::NotFound(id),
            other => StoreError::Api(other),
        }
    }

    /// Conflicts and missing rows come from other operators racing us, not from a fault.
    pub fn is_race(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::NotFound(_))
    }
}

/// Local reflection of the server's blocked slots. Only `refresh` changes the cached rows.
pub struct BlockedSlotStore {
    api: Box<dyn BlockedSlotsApi>,
    slots: Vec<BlockedSlot>,
    range_hint: Option<DateRange>,
    last_refreshed: Option<DateTime<Utc>>,
}

impl BlockedSlotStore {
    pub fn new(api: Box<dyn BlockedSlotsApi>) -> Self {
        Self {
            api,
            slots: Vec::new(),
            range_hint: None,
            last_refreshed: None,
        }
    }

    pub fn with_range_hint(mut self, range: DateRange) -> Self {
        self.range_hint = Some(range);
        self
    }

    pub fn set_range_hint(&mut self, range: Option<DateRange>) {
        self.range_hint = range;
    }

    pub fn slots(&self) -> &[BlockedSlot] {
        &self.slots
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }

    pub fn grid<'a>(&'a self, slots: &'a TimeSlots, window: &'a [NaiveDate]) -> TimeGrid<'a> {
        TimeGrid::new(slots, &self.slots, window)
    }

    /// Replaces the whole cache with the server state. On failure the previous rows are kept.
    pub async fn refresh(&mut self) -> Result<&[BlockedSlot], StoreError> {
        match self.api.fetch_blocked_slots(self.range_hint).await {
            Ok(slots) => {
                tracing::debug!("Blocked slot cache replaced: {} -> {} rows", self.slots.len(), slots.len());
                self.slots = slots;
                self.last_refreshed = Some(Utc::now());
                Ok(&self.slots)
            }
            Err(e) => {
                tracing::warn!("Refresh failed, keeping {} cached blocked slots: {}", self.slots.len(), e);
                Err(StoreError::Fetch(e))
            }
        }
    }

    pub async fn create(&self, slot: &NewBlockedSlot) -> Result<BlockedSlot, StoreError> {
        self.api
            .create_blocked_slot(slot)
            .await
            .map_err(StoreError::from_write)
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.api
            .delete_blocked_slot(id)
            .await
            .map_err(StoreError::from_write)
    }

    /// Cached blocks from `today` on, grouped per date. All-day rows lead each group, timed rows
    /// follow in slot-sequence order.
    pub fn upcoming(&self, today: NaiveDate, sequence: &TimeSlots) -> BTreeMap<NaiveDate, Vec<&BlockedSlot>> {
        let mut grouped: BTreeMap<NaiveDate, Vec<&BlockedSlot>> = BTreeMap::new();
        for slot in self.slots.iter().filter(|slot| slot.date >= today) {
            grouped.entry(slot.date).or_default().push(slot);
        }

        for blocks in grouped.values_mut() {
            blocks.sort_by_key(|slot| match slot.time.as_deref() {
                None => (0, 0, String::new()),
                Some(time) => match sequence.index_of(time) {
                    Ok(index) => (1, index, String::new()),
                    Err(_) => (2, 0, time.to_string()),
                },
            });
        }
        grouped
    }
}
