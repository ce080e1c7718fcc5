use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::calendar::{
    BlockedSlot, DateRange, GridError, NewBlockedSlot, RecurringBlock, SlotKey, TimeGrid, TimeSlots,
};
use crate::storage::blocked_store::{BlockedSlotStore, StoreError};

#[derive(Debug)]
pub struct FailedBlock {
    pub key: SlotKey,
    pub error: StoreError,
}

/// What a batch of creates achieved. Successful rows are never rolled back.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<BlockedSlot>,
    pub failed: Vec<FailedBlock>,
    pub refresh_error: Option<StoreError>,
}

impl BatchOutcome {
    pub fn count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn requested(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn unavailable(&self) -> usize {
        self.failed.iter().filter(|f| f.error.is_race()).count()
    }

    pub fn summary(&self) -> String {
        let mut text = format!("{} of {} slots blocked", self.count(), self.requested());
        let unavailable = self.unavailable();
        if unavailable > 0 {
            text.push_str(&format!("; {} were already unavailable", unavailable));
        }
        let other = self.failed.len() - unavailable;
        if other > 0 {
            text.push_str(&format!("; {} failed", other));
        }
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayToggle {
    Blocked,
    Unblocked,
}

/// Turns confirmed selections into store writes, always refreshing once they have settled.
pub struct BlockOrchestrator {
    slots: Arc<TimeSlots>,
    default_reason: Option<String>,
}

impl BlockOrchestrator {
    pub fn new(slots: impl Into<Arc<TimeSlots>>) -> Self {
        Self {
            slots: slots.into(),
            default_reason: None,
        }
    }

    pub fn with_default_reason(mut self, reason: Option<String>) -> Self {
        self.default_reason = reason.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn slots(&self) -> &TimeSlots {
        &self.slots
    }

    /// Handle on the sequence this orchestrator validates against, for views that must agree with it.
    pub fn shared_slots(&self) -> Arc<TimeSlots> {
        Arc::clone(&self.slots)
    }

    fn reason_or_default(&self, reason: Option<&str>) -> Option<String> {
        reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .or_else(|| self.default_reason.clone())
    }

    fn check_keys<'k>(&self, keys: impl IntoIterator<Item = &'k SlotKey>) -> Result<(), GridError> {
        for key in keys {
            if let Some(time) = key.time() {
                if let Err(e) = self.slots.index_of(time) {
                    tracing::error!("Refusing to block {}: time is not in the slot sequence", key);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Blocks every key of `selection`, tolerating per-slot failures.
    pub async fn confirm_block(
        &self,
        store: &mut BlockedSlotStore,
        selection: &BTreeSet<SlotKey>,
        reason: Option<&str>,
    ) -> Result<BatchOutcome, GridError> {
        self.check_keys(selection)?;

        let reason = self.reason_or_default(reason);
        let requests = selection
            .iter()
            .map(|key| NewBlockedSlot::from_key(key, reason.clone()))
            .collect();

        Ok(self.persist(store, requests).await)
    }

    async fn persist(&self, store: &mut BlockedSlotStore, requests: Vec<NewBlockedSlot>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for request in requests {
            match store.create(&request).await {
                Ok(created) => outcome.succeeded.push(created),
                Err(error) => {
                    if error.is_race() {
                        tracing::warn!("Could not block {}: {}", request.key(), error);
                    } else {
                        tracing::error!("Could not block {}: {}", request.key(), error);
                    }
                    outcome.failed.push(FailedBlock {
                        key: request.key(),
                        error,
                    });
                }
            }
        }

        if let Err(e) = store.refresh().await {
            outcome.refresh_error = Some(e);
        }

        tracing::info!("{}", outcome.summary());
        outcome
    }

    /// Deletes one block and refreshes. A block someone else already removed counts as done.
    pub async fn remove_block(&self, store: &mut BlockedSlotStore, slot: &BlockedSlot) -> Result<(), StoreError> {
        let id = slot.id.as_deref().ok_or(StoreError::MissingId)?;

        let deleted = store.delete(id).await;
        let refreshed = store.refresh().await.map(|_| ());

        match deleted {
            Ok(()) => refreshed,
            Err(StoreError::NotFound(id)) => {
                tracing::info!("Blocked slot {} was already removed", id);
                refreshed
            }
            Err(e) => {
                tracing::error!("Failed to remove blocked slot {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Frees a blocked week cell by removing the row responsible for it. Returns `false` when
    /// the cell was not blocked.
    pub async fn unblock_cell(
        &self,
        store: &mut BlockedSlotStore,
        date: NaiveDate,
        time: &str,
    ) -> Result<bool, StoreError> {
        let target = TimeGrid::new(&self.slots, store.slots(), &[])
            .block_at(date, time)
            .cloned();

        match target {
            Some(slot) => {
                self.remove_block(store, &slot).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes the all-day block of `date` if there is one, otherwise creates it.
    pub async fn toggle_day(
        &self,
        store: &mut BlockedSlotStore,
        date: NaiveDate,
        reason: Option<&str>,
    ) -> Result<DayToggle, StoreError> {
        let existing = TimeGrid::new(&self.slots, store.slots(), &[])
            .all_day_block(date)
            .cloned();

        if let Some(slot) = existing {
            self.remove_block(store, &slot).await?;
            return Ok(DayToggle::Unblocked);
        }

        let request = NewBlockedSlot::from_key(&SlotKey::WholeDay(date), self.reason_or_default(reason));
        let created = store.create(&request).await;
        let refreshed = store.refresh().await.map(|_| ());

        created?;
        refreshed?;
        Ok(DayToggle::Blocked)
    }

    /// Expands recurring rules over `range` and blocks whatever is not blocked yet.
    pub async fn apply_recurring(
        &self,
        store: &mut BlockedSlotStore,
        rules: &[RecurringBlock],
        range: DateRange,
    ) -> Result<BatchOutcome, GridError> {
        let mut seen = BTreeSet::new();
        let mut requests = Vec::new();
        {
            let grid = TimeGrid::new(&self.slots, store.slots(), &[]);
            for rule in rules {
                let reason = self.reason_or_default(rule.reason.as_deref());
                for key in rule.expand(range, &self.slots)? {
                    if grid.is_key_blocked(&key) || !seen.insert(key.clone()) {
                        continue;
                    }
                    requests.push(NewBlockedSlot::from_key(&key, reason.clone()));
                }
            }
        }

        tracing::info!(
            "Applying {} recurring rules from {} to {}: {} new blocks",
            rules.len(),
            range.start,
            range.end,
            requests.len()
        );
        Ok(self.persist(store, requests).await)
    }
}
