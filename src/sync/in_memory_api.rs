use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::calendar::{BlockedSlot, DateRange, NewBlockedSlot, SlotKey};
use crate::sync::blocked_slots_api::{ApiError, BlockedSlotsApi};

#[derive(Debug, Default)]
struct State {
    slots: Vec<BlockedSlot>,
    rejected: HashSet<SlotKey>,
    offline: bool,
}

/// In-process stand-in for the blocked-slots service. Clones share the same state, so a
/// handle kept aside can inspect or perturb what the store sees.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlockedSlotsApi {
    state: Arc<Mutex<State>>,
}

impl InMemoryBlockedSlotsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slots(slots: Vec<BlockedSlot>) -> Self {
        let api = Self::new();
        if let Ok(mut state) = api.state.lock() {
            state.slots = slots;
        }
        api
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ApiError> {
        self.state
            .lock()
            .map_err(|error| ApiError::RequestError(format!("blocked slot state lock poisoned: {error}")))
    }

    /// Makes every create for `key` fail with a conflict, as a server holding a booking would.
    pub fn reject(&self, key: SlotKey) {
        if let Ok(mut state) = self.lock() {
            state.rejected.insert(key);
        }
    }

    /// Simulates the service being unreachable for every call.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.lock() {
            state.offline = offline;
        }
    }

    pub fn snapshot(&self) -> Vec<BlockedSlot> {
        self.lock().map(|state| state.slots.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BlockedSlotsApi for InMemoryBlockedSlotsApi {
    async fn fetch_blocked_slots(
        &self,
        range: Option<DateRange>,
    ) -> Result<Vec<BlockedSlot>, ApiError> {
        let state = self.lock()?;
        if state.offline {
            return Err(ApiError::RequestError("service unreachable".to_string()));
        }
        Ok(state
            .slots
            .iter()
            .filter(|slot| range.is_none_or(|r| r.contains(slot.date)))
            .cloned()
            .collect())
    }

    async fn create_blocked_slot(&self, slot: &NewBlockedSlot) -> Result<BlockedSlot, ApiError> {
        let mut state = self.lock()?;
        if state.offline {
            return Err(ApiError::RequestError("service unreachable".to_string()));
        }

        let key = slot.key();
        let duplicate = state.slots.iter().any(|existing| existing.key() == key);
        if duplicate || state.rejected.contains(&key) {
            return Err(ApiError::Conflict(key.to_string()));
        }

        let created = BlockedSlot {
            id: Some(Uuid::new_v4().to_string()),
            date: slot.date,
            time: slot.time.clone(),
            reason: slot.reason.clone(),
        };
        state.slots.push(created.clone());
        Ok(created)
    }

    async fn delete_blocked_slot(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        if state.offline {
            return Err(ApiError::RequestError("service unreachable".to_string()));
        }

        let before = state.slots.len();
        state.slots.retain(|slot| slot.id.as_deref() != Some(id));
        if state.slots.len() == before {
            return Err(ApiError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
