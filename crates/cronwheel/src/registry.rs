//! Task-id to timeout-handle registry.
//!
//! One live handle per task id. Re-registering an id displaces the old
//! handle (returned to the caller, which cancels it); the map holds no
//! further logic.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::wheel::Timeout;

#[derive(Default)]
pub struct HandleRegistry {
    map: Mutex<HashMap<String, Timeout>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` under `id`, returning the handle it displaced.
    pub fn put(&self, id: impl Into<String>, handle: Timeout) -> Option<Timeout> {
        self.map.lock().insert(id.into(), handle)
    }

    pub fn get(&self, id: &str) -> Option<Timeout> {
        self.map.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Timeout> {
        self.map.lock().remove(id)
    }

    /// Remove `id` only while it still maps to `handle`, so a re-registered
    /// task is not torn down by its predecessor's bookkeeping.
    pub fn remove_if_same(&self, id: &str, handle: &Timeout) -> bool {
        let mut map = self.map.lock();
        if map.get(id).is_some_and(|h| h.same_handle(handle)) {
            map.remove(id);
            true
        } else {
            false
        }
    }

    /// Swap in `new` only while `id` still maps to `expected`. Returns
    /// `false` when a concurrent re-registration or cancellation got there
    /// first, leaving the map untouched.
    pub fn replace_if_same(&self, id: &str, expected: &Timeout, new: Timeout) -> bool {
        let mut map = self.map.lock();
        if map.get(id).is_some_and(|h| h.same_handle(expected)) {
            map.insert(id.to_string(), new);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Ids whose handle has neither fired nor been cancelled.
    pub fn pending_ids(&self) -> Vec<String> {
        self.map
            .lock()
            .iter()
            .filter(|(_, handle)| handle.is_pending())
            .map(|(id, _)| id.clone())
            .collect()
    }
}
