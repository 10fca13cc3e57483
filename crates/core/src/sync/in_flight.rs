//! At-most-one attempt per billing entry

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Ids of entries with a vendor call (or rejection) in progress
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    ids: Mutex<HashSet<String>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`. Returns `None` if it is already claimed; the claim is
    /// released when the guard drops.
    pub fn try_acquire(&self, id: &str) -> Option<InFlightGuard<'_>> {
        let inserted = self.ids.lock().unwrap_or_else(PoisonError::into_inner).insert(id.to_string());
        inserted.then(|| InFlightGuard { registry: self, id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct InFlightGuard<'a> {
    registry: &'a InFlightRegistry,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.ids.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.id);
    }
}
