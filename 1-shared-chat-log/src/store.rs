//! The broker's canonical chat log.
//!
//! Entries are only ever appended. Once a message lands at an index, neither its
//! position nor its content changes for the lifetime of the broker process.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Append-only, totally ordered log of formatted chat messages.
///
/// A single `Mutex` serializes appends, so the lock acquisition order is the
/// order every client observes. The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct MessageStore {
    entries: Mutex<Vec<String>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns the index it was stored at.
    pub fn append(&self, message: String) -> usize {
        let mut entries = self.lock();
        entries.push(message);
        entries.len() - 1
    }

    /// Returns a copy of the whole log in arrival order.
    ///
    /// The copy does not track later appends.
    pub fn get_all(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        // A panic mid-push cannot leave a half-written entry behind.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
