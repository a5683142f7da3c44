use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{Journal, JournalError, PersistedEvent};

// ============================================================================
// In-Memory Journal
// ============================================================================
//
// Keeps one ordered stream per actor id behind a single map lock; appends to
// different actors never contend beyond the brief map access, and a batch is
// inserted with one extend call, so partial appends cannot be observed.
//
// Failure injection lets tests drive the engine-fault path without a real
// storage backend.
//
// ============================================================================

#[derive(Default)]
pub struct MemoryJournal {
    streams: Mutex<HashMap<String, Vec<PersistedEvent>>>,
    fail_appends: AtomicBool,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every append fails until cleared. Test hook.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Number of persisted events for an actor. Test hook.
    pub fn stream_len(&self, actor_id: &str) -> usize {
        let streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        streams.get(actor_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Synchronous copy of an actor's stream. Test hook.
    pub fn records(&self, actor_id: &str) -> Vec<PersistedEvent> {
        let streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        streams.get(actor_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append(&self, actor_id: &str, batch: Vec<PersistedEvent>) -> Result<(), JournalError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(JournalError::AppendFailed(
                "injected append failure".to_string(),
            ));
        }
        if batch.is_empty() {
            return Err(JournalError::AppendFailed(
                "cannot append an empty batch".to_string(),
            ));
        }

        let mut streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        let stream = streams.entry(actor_id.to_string()).or_default();

        let expected = stream.len() as u64;
        if batch[0].sequence != expected {
            return Err(JournalError::AppendFailed(format!(
                "sequence gap for actor '{}': expected {}, got {}",
                actor_id, expected, batch[0].sequence
            )));
        }

        stream.extend(batch);
        Ok(())
    }

    async fn load(&self, actor_id: &str) -> Result<Vec<PersistedEvent>, JournalError> {
        let streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        Ok(streams.get(actor_id).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
