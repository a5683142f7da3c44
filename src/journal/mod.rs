use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actormodel::message::MessageId;
use crate::identity::UserIdentity;

pub mod memory;
pub mod retry;

pub use memory::MemoryJournal;
pub use retry::RetryConfig;

// ============================================================================
// Durable Log Interface
// ============================================================================
//
// The journal is an injected collaborator: the engine only requires atomic
// per-actor batch appends and ordered replay. Each actor's stream is
// independent; implementations must not serialize appends across actor ids.
//
// ============================================================================

/// One persisted record: a serialized event plus its envelope metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEvent {
    /// Position in the actor's stream, assigned by the writer, starting at 0.
    pub sequence: u64,
    /// Stable type tag of the event payload, for observability and tooling.
    pub event_type: String,
    /// The event itself, in its serialized (write-contract) form.
    pub payload: serde_json::Value,
    pub actor_id: String,
    pub tenant: String,
    /// Message id of the command that produced this event.
    pub message_id: MessageId,
    pub user: UserIdentity,
    /// Event creation time; orders persisted history.
    pub timestamp: DateTime<Utc>,
}

/// Optional snapshot: state plus the sequence number it covers. Replay then
/// only needs the events after `sequence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: serde_json::Value,
    pub sequence: u64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JournalError {
    #[error("Journal append failed: {0}")]
    AppendFailed(String),

    #[error("Journal load failed: {0}")]
    LoadFailed(String),
}

#[async_trait]
pub trait Journal: Send + Sync {
    /// Append `batch` to the actor's stream. All-or-nothing: on an error the
    /// stream must be exactly as it was before the call.
    async fn append(&self, actor_id: &str, batch: Vec<PersistedEvent>) -> Result<(), JournalError>;

    /// Load the actor's full stream, in original persisted order.
    async fn load(&self, actor_id: &str) -> Result<Vec<PersistedEvent>, JournalError>;

    /// Latest snapshot, if the implementation keeps any.
    async fn load_snapshot(&self, _actor_id: &str) -> Result<Option<Snapshot>, JournalError> {
        Ok(None)
    }
}
