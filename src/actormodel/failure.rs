use serde::{Deserialize, Serialize};

// ============================================================================
// Failure Taxonomy
// ============================================================================
//
// Domain failures (invalid command, authorization, transition denied, actor
// not found, malformed consistency token) are caught at the command boundary
// and answered as a CommandFailure; they never crash an actor and are safe to
// retry immediately. Serialization and engine faults are different: they mean
// in-memory state can no longer be trusted, so the actor refuses further
// commands until it has been restarted and recovered.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum ModelError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transition {transition} is not allowed on '{item}' in state {state}")]
    TransitionDenied {
        item: String,
        transition: String,
        state: String,
    },

    #[error("Actor '{0}' does not exist")]
    ActorNotFound(String),

    #[error("Invalid last-modified token: {0}")]
    InvalidLastModified(String),

    #[error("Serialization failure: {0}")]
    SerializationFault(String),

    #[error("Engine fault: {0}")]
    EngineFault(String),
}

impl ModelError {
    pub fn invalid_command(description: impl Into<String>) -> Self {
        ModelError::InvalidCommand(description.into())
    }

    pub fn unauthorized(description: impl Into<String>) -> Self {
        ModelError::Unauthorized(description.into())
    }

    pub fn engine_fault(description: impl Into<String>) -> Self {
        ModelError::EngineFault(description.into())
    }

    pub fn serialization(description: impl Into<String>) -> Self {
        ModelError::SerializationFault(description.into())
    }

    /// Engine-level faults escape the command cycle and force a restart;
    /// everything else is answered and the actor keeps running.
    pub fn is_engine_level(&self) -> bool {
        matches!(
            self,
            ModelError::SerializationFault(_) | ModelError::EngineFault(_)
        )
    }
}

/// Serializable wire form of a failed command, carried in responses and in
/// cross-actor failure deliveries.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{description}")]
pub struct CommandFailure {
    pub error: ModelError,
    pub description: String,
}

impl From<ModelError> for CommandFailure {
    fn from(error: ModelError) -> Self {
        let description = error.to_string();
        Self { error, description }
    }
}

/// Raised when replaying a persisted stream fails: a record that cannot be
/// decoded or applied. Recovery never partially succeeds.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Recovery of actor '{actor_id}' failed at sequence {sequence}: {reason}")]
pub struct RecoveryFault {
    pub actor_id: String,
    pub sequence: u64,
    pub reason: String,
}

// ============================================================================
// Unit Tests
// ============================================================================
