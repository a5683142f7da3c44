use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::actormodel::failure::{CommandFailure, ModelError};
use crate::actormodel::lastmodified::ActorLastModified;
use crate::identity::UserIdentity;
use crate::value::Value;

// ============================================================================
// Message Envelopes - Identity and correlation for commands and responses
// ============================================================================
//
// Every command carries a fresh message id, the target actor id and the
// issuing user. Responses correlate back to the command through the message
// id. Construction is fail-fast: an envelope with an empty actor id or an
// invalid user never comes into existence.
//
// ============================================================================

/// Correlation id, generated once at command construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The family an actor id belongs to. Commands are routed by family; an
/// actor id never changes family once spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorKind {
    Case,
    Tenant,
    ConsentGroup,
    ProcessTask,
    TimerService,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActorKind::Case => "case",
            ActorKind::Tenant => "tenant",
            ActorKind::ConsentGroup => "consent-group",
            ActorKind::ProcessTask => "process-task",
            ActorKind::TimerService => "timer-service",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message_id: MessageId,
    pub actor_id: String,
    pub tenant: String,
    pub user: UserIdentity,
}

impl MessageEnvelope {
    pub fn new(actor_id: impl Into<String>, user: UserIdentity) -> Result<Self, ModelError> {
        let actor_id = actor_id.into();
        if actor_id.trim().is_empty() {
            return Err(ModelError::invalid_command("Actor id must not be empty"));
        }
        user.validate()?;
        Ok(Self {
            message_id: MessageId::fresh(),
            actor_id,
            tenant: String::new(),
            user,
        })
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Exactly one response per command, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Echoes the message id of the command this responds to.
    pub message_id: MessageId,
    pub actor_id: String,
    /// The actor's consistency token at completion, when the actor exists.
    pub last_modified: Option<ActorLastModified>,
    pub outcome: ResponseOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ResponseOutcome {
    Success(Value),
    Failure(CommandFailure),
}

impl ModelResponse {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Success(_))
    }

    pub fn success_value(&self) -> Option<&Value> {
        match &self.outcome {
            ResponseOutcome::Success(value) => Some(value),
            ResponseOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&CommandFailure> {
        match &self.outcome {
            ResponseOutcome::Failure(failure) => Some(failure),
            ResponseOutcome::Success(_) => None,
        }
    }

    /// Unwraps success or converts the carried failure back into an error.
    pub fn into_result(self) -> Result<Value, ModelError> {
        match self.outcome {
            ResponseOutcome::Success(value) => Ok(value),
            ResponseOutcome::Failure(failure) => Err(failure.error),
        }
    }
}

// ============================================================================
// Engine metadata
// ============================================================================

/// Timestamp type used for event creation times and consistency tokens.
pub type Moment = DateTime<Utc>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Stamped on bootstrap events and re-stamped when a recovered stream
    /// was written by a different engine version.
    pub engine_version: String,
    /// Debug-event capture default for newly spawned actors.
    pub debug_default: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            debug_default: false,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
