use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actormodel::message::MessageId;
use crate::actormodel::system::AnyCommand;
use crate::identity::UserIdentity;

// ============================================================================
// Engine Event Envelope
// ============================================================================
//
// Everything an actor persists is an ActorEvent: either a domain event of the
// actor's own family, or one of the engine-level events every family shares.
// The serde tag is the stable type registry - each variant's tag is the type
// tag under which the event is persisted and later decoded, so the set of
// events that exist for an actor family is closed at compile time.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ActorEvent<E, C> {
    /// A domain event of the owning actor family.
    Domain(E),
    /// Commit event: closes the unit of work and carries the new
    /// consistency timestamp.
    Modified(ActorModified),
    /// Persisted debug toggle; valid before the actor exists.
    DebugModeChanged(DebugModeChanged),
    /// Engine version stamp, written on bootstrap and whenever a recovered
    /// stream was produced by a different engine version.
    EngineVersionChanged(EngineVersionChanged),
    /// Durable marker that a cross-actor request left this unit of work.
    RequestDispatched(RequestDispatched<C>),
    /// The response (or failure) for an earlier request has been processed.
    RequestConcluded(RequestConcluded),
    /// Verbose capture while debug mode is on. Never triggers a commit.
    DebugInfo(DebugInfo),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorModified {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugModeChanged {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineVersionChanged {
    pub version: String,
}

/// The persisted intent to ask another actor. Carries everything needed to
/// dispatch the wrapped command and, later, to route the answer into the
/// registered callback - correlation never depends on in-memory dispatch
/// state surviving a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDispatched<C> {
    pub correlation_id: MessageId,
    pub target_actor_id: String,
    pub user: UserIdentity,
    pub command: Box<AnyCommand>,
    pub callback: C,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConcluded {
    pub correlation_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub lines: Vec<String>,
}

impl<E, C> ActorEvent<E, C> {
    pub fn is_commit(&self) -> bool {
        matches!(self, ActorEvent::Modified(_))
    }

    /// Debug captures do not constitute an externally visible state change,
    /// so they never cause a commit event to be appended.
    pub fn counts_for_commit(&self) -> bool {
        !matches!(self, ActorEvent::DebugInfo(_))
    }
}

/// Type tag of a serialized ActorEvent, for the persisted record. Domain
/// events report their inner serde tag when they have one.
pub fn event_type_tag(payload: &serde_json::Value) -> String {
    let outer = payload
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("Unknown");
    if outer == "Domain" {
        if let Some(inner) = payload
            .get("data")
            .and_then(|d| d.get("type"))
            .and_then(|t| t.as_str())
        {
            return inner.to_string();
        }
    }
    outer.to_string()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum SampleEvent {
        Something { n: i64 },
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum SampleCallback {}

    type Event = ActorEvent<SampleEvent, SampleCallback>;

    #[test]
    fn test_commit_classification() {
        let modified: Event = ActorEvent::Modified(ActorModified {
            timestamp: Utc::now(),
        });
        let debug: Event = ActorEvent::DebugInfo(DebugInfo { lines: vec![] });
        let domain: Event = ActorEvent::Domain(SampleEvent::Something { n: 1 });

        assert!(modified.is_commit());
        assert!(!domain.is_commit());
        assert!(domain.counts_for_commit());
        assert!(!debug.counts_for_commit());
    }

    #[test]
    fn test_serialization_round_trip() {
        let event: Event = ActorEvent::Domain(SampleEvent::Something { n: 42 });
        let json = serde_json::to_value(&event).unwrap();
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn test_event_type_tag() {
        let domain: Event = ActorEvent::Domain(SampleEvent::Something { n: 1 });
        let payload = serde_json::to_value(&domain).unwrap();
        assert_eq!(event_type_tag(&payload), "Something");

        let modified: Event = ActorEvent::Modified(ActorModified {
            timestamp: Utc::now(),
        });
        let payload = serde_json::to_value(&modified).unwrap();
        assert_eq!(event_type_tag(&payload), "Modified");
    }
}
