use std::collections::HashMap;

use crate::actormodel::message::MessageId;
use crate::identity::UserIdentity;

// ============================================================================
// Cross-Actor Correlation Table
// ============================================================================
//
// Pending outgoing requests, keyed by correlation id. The table itself is
// never persisted: it is rebuilt from the event stream - RequestDispatched
// registers an entry, RequestConcluded removes it - so a recovered actor
// knows exactly which answers it is still waiting for, without re-sending.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct PendingRequest<C> {
    pub correlation_id: MessageId,
    pub target_actor_id: String,
    /// The user context the original unit of work ran under; the response
    /// cycle runs under the same identity.
    pub user: UserIdentity,
    pub callback: C,
}

#[derive(Debug)]
pub struct CorrelationTable<C> {
    entries: HashMap<MessageId, PendingRequest<C>>,
}

impl<C> Default for CorrelationTable<C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<C: Clone> CorrelationTable<C> {
    pub fn register(&mut self, request: PendingRequest<C>) {
        self.entries.insert(request.correlation_id, request);
    }

    pub fn conclude(&mut self, correlation_id: MessageId) -> Option<PendingRequest<C>> {
        self.entries.remove(&correlation_id)
    }

    /// Look up without removing; removal only ever happens by applying a
    /// RequestConcluded event.
    pub fn get(&self, correlation_id: MessageId) -> Option<&PendingRequest<C>> {
        self.entries.get(&correlation_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(correlation_id: MessageId) -> PendingRequest<&'static str> {
        PendingRequest {
            correlation_id,
            target_actor_id: "task-1".to_string(),
            user: UserIdentity::new("alice").unwrap(),
            callback: "callback",
        }
    }

    #[test]
    fn test_register_lookup_conclude() {
        let mut table = CorrelationTable::default();
        let id = MessageId::fresh();
        table.register(pending(id));

        assert_eq!(table.len(), 1);
        assert!(table.get(id).is_some());
        // Lookup does not remove.
        assert!(table.get(id).is_some());

        let removed = table.conclude(id).unwrap();
        assert_eq!(removed.target_actor_id, "task-1");
        assert!(table.is_empty());
        assert!(table.conclude(id).is_none());
    }

    #[test]
    fn test_unknown_correlation_id() {
        let table: CorrelationTable<&'static str> = CorrelationTable::default();
        assert!(table.get(MessageId::fresh()).is_none());
    }
}
