use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::actormodel::failure::ModelError;

// ============================================================================
// Last-Modified Tokens & Read Consistency
// ============================================================================
//
// Writers publish a new consistency timestamp with every commit event.
// Readers that hold a token from an earlier write can block until the actor
// has persisted at least that timestamp, giving read-your-own-writes across
// the command/query split.
//
// Wire form of a token: "<ISO-8601-instant>;<actorId>".
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorLastModified {
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
}

impl ActorLastModified {
    pub fn new(actor_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            actor_id: actor_id.into(),
        }
    }

    pub fn parse(token: &str) -> Result<Self, ModelError> {
        let (instant, actor_id) = token.split_once(';').ok_or_else(|| {
            ModelError::InvalidLastModified(format!("missing ';' separator in '{}'", token))
        })?;
        if actor_id.is_empty() {
            return Err(ModelError::InvalidLastModified(format!(
                "missing actor id segment in '{}'",
                token
            )));
        }
        let timestamp = DateTime::parse_from_rfc3339(instant)
            .map_err(|e| {
                ModelError::InvalidLastModified(format!("bad timestamp '{}': {}", instant, e))
            })?
            .with_timezone(&Utc);
        Ok(Self {
            timestamp,
            actor_id: actor_id.to_string(),
        })
    }
}

impl fmt::Display for ActorLastModified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.actor_id
        )
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Shared waiter table keyed by actor id. This is deliberately the one place
/// in the engine with cross-thread mutable state; a single coarse lock around
/// register/publish rules out lost wake-ups.
#[derive(Default)]
pub struct LastModifiedRegistry {
    inner: Mutex<HashMap<String, ActorProgress>>,
}

#[derive(Default)]
struct ActorProgress {
    last: Option<DateTime<Utc>>,
    waiters: Vec<Waiter>,
}

struct Waiter {
    at_least: DateTime<Utc>,
    notify: oneshot::Sender<()>,
}

impl LastModifiedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `actor_id` has persisted up to `timestamp` and wake every
    /// waiter that is now satisfied.
    pub fn publish(&self, actor_id: &str, timestamp: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let progress = inner.entry(actor_id.to_string()).or_default();
        if progress.last.map(|last| last < timestamp).unwrap_or(true) {
            progress.last = Some(timestamp);
        }
        let reached = progress.last.unwrap_or(timestamp);
        let mut remaining = Vec::with_capacity(progress.waiters.len());
        for waiter in progress.waiters.drain(..) {
            if waiter.at_least <= reached {
                let _ = waiter.notify.send(());
            } else {
                remaining.push(waiter);
            }
        }
        progress.waiters = remaining;
    }

    /// The most recently published timestamp, if any.
    pub fn current(&self, actor_id: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(actor_id).and_then(|p| p.last)
    }

    /// Block until `token.actor_id` has persisted at least `token.timestamp`.
    pub async fn wait_until(&self, token: &ActorLastModified) {
        let receiver = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let progress = inner.entry(token.actor_id.clone()).or_default();
            if progress.last.map(|last| last >= token.timestamp).unwrap_or(false) {
                return;
            }
            let (tx, rx) = oneshot::channel();
            progress.waiters.push(Waiter {
                at_least: token.timestamp,
                notify: tx,
            });
            rx
        };
        // A dropped sender can only mean registry teardown; treat it as woken.
        let _ = receiver.await;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_token_round_trip() {
        let token = ActorLastModified::new("case-42", Utc::now());
        let parsed = ActorLastModified::parse(&token.to_string()).unwrap();
        assert_eq!(parsed.actor_id, token.actor_id);
        // RFC 3339 micros keeps the full precision chrono produces on Linux.
        assert_eq!(
            parsed.timestamp.timestamp_micros(),
            token.timestamp.timestamp_micros()
        );
    }

    #[test]
    fn test_token_parse_rejects_malformed() {
        assert!(matches!(
            ActorLastModified::parse("2024-01-01T00:00:00Z"),
            Err(ModelError::InvalidLastModified(_))
        ));
        assert!(matches!(
            ActorLastModified::parse("not-a-timestamp;case-1"),
            Err(ModelError::InvalidLastModified(_))
        ));
        assert!(matches!(
            ActorLastModified::parse("2024-01-01T00:00:00Z;"),
            Err(ModelError::InvalidLastModified(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_satisfied() {
        let registry = LastModifiedRegistry::new();
        let now = Utc::now();
        registry.publish("case-1", now);
        registry
            .wait_until(&ActorLastModified::new("case-1", now))
            .await;
    }

    #[tokio::test]
    async fn test_wait_blocks_until_published() {
        let registry = Arc::new(LastModifiedRegistry::new());
        let now = Utc::now();
        let token = ActorLastModified::new("case-1", now);

        let waiter = {
            let registry = registry.clone();
            let token = token.clone();
            tokio::spawn(async move {
                registry.wait_until(&token).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        registry.publish("case-1", now);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_does_not_wake_future_waiters() {
        let registry = Arc::new(LastModifiedRegistry::new());
        let early = Utc::now();
        let late = early + chrono::Duration::seconds(10);

        let waiter = {
            let registry = registry.clone();
            let token = ActorLastModified::new("case-1", late);
            tokio::spawn(async move {
                registry.wait_until(&token).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.publish("case-1", early);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        registry.publish("case-1", late);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
    }
}
