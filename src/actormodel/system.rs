use kameo::actor::ActorRef;
use kameo::Actor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::actormodel::actor::{CellMessage, CommandBody, ModelActorCell, ReplySink};
use crate::actormodel::failure::ModelError;
use crate::actormodel::lastmodified::{ActorLastModified, LastModifiedRegistry};
use crate::actormodel::message::{
    ActorKind, EngineConfig, MessageEnvelope, MessageId, ModelResponse, ResponseOutcome,
};
use crate::case::sentry::{ConditionEvaluator, LiteralConditionEvaluator};
use crate::case::{CaseCommand, CaseModel, CaseServices};
use crate::consent::{ConsentGroupCommand, ConsentGroupModel};
use crate::identity::UserIdentity;
use crate::journal::{Journal, RetryConfig};
use crate::process::{
    EchoProcessExecutor, ProcessCommand, ProcessExecutor, ProcessServices, ProcessTaskModel,
};
use crate::tenant::{TenantCommand, TenantModel};
use crate::timer::{TimerCommand, TimerServiceModel, TimerServices};

// ============================================================================
// Case System - actor directory and router
// ============================================================================
//
// Owns the mailbox registry (actor id -> cell), spawns cells on demand, and
// routes three kinds of traffic: commands from callers, commands dispatched
// between actors (asks), and the correlated responses travelling back.
//
// Commands for different actor ids run fully in parallel; commands for one
// actor id serialize in its cell's mailbox.
//
// ============================================================================

/// The closed set of commands the system routes, one variant per actor
/// family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "command")]
pub enum AnyCommand {
    Case(CaseCommand),
    Tenant(TenantCommand),
    ConsentGroup(ConsentGroupCommand),
    Process(ProcessCommand),
    Timer(TimerCommand),
}

impl AnyCommand {
    pub fn kind(&self) -> ActorKind {
        match self {
            AnyCommand::Case(_) => ActorKind::Case,
            AnyCommand::Tenant(_) => ActorKind::Tenant,
            AnyCommand::ConsentGroup(_) => ActorKind::ConsentGroup,
            AnyCommand::Process(_) => ActorKind::ProcessTask,
            AnyCommand::Timer(_) => ActorKind::TimerService,
        }
    }
}

#[derive(Clone)]
enum MailboxRef {
    Case(ActorRef<ModelActorCell<CaseModel>>),
    Tenant(ActorRef<ModelActorCell<TenantModel>>),
    ConsentGroup(ActorRef<ModelActorCell<ConsentGroupModel>>),
    Process(ActorRef<ModelActorCell<ProcessTaskModel>>),
    Timer(ActorRef<ModelActorCell<TimerServiceModel>>),
}

impl MailboxRef {
    fn kind(&self) -> ActorKind {
        match self {
            MailboxRef::Case(_) => ActorKind::Case,
            MailboxRef::Tenant(_) => ActorKind::Tenant,
            MailboxRef::ConsentGroup(_) => ActorKind::ConsentGroup,
            MailboxRef::Process(_) => ActorKind::ProcessTask,
            MailboxRef::Timer(_) => ActorKind::TimerService,
        }
    }

    fn kill(&self) {
        match self {
            MailboxRef::Case(r) => r.kill(),
            MailboxRef::Tenant(r) => r.kill(),
            MailboxRef::ConsentGroup(r) => r.kill(),
            MailboxRef::Process(r) => r.kill(),
            MailboxRef::Timer(r) => r.kill(),
        }
    }
}

struct SystemInner {
    journal: Arc<dyn Journal>,
    config: EngineConfig,
    retry: RetryConfig,
    last_modified: LastModifiedRegistry,
    registry: Mutex<HashMap<String, MailboxRef>>,
    /// Which family each actor id belongs to; survives eviction so a
    /// response can revive its asker.
    kinds: Mutex<HashMap<String, ActorKind>>,
    process_executor: Arc<dyn ProcessExecutor>,
    condition_evaluator: Arc<dyn ConditionEvaluator>,
}

#[derive(Clone)]
pub struct CaseSystem {
    inner: Arc<SystemInner>,
}

impl CaseSystem {
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self::with_collaborators(
            journal,
            EngineConfig::default(),
            RetryConfig::default(),
            Arc::new(EchoProcessExecutor),
            Arc::new(LiteralConditionEvaluator),
        )
    }

    pub fn with_collaborators(
        journal: Arc<dyn Journal>,
        config: EngineConfig,
        retry: RetryConfig,
        process_executor: Arc<dyn ProcessExecutor>,
        condition_evaluator: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        Self {
            inner: Arc::new(SystemInner {
                journal,
                config,
                retry,
                last_modified: LastModifiedRegistry::new(),
                registry: Mutex::new(HashMap::new()),
                kinds: Mutex::new(HashMap::new()),
                process_executor,
                condition_evaluator,
            }),
        }
    }

    pub fn last_modified_registry(&self) -> &LastModifiedRegistry {
        &self.inner.last_modified
    }

    // ------------------------------------------------------------------
    // Caller API
    // ------------------------------------------------------------------

    /// Send a command and await its response. Every command gets exactly
    /// one response; routing failures come back as failure responses.
    pub async fn request(&self, envelope: MessageEnvelope, command: AnyCommand) -> ModelResponse {
        let message_id = envelope.message_id;
        let actor_id = envelope.actor_id.clone();
        let (sender, receiver) = oneshot::channel();
        self.deliver_command(envelope, command, ReplySink::Caller(sender))
            .await;
        match receiver.await {
            Ok(response) => response,
            Err(_) => ModelResponse {
                message_id,
                actor_id,
                last_modified: None,
                outcome: ResponseOutcome::Failure(
                    ModelError::engine_fault("actor terminated before responding").into(),
                ),
            },
        }
    }

    /// Read-your-writes: wait until the actor named by `token` has persisted
    /// at least the token's timestamp, then send.
    pub async fn request_when(
        &self,
        token: &ActorLastModified,
        envelope: MessageEnvelope,
        command: AnyCommand,
    ) -> ModelResponse {
        self.inner.last_modified.wait_until(token).await;
        self.request(envelope, command).await
    }

    /// Toggle persisted debug-event capture for an actor.
    pub async fn set_debug_mode(
        &self,
        actor_id: &str,
        user: UserIdentity,
        enabled: bool,
    ) -> ModelResponse {
        let envelope = match MessageEnvelope::new(actor_id, user) {
            Ok(envelope) => envelope,
            Err(error) => {
                return ModelResponse {
                    message_id: MessageId::fresh(),
                    actor_id: actor_id.to_string(),
                    last_modified: None,
                    outcome: ResponseOutcome::Failure(error.into()),
                }
            }
        };
        let kind = self.inner.kinds.lock().unwrap_or_else(|e| e.into_inner()).get(actor_id).copied();
        let Some(kind) = kind else {
            return ModelResponse {
                message_id: envelope.message_id,
                actor_id: actor_id.to_string(),
                last_modified: None,
                outcome: ResponseOutcome::Failure(
                    ModelError::ActorNotFound(actor_id.to_string()).into(),
                ),
            };
        };

        let message_id = envelope.message_id;
        let (sender, receiver) = oneshot::channel();
        self.deliver_debug(envelope, kind, enabled, ReplySink::Caller(sender))
            .await;
        receiver.await.unwrap_or_else(|_| ModelResponse {
            message_id,
            actor_id: actor_id.to_string(),
            last_modified: None,
            outcome: ResponseOutcome::Failure(
                ModelError::engine_fault("actor terminated before responding").into(),
            ),
        })
    }

    /// Runtime unload: kill the cell and drop it from the registry. Not a
    /// domain deletion - the journal keeps the actor's history and the next
    /// command revives it through recovery.
    pub fn terminate(&self, actor_id: &str) {
        let removed = {
            let mut registry = self.inner.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.remove(actor_id)
        };
        if let Some(mailbox) = removed {
            tracing::info!(actor_id = actor_id, "Terminating actor (runtime unload)");
            mailbox.kill();
        }
    }

    // ------------------------------------------------------------------
    // Engine-internal routing
    // ------------------------------------------------------------------

    /// Drop a broken cell from the registry so the next command spawns a
    /// fresh one that recovers from the journal.
    pub(crate) fn evict(&self, actor_id: &str) {
        let mut registry = self.inner.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.remove(actor_id);
    }

    /// Dispatch a persisted ask. Fire-and-forget from the sender's point of
    /// view; any routing failure is delivered back as a failure response so
    /// the asker's failure callback always runs.
    pub(crate) fn dispatch_ask(
        &self,
        from_actor_id: String,
        correlation_id: MessageId,
        user: UserIdentity,
        target_actor_id: String,
        command: AnyCommand,
    ) {
        let system = self.clone();
        tokio::spawn(async move {
            let envelope = match MessageEnvelope::new(target_actor_id.clone(), user) {
                Ok(envelope) => envelope,
                Err(error) => {
                    system
                        .deliver_response(
                            &from_actor_id,
                            correlation_id,
                            ResponseOutcome::Failure(error.into()),
                        )
                        .await;
                    return;
                }
            };
            system
                .deliver_command(
                    envelope,
                    command,
                    ReplySink::Actor {
                        actor_id: from_actor_id,
                        correlation_id,
                    },
                )
                .await;
        });
    }

    /// Route a correlated response back to the actor that asked, reviving
    /// it from the journal if it has been unloaded in the meantime.
    pub(crate) async fn deliver_response(
        &self,
        target_actor_id: &str,
        correlation_id: MessageId,
        outcome: ResponseOutcome,
    ) {
        let kind = {
            let kinds = self.inner.kinds.lock().unwrap_or_else(|e| e.into_inner());
            kinds.get(target_actor_id).copied()
        };
        let Some(kind) = kind else {
            tracing::warn!(
                actor_id = target_actor_id,
                correlation_id = %correlation_id,
                "Response for an actor this system never spawned; dropping"
            );
            return;
        };
        let mailbox = self.get_or_spawn(target_actor_id, kind);

        macro_rules! tell_response {
            ($actor_ref:expr) => {
                if $actor_ref
                    .tell(CellMessage::Response {
                        correlation_id,
                        outcome,
                    })
                    .send()
                    .await
                    .is_err()
                {
                    tracing::warn!(
                        actor_id = target_actor_id,
                        correlation_id = %correlation_id,
                        "Asker's mailbox is gone; response dropped (recovery will re-match)"
                    );
                }
            };
        }
        match mailbox {
            MailboxRef::Case(r) => tell_response!(r),
            MailboxRef::Tenant(r) => tell_response!(r),
            MailboxRef::ConsentGroup(r) => tell_response!(r),
            MailboxRef::Process(r) => tell_response!(r),
            MailboxRef::Timer(r) => tell_response!(r),
        }
    }

    async fn deliver_command(
        &self,
        envelope: MessageEnvelope,
        command: AnyCommand,
        reply: ReplySink,
    ) {
        let kind = command.kind();
        // The kinds map outlives evictions: an actor id is pinned to its
        // family for as long as this system runs.
        let existing_kind = {
            let kinds = self.inner.kinds.lock().unwrap_or_else(|e| e.into_inner());
            kinds.get(&envelope.actor_id).copied()
        };
        if let Some(existing) = existing_kind {
            if existing != kind {
                self.answer_sink(
                    &envelope,
                    ModelError::invalid_command(format!(
                        "Actor '{}' is a {}, not a {}",
                        envelope.actor_id, existing, kind
                    )),
                    reply,
                )
                .await;
                return;
            }
        }

        let mailbox = self.get_or_spawn(&envelope.actor_id, kind);

        macro_rules! tell_command {
            ($actor_ref:expr, $inner:expr) => {
                if $actor_ref
                    .tell(CellMessage::Command {
                        envelope: envelope.clone(),
                        body: CommandBody::Domain($inner),
                        reply,
                    })
                    .send()
                    .await
                    .is_err()
                {
                    tracing::error!(
                        actor_id = %envelope.actor_id,
                        "Mailbox rejected command; actor is shutting down"
                    );
                }
            };
        }
        match (mailbox, command) {
            (MailboxRef::Case(r), AnyCommand::Case(c)) => tell_command!(r, c),
            (MailboxRef::Tenant(r), AnyCommand::Tenant(c)) => tell_command!(r, c),
            (MailboxRef::ConsentGroup(r), AnyCommand::ConsentGroup(c)) => tell_command!(r, c),
            (MailboxRef::Process(r), AnyCommand::Process(c)) => tell_command!(r, c),
            (MailboxRef::Timer(r), AnyCommand::Timer(c)) => tell_command!(r, c),
            (mailbox, _) => {
                self.answer_sink(
                    &envelope,
                    ModelError::invalid_command(format!(
                        "Actor '{}' is a {}, not a {}",
                        envelope.actor_id,
                        mailbox.kind(),
                        kind
                    )),
                    reply,
                )
                .await;
            }
        }
    }

    async fn deliver_debug(
        &self,
        envelope: MessageEnvelope,
        kind: ActorKind,
        enabled: bool,
        reply: ReplySink,
    ) {
        let mailbox = self.get_or_spawn(&envelope.actor_id, kind);

        macro_rules! tell_debug {
            ($actor_ref:expr) => {
                let _ = $actor_ref
                    .tell(CellMessage::Command {
                        envelope,
                        body: CommandBody::SetDebugMode(enabled),
                        reply,
                    })
                    .send()
                    .await;
            };
        }
        match mailbox {
            MailboxRef::Case(r) => {
                tell_debug!(r);
            }
            MailboxRef::Tenant(r) => {
                tell_debug!(r);
            }
            MailboxRef::ConsentGroup(r) => {
                tell_debug!(r);
            }
            MailboxRef::Process(r) => {
                tell_debug!(r);
            }
            MailboxRef::Timer(r) => {
                tell_debug!(r);
            }
        }
    }

    async fn answer_sink(&self, envelope: &MessageEnvelope, error: ModelError, reply: ReplySink) {
        let response = ModelResponse {
            message_id: envelope.message_id,
            actor_id: envelope.actor_id.clone(),
            last_modified: None,
            outcome: ResponseOutcome::Failure(error.into()),
        };
        match reply {
            ReplySink::Caller(sender) => {
                let _ = sender.send(response);
            }
            ReplySink::Actor {
                actor_id,
                correlation_id,
            } => {
                self.deliver_response(&actor_id, correlation_id, response.outcome)
                    .await;
            }
            ReplySink::None => {}
        }
    }

    fn get_or_spawn(&self, actor_id: &str, kind: ActorKind) -> MailboxRef {
        let mut registry = self.inner.registry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mailbox) = registry.get(actor_id) {
            return mailbox.clone();
        }

        tracing::debug!(actor_id = actor_id, kind = %kind, "Spawning actor cell");
        let inner = &self.inner;
        let mailbox = match kind {
            ActorKind::Case => MailboxRef::Case(ModelActorCell::<CaseModel>::spawn(
                ModelActorCell::new(
                    actor_id.to_string(),
                    inner.journal.clone(),
                    self.clone(),
                    inner.config.clone(),
                    inner.retry.clone(),
                    CaseServices {
                        evaluator: inner.condition_evaluator.clone(),
                    },
                ),
            )),
            ActorKind::Tenant => MailboxRef::Tenant(ModelActorCell::<TenantModel>::spawn(
                ModelActorCell::new(
                    actor_id.to_string(),
                    inner.journal.clone(),
                    self.clone(),
                    inner.config.clone(),
                    inner.retry.clone(),
                    (),
                ),
            )),
            ActorKind::ConsentGroup => MailboxRef::ConsentGroup(
                ModelActorCell::<ConsentGroupModel>::spawn(ModelActorCell::new(
                    actor_id.to_string(),
                    inner.journal.clone(),
                    self.clone(),
                    inner.config.clone(),
                    inner.retry.clone(),
                    (),
                )),
            ),
            ActorKind::ProcessTask => MailboxRef::Process(ModelActorCell::<ProcessTaskModel>::spawn(
                ModelActorCell::new(
                    actor_id.to_string(),
                    inner.journal.clone(),
                    self.clone(),
                    inner.config.clone(),
                    inner.retry.clone(),
                    ProcessServices {
                        executor: inner.process_executor.clone(),
                    },
                ),
            )),
            ActorKind::TimerService => MailboxRef::Timer(ModelActorCell::<TimerServiceModel>::spawn(
                ModelActorCell::new(
                    actor_id.to_string(),
                    inner.journal.clone(),
                    self.clone(),
                    inner.config.clone(),
                    inner.retry.clone(),
                    TimerServices {
                        system: self.clone(),
                    },
                ),
            )),
        };

        registry.insert(actor_id.to_string(), mailbox.clone());
        self.inner
            .kinds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(actor_id.to_string(), kind);
        mailbox
    }
}
