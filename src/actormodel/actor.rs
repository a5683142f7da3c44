use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::actormodel::correlation::{CorrelationTable, PendingRequest};
use crate::actormodel::event::{
    event_type_tag, ActorEvent, ActorModified, DebugInfo, DebugModeChanged, EngineVersionChanged,
    RequestConcluded, RequestDispatched,
};
use crate::actormodel::failure::ModelError;
use crate::actormodel::lastmodified::ActorLastModified;
use crate::actormodel::message::{
    ActorKind, EngineConfig, MessageEnvelope, MessageId, ModelResponse, ResponseOutcome,
};
use crate::actormodel::system::{AnyCommand, CaseSystem};
use crate::identity::UserIdentity;
use crate::journal::retry::append_with_retry;
use crate::journal::{Journal, PersistedEvent, RetryConfig};
use crate::value::Value;

// ============================================================================
// Model Actor Runtime
// ============================================================================
//
// One ModelActorCell per actor id, generic over the actor family. The cell
// enforces the command lifecycle:
//
//   validate -> process -> finalize -> persist -> apply -> respond
//
// and the event-sourced recovery protocol: on start, the persisted stream is
// replayed through the same state-application path that live processing
// uses, so recovered state is identical to pre-crash state.
//
// The kameo mailbox delivers one message at a time and the handler is
// awaited to completion, which is exactly the single-writer guarantee: no
// command begins until the previous command's persist+apply+respond cycle
// has finished.
//
// ============================================================================

/// One actor family: its state, commands, events and ask-callbacks, as
/// closed types. The runtime owns the lifecycle; the family owns the
/// semantics.
pub trait ModelDefinition: Sized + Send + 'static {
    const KIND: ActorKind;

    type State: Clone + Send + Sync + fmt::Debug + 'static;
    type Command: Clone + Send + fmt::Debug + Serialize + DeserializeOwned + 'static;
    type Event: Clone + Send + Sync + fmt::Debug + Serialize + DeserializeOwned + 'static;
    /// Callback variants for responses to asks this family sends.
    type Callback: Clone + Send + Sync + fmt::Debug + Serialize + DeserializeOwned + 'static;
    /// Injected collaborators available during processing.
    type Services: Clone + Send + Sync + 'static;

    /// Bootstrap commands may address a not-yet-existing actor.
    fn is_bootstrap(command: &Self::Command) -> bool;

    /// Short command name for logs and debug capture.
    fn describe(command: &Self::Command) -> &'static str;

    /// Read-only check against current state. Must not mutate anything.
    fn validate(
        state: Option<&Self::State>,
        envelope: &MessageEnvelope,
        command: &Self::Command,
    ) -> Result<(), ModelError>;

    /// Domain logic: buffer events and set a response on the unit of work.
    /// Runs against a working copy of state; committed state is untouched
    /// until the buffer has been persisted.
    fn process(uow: &mut UnitOfWork<Self>, command: Self::Command) -> Result<(), ModelError>;

    /// Pure state application. The only mechanism of state change, shared
    /// between live processing and recovery replay.
    fn update_state(state: &mut Option<Self::State>, event: &Self::Event) -> Result<(), ModelError>;

    /// Runs a registered callback when the response to an earlier ask
    /// arrives, as a fresh unit of work.
    fn handle_response(
        uow: &mut UnitOfWork<Self>,
        callback: Self::Callback,
        outcome: ResponseOutcome,
    ) -> Result<(), ModelError>;

    /// Live-only side effects after a unit of work was persisted and
    /// applied. Never invoked during recovery.
    fn after_commit(
        _actor_id: &str,
        _state: Option<&Self::State>,
        _events: &[ActorEvent<Self::Event, Self::Callback>],
        _services: &Self::Services,
    ) {
    }

    /// Live-only side effects once recovery has completed (e.g. re-arming
    /// schedules derived from recovered state).
    fn on_recovery_complete(_actor_id: &str, _state: Option<&Self::State>, _services: &Self::Services) {
    }
}

// ============================================================================
// Unit of Work
// ============================================================================

/// The in-flight context of a single command: a working copy of state, the
/// ordered event buffer and the pending response. Discarding the unit of
/// work discards everything; nothing leaks into committed state.
pub struct UnitOfWork<M: ModelDefinition> {
    pub actor_id: String,
    pub tenant: String,
    pub user: UserIdentity,
    /// Command receipt time; becomes the new last-modified on commit.
    pub timestamp: DateTime<Utc>,
    services: M::Services,
    state: Option<M::State>,
    events: Vec<ActorEvent<M::Event, M::Callback>>,
    response: Option<ResponseOutcome>,
    debug_lines: Vec<String>,
    debug_enabled: bool,
}

impl<M: ModelDefinition> UnitOfWork<M> {
    fn new(
        actor_id: String,
        tenant: String,
        user: UserIdentity,
        timestamp: DateTime<Utc>,
        services: M::Services,
        state: Option<M::State>,
        debug_enabled: bool,
    ) -> Self {
        Self {
            actor_id,
            tenant,
            user,
            timestamp,
            services,
            state,
            events: Vec::new(),
            response: None,
            debug_lines: Vec::new(),
            debug_enabled,
        }
    }

    pub fn state(&self) -> Option<&M::State> {
        self.state.as_ref()
    }

    /// Working state for domain engines that apply events themselves; the
    /// caller must record every event it applies.
    pub fn state_mut(&mut self) -> &mut Option<M::State> {
        &mut self.state
    }

    pub fn services(&self) -> &M::Services {
        &self.services
    }

    /// Apply `event` to the working state and buffer it.
    pub fn emit(&mut self, event: M::Event) -> Result<(), ModelError> {
        M::update_state(&mut self.state, &event)?;
        self.events.push(ActorEvent::Domain(event));
        Ok(())
    }

    /// Buffer an event that the caller already applied to the working state.
    pub fn record(&mut self, event: M::Event) {
        self.events.push(ActorEvent::Domain(event));
    }

    pub(crate) fn push_engine(&mut self, event: ActorEvent<M::Event, M::Callback>) {
        self.events.push(event);
    }

    /// Send `command` to another actor. The request marker is persisted as
    /// part of this unit of work; the actual dispatch happens only after
    /// persistence succeeded, and never during recovery.
    pub fn ask(&mut self, target_actor_id: impl Into<String>, command: AnyCommand, callback: M::Callback) -> MessageId {
        let correlation_id = MessageId::fresh();
        self.events
            .push(ActorEvent::RequestDispatched(RequestDispatched {
                correlation_id,
                target_actor_id: target_actor_id.into(),
                user: self.user.clone(),
                command: Box::new(command),
                callback,
            }));
        correlation_id
    }

    pub fn set_response(&mut self, value: Value) {
        self.response = Some(ResponseOutcome::Success(value));
    }

    /// Answer with a failure while still persisting the buffered events
    /// (e.g. a task that records its own fault).
    pub fn fail_response(&mut self, error: ModelError) {
        self.response = Some(ResponseOutcome::Failure(error.into()));
    }

    /// Capture a line for the debug stream; dropped unless debug mode is on.
    pub fn debug(&mut self, line: impl Into<String>) {
        if self.debug_enabled {
            self.debug_lines.push(line.into());
        }
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

// ============================================================================
// Mailbox messages
// ============================================================================

pub enum CommandBody<C> {
    Domain(C),
    /// Engine-level toggle, persisted so it survives recovery.
    SetDebugMode(bool),
}

/// Where the response of a command cycle goes.
pub enum ReplySink {
    /// An external caller awaiting on a oneshot.
    Caller(oneshot::Sender<ModelResponse>),
    /// Another actor that asked; the outcome is routed back as a correlated
    /// response message.
    Actor {
        actor_id: String,
        correlation_id: MessageId,
    },
    /// Nobody is waiting (internal cycles such as response handling).
    None,
}

pub enum CellMessage<M: ModelDefinition> {
    Command {
        envelope: MessageEnvelope,
        body: CommandBody<M::Command>,
        reply: ReplySink,
    },
    Response {
        correlation_id: MessageId,
        outcome: ResponseOutcome,
    },
}

// ============================================================================
// The Cell
// ============================================================================

pub struct ModelActorCell<M: ModelDefinition> {
    actor_id: String,
    tenant: String,
    state: Option<M::State>,
    last_modified: Option<DateTime<Utc>>,
    /// Next sequence number in the persisted stream.
    sequence: u64,
    debug_mode: bool,
    /// Engine version found in the recovered stream, if any.
    stream_version: Option<String>,
    correlation: CorrelationTable<M::Callback>,
    failure_count: u64,
    /// Set when recovery or persistence failed; the cell then refuses every
    /// command with an engine fault until it is restarted.
    broken: Option<String>,
    in_flight: bool,
    journal: Arc<dyn Journal>,
    system: CaseSystem,
    config: EngineConfig,
    retry: RetryConfig,
    services: M::Services,
}

impl<M: ModelDefinition> ModelActorCell<M> {
    pub fn new(
        actor_id: String,
        journal: Arc<dyn Journal>,
        system: CaseSystem,
        config: EngineConfig,
        retry: RetryConfig,
        services: M::Services,
    ) -> Self {
        let debug_mode = config.debug_default;
        Self {
            actor_id,
            tenant: String::new(),
            state: None,
            last_modified: None,
            sequence: 0,
            debug_mode,
            stream_version: None,
            correlation: CorrelationTable::default(),
            failure_count: 0,
            broken: None,
            in_flight: false,
            journal,
            system,
            config,
            retry,
            services,
        }
    }

    fn token(&self) -> Option<ActorLastModified> {
        self.last_modified
            .map(|ts| ActorLastModified::new(self.actor_id.clone(), ts))
    }

    // ------------------------------------------------------------------
    // Recovery
    // ------------------------------------------------------------------

    async fn recover(&mut self) {
        let records = match self.journal.load(&self.actor_id).await {
            Ok(records) => records,
            Err(error) => {
                self.refuse_to_start(0, format!("journal load failed: {}", error));
                return;
            }
        };

        for record in &records {
            let event: ActorEvent<M::Event, M::Callback> =
                match serde_json::from_value(record.payload.clone()) {
                    Ok(event) => event,
                    Err(error) => {
                        self.refuse_to_start(
                            record.sequence,
                            format!("cannot decode persisted event '{}': {}", record.event_type, error),
                        );
                        return;
                    }
                };

            if let Err(error) = self.apply_event(&event) {
                self.refuse_to_start(
                    record.sequence,
                    format!("cannot apply persisted event '{}': {}", record.event_type, error),
                );
                return;
            }

            self.sequence = record.sequence + 1;
            if self.tenant.is_empty() {
                self.tenant = record.tenant.clone();
            }
        }

        if !records.is_empty() {
            tracing::debug!(
                actor_id = %self.actor_id,
                kind = %M::KIND,
                events = records.len(),
                pending_requests = self.correlation.len(),
                "Recovered actor from journal"
            );
            if let Some(ts) = self.last_modified {
                self.system.last_modified_registry().publish(&self.actor_id, ts);
            }
            M::on_recovery_complete(&self.actor_id, self.state.as_ref(), &self.services);
        }
    }

    fn refuse_to_start(&mut self, sequence: u64, reason: String) {
        tracing::error!(
            actor_id = %self.actor_id,
            kind = %M::KIND,
            sequence = sequence,
            reason = %reason,
            "Recovery failed; actor refuses all commands until restarted"
        );
        self.broken = Some(reason);
    }

    // ------------------------------------------------------------------
    // Event application (shared by recovery and live apply)
    // ------------------------------------------------------------------

    fn apply_event(&mut self, event: &ActorEvent<M::Event, M::Callback>) -> Result<(), ModelError> {
        match event {
            ActorEvent::Domain(domain) => M::update_state(&mut self.state, domain),
            ActorEvent::Modified(modified) => {
                self.last_modified = Some(modified.timestamp);
                Ok(())
            }
            ActorEvent::DebugModeChanged(changed) => {
                self.debug_mode = changed.enabled;
                Ok(())
            }
            ActorEvent::EngineVersionChanged(changed) => {
                self.stream_version = Some(changed.version.clone());
                Ok(())
            }
            ActorEvent::RequestDispatched(request) => {
                self.correlation.register(PendingRequest {
                    correlation_id: request.correlation_id,
                    target_actor_id: request.target_actor_id.clone(),
                    user: request.user.clone(),
                    callback: request.callback.clone(),
                });
                Ok(())
            }
            ActorEvent::RequestConcluded(concluded) => {
                self.correlation.conclude(concluded.correlation_id);
                Ok(())
            }
            ActorEvent::DebugInfo(_) => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Command handling
    // ------------------------------------------------------------------

    async fn handle_command(
        &mut self,
        envelope: MessageEnvelope,
        body: CommandBody<M::Command>,
        reply: ReplySink,
    ) {
        if let Some(reason) = self.broken.clone() {
            self.answer_failure(
                envelope.message_id,
                ModelError::engine_fault(format!("actor is unavailable: {}", reason)),
                reply,
            )
            .await;
            return;
        }

        debug_assert!(!self.in_flight, "two commands in flight on one actor");
        self.in_flight = true;
        let receipt = Utc::now();

        match body {
            CommandBody::SetDebugMode(enabled) => {
                let events = vec![ActorEvent::DebugModeChanged(DebugModeChanged { enabled })];
                self.commit_and_respond(
                    envelope.message_id,
                    envelope.user,
                    self.tenant.clone(),
                    receipt,
                    events,
                    Vec::new(),
                    ResponseOutcome::Success(Value::Null),
                    reply,
                )
                .await;
            }
            CommandBody::Domain(command) => {
                self.handle_domain_command(envelope, command, receipt, reply).await;
            }
        }

        self.in_flight = false;
    }

    async fn handle_domain_command(
        &mut self,
        envelope: MessageEnvelope,
        command: M::Command,
        receipt: DateTime<Utc>,
        reply: ReplySink,
    ) {
        let name = M::describe(&command);
        tracing::debug!(
            actor_id = %self.actor_id,
            kind = %M::KIND,
            command = name,
            user = %envelope.user.id,
            "Received command"
        );

        // Until a bootstrap command succeeds, the actor does not exist.
        if self.state.is_none() && !M::is_bootstrap(&command) {
            self.failure_count += 1;
            self.answer_failure(
                envelope.message_id,
                ModelError::ActorNotFound(self.actor_id.clone()),
                reply,
            )
            .await;
            return;
        }

        // Validation reads state but never touches it; a failure leaves no
        // trace - no events, no last-modified change.
        if let Err(error) = M::validate(self.state.as_ref(), &envelope, &command) {
            self.failure_count += 1;
            tracing::debug!(
                actor_id = %self.actor_id,
                command = name,
                error = %error,
                "Command rejected by validation"
            );
            self.answer_failure(envelope.message_id, error, reply).await;
            return;
        }

        let tenant = if self.state.is_none() {
            envelope.tenant.clone()
        } else {
            self.tenant.clone()
        };
        let mut uow = UnitOfWork::<M>::new(
            self.actor_id.clone(),
            tenant.clone(),
            envelope.user.clone(),
            receipt,
            self.services.clone(),
            self.state.clone(),
            self.debug_mode,
        );
        uow.debug(format!("processing command {}", name));

        match M::process(&mut uow, command) {
            Err(error) => {
                // The buffer dies with the unit of work; committed state and
                // last-modified were never touched.
                self.failure_count += 1;
                tracing::debug!(
                    actor_id = %self.actor_id,
                    command = name,
                    error = %error,
                    "Command processing failed"
                );
                self.answer_failure(envelope.message_id, error, reply).await;
            }
            Ok(()) => {
                let UnitOfWork {
                    events,
                    response,
                    debug_lines,
                    ..
                } = uow;
                let outcome = response.unwrap_or(ResponseOutcome::Success(Value::Null));
                self.commit_and_respond(
                    envelope.message_id,
                    envelope.user,
                    tenant,
                    receipt,
                    events,
                    debug_lines,
                    outcome,
                    reply,
                )
                .await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Finalize / persist / apply / respond
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    async fn commit_and_respond(
        &mut self,
        message_id: MessageId,
        user: UserIdentity,
        tenant: String,
        receipt: DateTime<Utc>,
        mut events: Vec<ActorEvent<M::Event, M::Callback>>,
        debug_lines: Vec<String>,
        outcome: ResponseOutcome,
        reply: ReplySink,
    ) {
        let committing = events.iter().any(|e| e.counts_for_commit());

        if committing {
            // Stamp the engine version when this stream has never seen the
            // current one (bootstrap, or recovery under a newer engine).
            if self.stream_version.as_deref() != Some(self.config.engine_version.as_str()) {
                events.insert(
                    0,
                    ActorEvent::EngineVersionChanged(EngineVersionChanged {
                        version: self.config.engine_version.clone(),
                    }),
                );
            }
            // Exactly one commit event per externally visible unit of work.
            events.push(ActorEvent::Modified(ActorModified { timestamp: receipt }));
        }
        if self.debug_mode && !debug_lines.is_empty() {
            events.push(ActorEvent::DebugInfo(DebugInfo { lines: debug_lines }));
        }

        if events.is_empty() {
            // Pure query: nothing to persist, nothing changes.
            self.respond(message_id, outcome, reply).await;
            return;
        }

        let batch = match self.encode_batch(&events, message_id, &user, &tenant) {
            Ok(batch) => batch,
            Err(error) => {
                self.fail_engine(message_id, error, reply).await;
                return;
            }
        };

        if let Err(error) =
            append_with_retry(self.journal.as_ref(), &self.actor_id, &batch, &self.retry).await
        {
            // Committed state was never touched; but the journal may now
            // disagree with what we believe, so this cell steps down and a
            // respawn recovers from what actually persisted.
            self.fail_engine(
                message_id,
                ModelError::engine_fault(format!("persistence failure: {}", error)),
                reply,
            )
            .await;
            return;
        }

        // Apply mirrors recovery: same events, same order, same code path.
        for event in &events {
            if let Err(error) = self.apply_event(event) {
                self.fail_engine(
                    message_id,
                    ModelError::engine_fault(format!(
                        "persisted event failed to apply: {}",
                        error
                    )),
                    reply,
                )
                .await;
                return;
            }
        }
        self.sequence += events.len() as u64;
        if self.tenant.is_empty() {
            self.tenant = tenant;
        }

        if committing {
            self.system
                .last_modified_registry()
                .publish(&self.actor_id, receipt);
        }

        // Only now, with the request markers durable, dispatch the asks.
        for event in &events {
            if let ActorEvent::RequestDispatched(request) = event {
                self.system.dispatch_ask(
                    self.actor_id.clone(),
                    request.correlation_id,
                    request.user.clone(),
                    request.target_actor_id.clone(),
                    (*request.command).clone(),
                );
            }
        }

        M::after_commit(&self.actor_id, self.state.as_ref(), &events, &self.services);

        tracing::debug!(
            actor_id = %self.actor_id,
            kind = %M::KIND,
            events = events.len(),
            sequence = self.sequence,
            "Unit of work persisted and applied"
        );

        self.respond(message_id, outcome, reply).await;
    }

    fn encode_batch(
        &self,
        events: &[ActorEvent<M::Event, M::Callback>],
        message_id: MessageId,
        user: &UserIdentity,
        tenant: &str,
    ) -> Result<Vec<PersistedEvent>, ModelError> {
        let mut batch = Vec::with_capacity(events.len());
        for (offset, event) in events.iter().enumerate() {
            let payload = serde_json::to_value(event)
                .map_err(|e| ModelError::serialization(format!("cannot encode event: {}", e)))?;
            batch.push(PersistedEvent {
                sequence: self.sequence + offset as u64,
                event_type: event_type_tag(&payload),
                payload,
                actor_id: self.actor_id.clone(),
                tenant: tenant.to_string(),
                message_id,
                user: user.clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(batch)
    }

    async fn fail_engine(&mut self, message_id: MessageId, error: ModelError, reply: ReplySink) {
        tracing::error!(
            actor_id = %self.actor_id,
            kind = %M::KIND,
            error = %error,
            "Engine fault; actor steps down for restart"
        );
        self.broken = Some(error.to_string());
        self.system.evict(&self.actor_id);
        self.answer_failure(message_id, error, reply).await;
    }

    async fn answer_failure(&self, message_id: MessageId, error: ModelError, reply: ReplySink) {
        self.respond(message_id, ResponseOutcome::Failure(error.into()), reply)
            .await;
    }

    async fn respond(&self, message_id: MessageId, outcome: ResponseOutcome, reply: ReplySink) {
        let response = ModelResponse {
            message_id,
            actor_id: self.actor_id.clone(),
            last_modified: self.token(),
            outcome,
        };
        match reply {
            ReplySink::Caller(sender) => {
                if sender.send(response).is_err() {
                    tracing::debug!(actor_id = %self.actor_id, "Caller went away before the response");
                }
            }
            ReplySink::Actor {
                actor_id,
                correlation_id,
            } => {
                self.system
                    .deliver_response(&actor_id, correlation_id, response.outcome)
                    .await;
            }
            ReplySink::None => {}
        }
    }

    // ------------------------------------------------------------------
    // Responses to asks this actor sent
    // ------------------------------------------------------------------

    async fn handle_ask_response(&mut self, correlation_id: MessageId, outcome: ResponseOutcome) {
        if self.broken.is_some() {
            tracing::warn!(
                actor_id = %self.actor_id,
                correlation_id = %correlation_id,
                "Dropping response delivered to a broken actor; recovery will re-match it"
            );
            return;
        }

        // Late, duplicate or unknown responses are logged and dropped; the
        // correlation table is the single source of truth.
        let Some(pending) = self.correlation.get(correlation_id).cloned() else {
            tracing::warn!(
                actor_id = %self.actor_id,
                correlation_id = %correlation_id,
                "No pending request for this response; dropping"
            );
            return;
        };

        debug_assert!(!self.in_flight, "two commands in flight on one actor");
        self.in_flight = true;
        let receipt = Utc::now();
        let failed = !matches!(outcome, ResponseOutcome::Success(_));

        let mut uow = UnitOfWork::<M>::new(
            self.actor_id.clone(),
            self.tenant.clone(),
            pending.user.clone(),
            receipt,
            self.services.clone(),
            self.state.clone(),
            self.debug_mode,
        );
        uow.push_engine(ActorEvent::RequestConcluded(RequestConcluded { correlation_id }));
        uow.debug(format!(
            "handling {} response from '{}'",
            if failed { "failure" } else { "success" },
            pending.target_actor_id
        ));

        let events = match M::handle_response(&mut uow, pending.callback, outcome) {
            Ok(()) => {
                let UnitOfWork { events, debug_lines, .. } = uow;
                self.commit_and_respond(
                    MessageId::fresh(),
                    pending.user,
                    self.tenant.clone(),
                    receipt,
                    events,
                    debug_lines,
                    ResponseOutcome::Success(Value::Null),
                    ReplySink::None,
                )
                .await;
                self.in_flight = false;
                return;
            }
            Err(error) => {
                // The callback's own events die with the unit of work, but
                // the request must still conclude or recovery would wait on
                // an answer that already came.
                tracing::error!(
                    actor_id = %self.actor_id,
                    correlation_id = %correlation_id,
                    error = %error,
                    "Response callback failed; concluding the request without its events"
                );
                self.failure_count += 1;
                vec![ActorEvent::RequestConcluded(RequestConcluded { correlation_id })]
            }
        };

        self.commit_and_respond(
            MessageId::fresh(),
            pending.user,
            self.tenant.clone(),
            receipt,
            events,
            Vec::new(),
            ResponseOutcome::Success(Value::Null),
            ReplySink::None,
        )
        .await;
        self.in_flight = false;
    }
}

// ============================================================================
// kameo wiring
// ============================================================================

impl<M: ModelDefinition> Actor for ModelActorCell<M> {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(mut cell: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        cell.recover().await;
        Ok(cell)
    }
}

impl<M: ModelDefinition> Message<CellMessage<M>> for ModelActorCell<M> {
    type Reply = ();

    async fn handle(
        &mut self,
        message: CellMessage<M>,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match message {
            CellMessage::Command {
                envelope,
                body,
                reply,
            } => self.handle_command(envelope, body, reply).await,
            CellMessage::Response {
                correlation_id,
                outcome,
            } => self.handle_ask_response(correlation_id, outcome).await,
        }
    }
}
