use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actormodel::actor::{ModelDefinition, UnitOfWork};
use crate::actormodel::event::ActorEvent;
use crate::actormodel::failure::ModelError;
use crate::actormodel::message::{ActorKind, MessageEnvelope, ResponseOutcome};
use crate::actormodel::system::{AnyCommand, CaseSystem};
use crate::case::CaseCommand;
use crate::identity::UserIdentity;
use crate::value::Value;

// ============================================================================
// Timer Service Actor
// ============================================================================
//
// A singleton actor that owns durable timers on behalf of cases. Setting a
// timer persists the job; the actual clock is a live-only side effect that
// is re-armed from recovered state after a restart. When a timer fires, the
// service asks the owning case to raise the event listener's occurrence -
// through the same ask protocol cases use themselves.
//
// ============================================================================

/// Well-known actor id of the singleton timer service.
pub const TIMER_SERVICE_ID: &str = "caseflow-timer-service";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TimerCommand {
    /// Bootstrap-capable: the first timer brings the service to life.
    SetTimer {
        timer_id: String,
        case_id: String,
        plan_item_id: String,
        due: DateTime<Utc>,
    },
    CancelTimer { timer_id: String },
    /// Internal: submitted by the scheduler when a timer elapses.
    FireTimer { timer_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TimerEvent {
    TimerSet { job: TimerJob },
    TimerCanceled { timer_id: String },
    TimerFired { timer_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TimerCallback {
    CaseNotified { timer_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerJob {
    pub timer_id: String,
    pub case_id: String,
    pub plan_item_id: String,
    /// The identity the timer was set under; firing runs as the same user.
    pub user: UserIdentity,
    pub due: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerStatus {
    Pending,
    Fired,
    Canceled,
}

#[derive(Debug, Clone, Default)]
pub struct TimerServiceState {
    pub jobs: Vec<(TimerJob, TimerStatus)>,
}

impl TimerServiceState {
    fn job(&self, timer_id: &str) -> Option<&(TimerJob, TimerStatus)> {
        self.jobs.iter().find(|(j, _)| j.timer_id == timer_id)
    }
}

#[derive(Clone)]
pub struct TimerServices {
    pub system: CaseSystem,
}

// ============================================================================
// Model definition
// ============================================================================

pub struct TimerServiceModel;

impl TimerServiceModel {
    fn schedule(services: &TimerServices, actor_id: &str, job: TimerJob) {
        let system = services.system.clone();
        let actor_id = actor_id.to_string();
        tokio::spawn(async move {
            let now = Utc::now();
            if job.due > now {
                let delay = (job.due - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                tokio::time::sleep(delay).await;
            }

            let envelope = match MessageEnvelope::new(actor_id, job.user.clone()) {
                Ok(envelope) => envelope,
                Err(error) => {
                    tracing::error!(timer_id = %job.timer_id, error = %error, "Cannot build fire envelope");
                    return;
                }
            };
            let response = system
                .request(
                    envelope,
                    AnyCommand::Timer(TimerCommand::FireTimer {
                        timer_id: job.timer_id.clone(),
                    }),
                )
                .await;
            if let Some(failure) = response.failure() {
                // A canceled timer fires into a validation failure; that is
                // the expected way a stale clock is absorbed.
                tracing::debug!(
                    timer_id = %job.timer_id,
                    error = %failure.description,
                    "Timer fire was not accepted"
                );
            }
        });
    }
}

impl ModelDefinition for TimerServiceModel {
    const KIND: ActorKind = ActorKind::TimerService;

    type State = TimerServiceState;
    type Command = TimerCommand;
    type Event = TimerEvent;
    type Callback = TimerCallback;
    type Services = TimerServices;

    fn is_bootstrap(command: &Self::Command) -> bool {
        matches!(command, TimerCommand::SetTimer { .. })
    }

    fn describe(command: &Self::Command) -> &'static str {
        match command {
            TimerCommand::SetTimer { .. } => "SetTimer",
            TimerCommand::CancelTimer { .. } => "CancelTimer",
            TimerCommand::FireTimer { .. } => "FireTimer",
        }
    }

    fn validate(
        state: Option<&Self::State>,
        _envelope: &MessageEnvelope,
        command: &Self::Command,
    ) -> Result<(), ModelError> {
        match command {
            TimerCommand::SetTimer { timer_id, .. } => {
                if let Some(state) = state {
                    if state.job(timer_id).is_some() {
                        return Err(ModelError::invalid_command(format!(
                            "Timer '{}' already exists",
                            timer_id
                        )));
                    }
                }
                Ok(())
            }
            TimerCommand::CancelTimer { timer_id } | TimerCommand::FireTimer { timer_id } => {
                let state =
                    state.ok_or_else(|| ModelError::engine_fault("validation without state"))?;
                match state.job(timer_id) {
                    Some((_, TimerStatus::Pending)) => Ok(()),
                    Some((_, status)) => Err(ModelError::invalid_command(format!(
                        "Timer '{}' is not pending (status {:?})",
                        timer_id, status
                    ))),
                    None => Err(ModelError::invalid_command(format!(
                        "Unknown timer '{}'",
                        timer_id
                    ))),
                }
            }
        }
    }

    fn process(uow: &mut UnitOfWork<Self>, command: Self::Command) -> Result<(), ModelError> {
        match command {
            TimerCommand::SetTimer {
                timer_id,
                case_id,
                plan_item_id,
                due,
            } => {
                let job = TimerJob {
                    timer_id: timer_id.clone(),
                    case_id,
                    plan_item_id,
                    user: uow.user.clone(),
                    due,
                };
                uow.emit(TimerEvent::TimerSet { job })?;
                uow.set_response(Value::from(timer_id));
            }
            TimerCommand::CancelTimer { timer_id } => {
                uow.emit(TimerEvent::TimerCanceled { timer_id })?;
            }
            TimerCommand::FireTimer { timer_id } => {
                let job = uow
                    .state()
                    .and_then(|s| s.job(&timer_id))
                    .map(|(j, _)| j.clone())
                    .ok_or_else(|| ModelError::engine_fault("fired timer vanished"))?;
                uow.emit(TimerEvent::TimerFired {
                    timer_id: timer_id.clone(),
                })?;
                uow.ask(
                    job.case_id,
                    AnyCommand::Case(CaseCommand::RaiseEvent {
                        plan_item_id: job.plan_item_id,
                    }),
                    TimerCallback::CaseNotified { timer_id },
                );
            }
        }
        Ok(())
    }

    fn update_state(state: &mut Option<Self::State>, event: &Self::Event) -> Result<(), ModelError> {
        let state = state.get_or_insert_with(TimerServiceState::default);
        match event {
            TimerEvent::TimerSet { job } => {
                state.jobs.push((job.clone(), TimerStatus::Pending));
                Ok(())
            }
            TimerEvent::TimerCanceled { timer_id } => {
                set_status(state, timer_id, TimerStatus::Canceled)
            }
            TimerEvent::TimerFired { timer_id } => set_status(state, timer_id, TimerStatus::Fired),
        }
    }

    fn handle_response(
        _uow: &mut UnitOfWork<Self>,
        callback: Self::Callback,
        outcome: ResponseOutcome,
    ) -> Result<(), ModelError> {
        let TimerCallback::CaseNotified { timer_id } = callback;
        if let ResponseOutcome::Failure(failure) = outcome {
            tracing::warn!(
                timer_id = %timer_id,
                error = %failure.description,
                "Case rejected the timer occurrence"
            );
        }
        Ok(())
    }

    fn after_commit(
        actor_id: &str,
        _state: Option<&Self::State>,
        events: &[ActorEvent<Self::Event, Self::Callback>],
        services: &Self::Services,
    ) {
        for event in events {
            if let ActorEvent::Domain(TimerEvent::TimerSet { job }) = event {
                Self::schedule(services, actor_id, job.clone());
            }
        }
    }

    fn on_recovery_complete(actor_id: &str, state: Option<&Self::State>, services: &Self::Services) {
        let Some(state) = state else { return };
        let mut rearmed = 0;
        for (job, status) in &state.jobs {
            if *status == TimerStatus::Pending {
                Self::schedule(services, actor_id, job.clone());
                rearmed += 1;
            }
        }
        if rearmed > 0 {
            tracing::info!(actor_id = actor_id, timers = rearmed, "Re-armed recovered timers");
        }
    }
}

fn set_status(
    state: &mut TimerServiceState,
    timer_id: &str,
    status: TimerStatus,
) -> Result<(), ModelError> {
    match state.jobs.iter_mut().find(|(j, _)| j.timer_id == timer_id) {
        Some(entry) => {
            entry.1 = status;
            Ok(())
        }
        None => Err(ModelError::engine_fault(format!(
            "timer event for unknown timer '{}'",
            timer_id
        ))),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
