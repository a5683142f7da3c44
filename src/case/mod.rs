use crate::actormodel::actor::{ModelDefinition, UnitOfWork};
use crate::actormodel::failure::ModelError;
use crate::actormodel::message::{ActorKind, MessageEnvelope, ResponseOutcome};
use crate::case::sentry::SharedEvaluator;
use crate::case::state::CaseState;

pub mod behavior;
pub mod commands;
pub mod definition;
pub mod events;
pub mod file;
pub mod planitem;
pub mod sentry;
pub mod state;

pub use commands::{CaseCallback, CaseCommand};
pub use events::CaseEvent;

// ============================================================================
// Case Model Actor
// ============================================================================
//
// The CMMN case as a model actor family: a plan-item hierarchy with sentries
// wired between items, a case file, and a team that scopes authorization.
//
// ============================================================================

pub struct CaseModel;

#[derive(Clone)]
pub struct CaseServices {
    pub evaluator: SharedEvaluator,
}

impl ModelDefinition for CaseModel {
    const KIND: ActorKind = ActorKind::Case;

    type State = CaseState;
    type Command = CaseCommand;
    type Event = CaseEvent;
    type Callback = CaseCallback;
    type Services = CaseServices;

    fn is_bootstrap(command: &Self::Command) -> bool {
        command.is_bootstrap()
    }

    fn describe(command: &Self::Command) -> &'static str {
        command.describe()
    }

    fn validate(
        state: Option<&Self::State>,
        envelope: &MessageEnvelope,
        command: &Self::Command,
    ) -> Result<(), ModelError> {
        commands::validate(state, envelope, command)
    }

    fn process(uow: &mut UnitOfWork<Self>, command: Self::Command) -> Result<(), ModelError> {
        commands::process(uow, command)
    }

    fn update_state(state: &mut Option<Self::State>, event: &Self::Event) -> Result<(), ModelError> {
        match event {
            CaseEvent::CaseStarted(started) => {
                *state = Some(CaseState::from_started(started));
                Ok(())
            }
            other => {
                let state = state
                    .as_mut()
                    .ok_or_else(|| ModelError::engine_fault("case event before CaseStarted"))?;
                // Reactions matter only while generating; applying just folds.
                state.apply(other).map(|_| ())
            }
        }
    }

    fn handle_response(
        uow: &mut UnitOfWork<Self>,
        callback: Self::Callback,
        outcome: ResponseOutcome,
    ) -> Result<(), ModelError> {
        commands::handle_response(uow, callback, outcome)
    }
}
