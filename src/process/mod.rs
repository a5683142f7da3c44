use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::actormodel::actor::{ModelDefinition, UnitOfWork};
use crate::actormodel::failure::ModelError;
use crate::actormodel::message::{ActorKind, MessageEnvelope, ResponseOutcome};
use crate::value::Value;

// ============================================================================
// Process Task Actor
// ============================================================================
//
// A sub-process run on behalf of a case. The case asks this actor to start;
// the actual implementation (HTTP call, mail, calculation) is an injected
// executor, and the executor's outcome travels back to the asking case as
// the response of the StartProcess command.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProcessCommand {
    /// Bootstrap: create the task, run it, record the outcome.
    StartProcess { name: String, input: Value },
    /// Query: current phase and output.
    GetProcess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProcessEvent {
    ProcessStarted { name: String, input: Value },
    ProcessCompleted { output: Value },
    ProcessFaulted { reason: String },
}

/// Process tasks ask nobody, so there is nothing to call back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessCallback {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessPhase {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ProcessTaskState {
    pub name: String,
    pub input: Value,
    pub phase: ProcessPhase,
    pub output: Value,
    pub fault: Option<String>,
}

// ============================================================================
// Executor (injected collaborator)
// ============================================================================

pub trait ProcessExecutor: Send + Sync {
    fn execute(&self, name: &str, input: &Value) -> Result<Value, String>;
}

/// Default executor: the output is the input. Enough for wiring tests and
/// for cases whose tasks only shuttle data.
pub struct EchoProcessExecutor;

impl ProcessExecutor for EchoProcessExecutor {
    fn execute(&self, _name: &str, input: &Value) -> Result<Value, String> {
        Ok(input.clone())
    }
}

/// Always fails; drives the failure arm of the ask protocol in tests.
pub struct FailingProcessExecutor {
    pub reason: String,
}

impl ProcessExecutor for FailingProcessExecutor {
    fn execute(&self, _name: &str, _input: &Value) -> Result<Value, String> {
        Err(self.reason.clone())
    }
}

#[derive(Clone)]
pub struct ProcessServices {
    pub executor: Arc<dyn ProcessExecutor>,
}

// ============================================================================
// Model definition
// ============================================================================

pub struct ProcessTaskModel;

impl ModelDefinition for ProcessTaskModel {
    const KIND: ActorKind = ActorKind::ProcessTask;

    type State = ProcessTaskState;
    type Command = ProcessCommand;
    type Event = ProcessEvent;
    type Callback = ProcessCallback;
    type Services = ProcessServices;

    fn is_bootstrap(command: &Self::Command) -> bool {
        matches!(command, ProcessCommand::StartProcess { .. })
    }

    fn describe(command: &Self::Command) -> &'static str {
        match command {
            ProcessCommand::StartProcess { .. } => "StartProcess",
            ProcessCommand::GetProcess => "GetProcess",
        }
    }

    fn validate(
        state: Option<&Self::State>,
        _envelope: &MessageEnvelope,
        command: &Self::Command,
    ) -> Result<(), ModelError> {
        match command {
            ProcessCommand::StartProcess { name, .. } => {
                if state.is_some() {
                    return Err(ModelError::invalid_command("Process task already started"));
                }
                if name.trim().is_empty() {
                    return Err(ModelError::invalid_command("Process name must not be empty"));
                }
                Ok(())
            }
            ProcessCommand::GetProcess => Ok(()),
        }
    }

    fn process(uow: &mut UnitOfWork<Self>, command: Self::Command) -> Result<(), ModelError> {
        match command {
            ProcessCommand::StartProcess { name, input } => {
                uow.emit(ProcessEvent::ProcessStarted {
                    name: name.clone(),
                    input: input.clone(),
                })?;

                let executor = uow.services().executor.clone();
                match executor.execute(&name, &input) {
                    Ok(output) => {
                        uow.emit(ProcessEvent::ProcessCompleted {
                            output: output.clone(),
                        })?;
                        uow.set_response(output);
                    }
                    Err(reason) => {
                        tracing::warn!(
                            process = %name,
                            reason = %reason,
                            "Process execution failed"
                        );
                        // The fault is a recorded fact; the response still
                        // reports failure so the asking case faults its
                        // plan item.
                        uow.emit(ProcessEvent::ProcessFaulted {
                            reason: reason.clone(),
                        })?;
                        uow.fail_response(ModelError::invalid_command(format!(
                            "Process '{}' failed: {}",
                            name, reason
                        )));
                    }
                }
                Ok(())
            }
            ProcessCommand::GetProcess => {
                let state = uow
                    .state()
                    .ok_or_else(|| ModelError::engine_fault("query without state"))?;
                let mut rendered = Value::empty_map();
                rendered.set_field("name", Value::from(state.name.clone()));
                rendered.set_field("phase", Value::from(format!("{:?}", state.phase)));
                rendered.set_field("output", state.output.clone());
                if let Some(fault) = &state.fault {
                    rendered.set_field("fault", Value::from(fault.clone()));
                }
                uow.set_response(rendered);
                Ok(())
            }
        }
    }

    fn update_state(state: &mut Option<Self::State>, event: &Self::Event) -> Result<(), ModelError> {
        match event {
            ProcessEvent::ProcessStarted { name, input } => {
                *state = Some(ProcessTaskState {
                    name: name.clone(),
                    input: input.clone(),
                    phase: ProcessPhase::Active,
                    output: Value::Null,
                    fault: None,
                });
                Ok(())
            }
            ProcessEvent::ProcessCompleted { output } => {
                let state = state
                    .as_mut()
                    .ok_or_else(|| ModelError::engine_fault("process event before start"))?;
                state.phase = ProcessPhase::Completed;
                state.output = output.clone();
                Ok(())
            }
            ProcessEvent::ProcessFaulted { reason } => {
                let state = state
                    .as_mut()
                    .ok_or_else(|| ModelError::engine_fault("process event before start"))?;
                state.phase = ProcessPhase::Failed;
                state.fault = Some(reason.clone());
                Ok(())
            }
        }
    }

    fn handle_response(
        _uow: &mut UnitOfWork<Self>,
        callback: Self::Callback,
        _outcome: ResponseOutcome,
    ) -> Result<(), ModelError> {
        match callback {}
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_executor() {
        let executor = EchoProcessExecutor;
        let input = Value::from("payload");
        assert_eq!(executor.execute("calc", &input).unwrap(), input);
    }

    #[test]
    fn test_update_state_lifecycle() {
        let mut state = None;
        ProcessTaskModel::update_state(
            &mut state,
            &ProcessEvent::ProcessStarted {
                name: "calc".to_string(),
                input: Value::Long(7),
            },
        )
        .unwrap();
        assert_eq!(state.as_ref().unwrap().phase, ProcessPhase::Active);

        ProcessTaskModel::update_state(
            &mut state,
            &ProcessEvent::ProcessCompleted {
                output: Value::Long(7),
            },
        )
        .unwrap();
        let state = state.unwrap();
        assert_eq!(state.phase, ProcessPhase::Completed);
        assert_eq!(state.output, Value::Long(7));
    }

    #[test]
    fn test_event_before_start_is_a_fault() {
        let mut state = None;
        let result = ProcessTaskModel::update_state(
            &mut state,
            &ProcessEvent::ProcessCompleted { output: Value::Null },
        );
        assert!(matches!(result, Err(ModelError::EngineFault(_))));
    }
}
