use serde::{Deserialize, Serialize};

use crate::actormodel::actor::UnitOfWork;
use crate::actormodel::failure::ModelError;
use crate::actormodel::message::{MessageEnvelope, ResponseOutcome};
use crate::case::behavior::CaseWork;
use crate::case::definition::{CaseDefinition, ItemBody};
use crate::case::events::{CaseEvent, CaseStarted, CaseTeamMember, TeamMemberPut, TeamMemberRemoved};
use crate::case::file::{file_transition_target, CaseFileItemTransitioned, CaseFileTransition};
use crate::case::planitem::Transition;
use crate::case::state::CaseState;
use crate::case::CaseModel;
use crate::value::{Value, ValuePath};

// ============================================================================
// Case Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CaseCommand {
    /// Bootstrap: creates the case from a definition, with an initial team
    /// and optional initial case file contents (top-level item name to
    /// value).
    StartCase {
        case_name: String,
        definition: CaseDefinition,
        #[serde(default)]
        team: Vec<CaseTeamMember>,
        #[serde(default)]
        file: Value,
    },
    MakePlanItemTransition {
        plan_item_id: String,
        transition: Transition,
    },
    /// Occur on a user-event or timer-event listener.
    RaiseEvent { plan_item_id: String },
    CreateFileItem { path: ValuePath, value: Value },
    UpdateFileItem { path: ValuePath, value: Value },
    ReplaceFileItem { path: ValuePath, value: Value },
    DeleteFileItem { path: ValuePath },
    AddFileChild {
        path: ValuePath,
        child: String,
        value: Value,
    },
    RemoveFileChild { path: ValuePath, child: String },
    PutTeamMember { member: CaseTeamMember },
    RemoveTeamMember { user_id: String },
    /// Query: renders current state, produces no events.
    GetCase,
}

impl CaseCommand {
    pub fn is_bootstrap(&self) -> bool {
        matches!(self, CaseCommand::StartCase { .. })
    }

    pub fn describe(&self) -> &'static str {
        match self {
            CaseCommand::StartCase { .. } => "StartCase",
            CaseCommand::MakePlanItemTransition { .. } => "MakePlanItemTransition",
            CaseCommand::RaiseEvent { .. } => "RaiseEvent",
            CaseCommand::CreateFileItem { .. } => "CreateFileItem",
            CaseCommand::UpdateFileItem { .. } => "UpdateFileItem",
            CaseCommand::ReplaceFileItem { .. } => "ReplaceFileItem",
            CaseCommand::DeleteFileItem { .. } => "DeleteFileItem",
            CaseCommand::AddFileChild { .. } => "AddFileChild",
            CaseCommand::RemoveFileChild { .. } => "RemoveFileChild",
            CaseCommand::PutTeamMember { .. } => "PutTeamMember",
            CaseCommand::RemoveTeamMember { .. } => "RemoveTeamMember",
            CaseCommand::GetCase => "GetCase",
        }
    }
}

/// Callbacks for asks a case sends out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CaseCallback {
    ProcessTaskConcluded { plan_item_id: String },
    TimerRequested { plan_item_id: String },
}

// ============================================================================
// Validation
// ============================================================================

pub fn validate(
    state: Option<&CaseState>,
    envelope: &MessageEnvelope,
    command: &CaseCommand,
) -> Result<(), ModelError> {
    if let CaseCommand::StartCase { definition, .. } = command {
        if state.is_some() {
            return Err(ModelError::invalid_command("Case already exists"));
        }
        return definition.validate();
    }

    // The runtime guarantees non-bootstrap commands only reach validation
    // when the actor exists.
    let state =
        state.ok_or_else(|| ModelError::engine_fault("validation without state"))?;

    let member = state
        .member(&envelope.user.id)
        .ok_or_else(|| ModelError::unauthorized(format!(
            "User '{}' is not in the case team",
            envelope.user.id
        )))?;

    match command {
        // Already handled by the early return.
        CaseCommand::StartCase { .. } => Ok(()),

        CaseCommand::MakePlanItemTransition {
            plan_item_id,
            transition,
        } => {
            if !transition.is_user_transition() {
                return Err(ModelError::invalid_command(format!(
                    "Transition {} cannot be requested directly",
                    transition
                )));
            }
            let item = state.item(plan_item_id).ok_or_else(|| {
                ModelError::invalid_command(format!("Unknown plan item '{}'", plan_item_id))
            })?;
            item.transition_target(*transition).map(|_| ())
        }

        CaseCommand::RaiseEvent { plan_item_id } => {
            let item = state.item(plan_item_id).ok_or_else(|| {
                ModelError::invalid_command(format!("Unknown plan item '{}'", plan_item_id))
            })?;
            let body = state
                .definition
                .find_item(&item.definition_id)
                .map(|d| d.body);
            if !matches!(body, Some(ItemBody::UserEvent) | Some(ItemBody::TimerEvent { .. })) {
                return Err(ModelError::invalid_command(format!(
                    "Plan item '{}' is not an event listener",
                    plan_item_id
                )));
            }
            item.transition_target(Transition::Occur).map(|_| ())
        }

        CaseCommand::CreateFileItem { path, .. } => {
            validate_file_op(state, path, CaseFileTransition::Create)
        }
        CaseCommand::UpdateFileItem { path, .. } => {
            validate_file_op(state, path, CaseFileTransition::Update)
        }
        CaseCommand::ReplaceFileItem { path, .. } => {
            validate_file_op(state, path, CaseFileTransition::Replace)
        }
        CaseCommand::DeleteFileItem { path } => {
            validate_file_op(state, path, CaseFileTransition::Delete)
        }
        CaseCommand::AddFileChild { path, child, .. } => {
            validate_file_op(state, path, CaseFileTransition::AddChild)?;
            if !state.definition.defines_file_path(&path.child(child)) {
                return Err(ModelError::invalid_command(format!(
                    "Case file does not define '{}/{}'",
                    path, child
                )));
            }
            Ok(())
        }
        CaseCommand::RemoveFileChild { path, child } => {
            validate_file_op(state, path, CaseFileTransition::RemoveChild)?;
            let child_path = path.child(child);
            if state.file.item(&child_path).is_none() {
                return Err(ModelError::invalid_command(format!(
                    "Case file item '{}' does not exist",
                    child_path
                )));
            }
            Ok(())
        }

        CaseCommand::PutTeamMember { member: put } => {
            require_owner(member)?;
            let demotes_owner = state
                .member(&put.user_id)
                .map(|existing| existing.owner && !put.owner)
                .unwrap_or(false);
            if demotes_owner && state.owner_count() == 1 {
                return Err(ModelError::invalid_command(
                    "Cannot remove the last case owner",
                ));
            }
            Ok(())
        }
        CaseCommand::RemoveTeamMember { user_id } => {
            require_owner(member)?;
            let target = state.member(user_id).ok_or_else(|| {
                ModelError::invalid_command(format!("User '{}' is not in the case team", user_id))
            })?;
            if target.owner && state.owner_count() == 1 {
                return Err(ModelError::invalid_command(
                    "Cannot remove the last case owner",
                ));
            }
            Ok(())
        }

        CaseCommand::GetCase => Ok(()),
    }
}

fn require_owner(member: &CaseTeamMember) -> Result<(), ModelError> {
    if member.owner {
        Ok(())
    } else {
        Err(ModelError::unauthorized(
            "Only case owners may manage the case team",
        ))
    }
}

fn validate_file_op(
    state: &CaseState,
    path: &ValuePath,
    transition: CaseFileTransition,
) -> Result<(), ModelError> {
    if !state.definition.defines_file_path(path) {
        return Err(ModelError::invalid_command(format!(
            "Case file does not define '{}'",
            path
        )));
    }
    file_transition_target(path, state.file.state_of(path), transition).map(|_| ())
}

// ============================================================================
// Processing
// ============================================================================

pub fn process(uow: &mut UnitOfWork<CaseModel>, command: CaseCommand) -> Result<(), ModelError> {
    let mut work = CaseWork::new(uow);

    match command {
        CaseCommand::StartCase {
            case_name,
            definition,
            mut team,
            file,
        } => {
            let starter = work.uow().user.id.clone();
            if !team.iter().any(|m| m.user_id == starter) {
                team.push(CaseTeamMember::owner(starter.clone()));
            }
            if !team.iter().any(|m| m.owner) {
                if let Some(first) = team.iter_mut().find(|m| m.user_id == starter) {
                    first.owner = true;
                }
            }

            let root = definition.root_item();
            work.start_case(CaseStarted {
                case_name,
                definition,
                team,
                created_by: starter,
            });
            work.create_item(&root, None)?;

            if let Value::Map(entries) = file {
                for (name, value) in entries {
                    let path = ValuePath::parse(&name).map_err(|e| {
                        ModelError::invalid_command(format!("Bad case file path '{}': {}", name, e))
                    })?;
                    deliver_file_op(&mut work, path, CaseFileTransition::Create, value, None)?;
                }
            }
        }

        CaseCommand::MakePlanItemTransition {
            plan_item_id,
            transition,
        } => work.transition(&plan_item_id, transition)?,

        CaseCommand::RaiseEvent { plan_item_id } => {
            work.transition(&plan_item_id, Transition::Occur)?
        }

        CaseCommand::CreateFileItem { path, value } => {
            deliver_file_op(&mut work, path, CaseFileTransition::Create, value, None)?
        }
        CaseCommand::UpdateFileItem { path, value } => {
            deliver_file_op(&mut work, path, CaseFileTransition::Update, value, None)?
        }
        CaseCommand::ReplaceFileItem { path, value } => {
            deliver_file_op(&mut work, path, CaseFileTransition::Replace, value, None)?
        }
        CaseCommand::DeleteFileItem { path } => {
            deliver_file_op(&mut work, path, CaseFileTransition::Delete, Value::Null, None)?
        }
        CaseCommand::AddFileChild { path, child, value } => {
            deliver_file_op(&mut work, path, CaseFileTransition::AddChild, value, Some(child))?
        }
        CaseCommand::RemoveFileChild { path, child } => deliver_file_op(
            &mut work,
            path,
            CaseFileTransition::RemoveChild,
            Value::Null,
            Some(child),
        )?,

        CaseCommand::PutTeamMember { member } => {
            work.deliver(CaseEvent::TeamMemberPut(TeamMemberPut { member }))?
        }
        CaseCommand::RemoveTeamMember { user_id } => {
            work.deliver(CaseEvent::TeamMemberRemoved(TeamMemberRemoved { user_id }))?
        }

        CaseCommand::GetCase => {}
    }

    let rendered = work.state()?.render();
    work.uow().set_response(rendered);
    Ok(())
}

fn deliver_file_op(
    work: &mut CaseWork<'_>,
    path: ValuePath,
    transition: CaseFileTransition,
    value: Value,
    child: Option<String>,
) -> Result<(), ModelError> {
    // Recheck against the working state: initial file entries and cascades
    // may have changed it since validation.
    {
        let state = work.state()?;
        if !state.definition.defines_file_path(&path) {
            return Err(ModelError::invalid_command(format!(
                "Case file does not define '{}'",
                path
            )));
        }
        file_transition_target(&path, state.file.state_of(&path), transition)?;
    }
    work.deliver(CaseEvent::CaseFileItemTransitioned(CaseFileItemTransitioned {
        path,
        transition,
        value,
        child,
    }))
}

// ============================================================================
// Ask responses
// ============================================================================

pub fn handle_response(
    uow: &mut UnitOfWork<CaseModel>,
    callback: CaseCallback,
    outcome: ResponseOutcome,
) -> Result<(), ModelError> {
    let mut work = CaseWork::new(uow);

    match callback {
        CaseCallback::ProcessTaskConcluded { plan_item_id } => match outcome {
            ResponseOutcome::Success(_output) => {
                tracing::debug!(plan_item_id = %plan_item_id, "Process task completed");
                work.try_transition(&plan_item_id, Transition::Complete)
            }
            ResponseOutcome::Failure(failure) => {
                tracing::warn!(
                    plan_item_id = %plan_item_id,
                    error = %failure.description,
                    "Process task failed; faulting the plan item"
                );
                work.uow().debug(format!(
                    "process task '{}' failed: {}",
                    plan_item_id, failure.description
                ));
                work.try_transition(&plan_item_id, Transition::Fault)
            }
        },
        CaseCallback::TimerRequested { plan_item_id } => match outcome {
            ResponseOutcome::Success(_) => Ok(()),
            ResponseOutcome::Failure(failure) => {
                tracing::warn!(
                    plan_item_id = %plan_item_id,
                    error = %failure.description,
                    "Timer could not be set; exiting the event listener"
                );
                work.try_transition(&plan_item_id, Transition::Exit)
            }
        },
    }
}
