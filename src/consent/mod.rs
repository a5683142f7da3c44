use serde::{Deserialize, Serialize};

use crate::actormodel::actor::{ModelDefinition, UnitOfWork};
use crate::actormodel::failure::ModelError;
use crate::actormodel::message::{ActorKind, MessageEnvelope, ResponseOutcome};
use crate::identity::Member;
use crate::value::Value;

// ============================================================================
// Consent Group Actor
// ============================================================================
//
// A group of users that can be granted access to cases as one unit. Same
// ownership rule as tenants: the last owner stays.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ConsentGroupCommand {
    CreateConsentGroup { name: String, members: Vec<Member> },
    SetMember { member: Member },
    RemoveMember { user_id: String },
    GetConsentGroup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ConsentGroupEvent {
    ConsentGroupCreated { name: String, members: Vec<Member> },
    MemberPut { member: Member },
    MemberRemoved { user_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConsentGroupCallback {}

#[derive(Debug, Clone)]
pub struct ConsentGroupState {
    pub name: String,
    pub members: Vec<Member>,
}

impl ConsentGroupState {
    fn member(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    fn owner_count(&self) -> usize {
        self.members.iter().filter(|m| m.owner).count()
    }
}

pub struct ConsentGroupModel;

impl ModelDefinition for ConsentGroupModel {
    const KIND: ActorKind = ActorKind::ConsentGroup;

    type State = ConsentGroupState;
    type Command = ConsentGroupCommand;
    type Event = ConsentGroupEvent;
    type Callback = ConsentGroupCallback;
    type Services = ();

    fn is_bootstrap(command: &Self::Command) -> bool {
        matches!(command, ConsentGroupCommand::CreateConsentGroup { .. })
    }

    fn describe(command: &Self::Command) -> &'static str {
        match command {
            ConsentGroupCommand::CreateConsentGroup { .. } => "CreateConsentGroup",
            ConsentGroupCommand::SetMember { .. } => "SetMember",
            ConsentGroupCommand::RemoveMember { .. } => "RemoveMember",
            ConsentGroupCommand::GetConsentGroup => "GetConsentGroup",
        }
    }

    fn validate(
        state: Option<&Self::State>,
        envelope: &MessageEnvelope,
        command: &Self::Command,
    ) -> Result<(), ModelError> {
        match command {
            ConsentGroupCommand::CreateConsentGroup { name, members } => {
                if state.is_some() {
                    return Err(ModelError::invalid_command("Consent group already exists"));
                }
                if name.trim().is_empty() {
                    return Err(ModelError::invalid_command(
                        "Consent group name must not be empty",
                    ));
                }
                if !members.iter().any(|m| m.owner) {
                    return Err(ModelError::invalid_command(
                        "A consent group needs at least one owner",
                    ));
                }
                Ok(())
            }
            ConsentGroupCommand::SetMember { member } => {
                let state = require_owner(state, envelope)?;
                let demotes_owner = state
                    .member(&member.user_id)
                    .map(|existing| existing.owner && !member.owner)
                    .unwrap_or(false);
                if demotes_owner && state.owner_count() == 1 {
                    return Err(ModelError::invalid_command(
                        "Cannot remove the last consent group owner",
                    ));
                }
                Ok(())
            }
            ConsentGroupCommand::RemoveMember { user_id } => {
                let state = require_owner(state, envelope)?;
                let target = state.member(user_id).ok_or_else(|| {
                    ModelError::invalid_command(format!(
                        "User '{}' is not in the consent group",
                        user_id
                    ))
                })?;
                if target.owner && state.owner_count() == 1 {
                    return Err(ModelError::invalid_command(
                        "Cannot remove the last consent group owner",
                    ));
                }
                Ok(())
            }
            ConsentGroupCommand::GetConsentGroup => {
                let state =
                    state.ok_or_else(|| ModelError::engine_fault("validation without state"))?;
                state.member(&envelope.user.id).map(|_| ()).ok_or_else(|| {
                    ModelError::unauthorized(format!(
                        "User '{}' is not in the consent group",
                        envelope.user.id
                    ))
                })
            }
        }
    }

    fn process(uow: &mut UnitOfWork<Self>, command: Self::Command) -> Result<(), ModelError> {
        match command {
            ConsentGroupCommand::CreateConsentGroup { name, members } => {
                uow.emit(ConsentGroupEvent::ConsentGroupCreated { name, members })?;
            }
            ConsentGroupCommand::SetMember { member } => {
                uow.emit(ConsentGroupEvent::MemberPut { member })?;
            }
            ConsentGroupCommand::RemoveMember { user_id } => {
                uow.emit(ConsentGroupEvent::MemberRemoved { user_id })?;
            }
            ConsentGroupCommand::GetConsentGroup => {}
        }

        let state = uow
            .state()
            .ok_or_else(|| ModelError::engine_fault("consent group state missing"))?;
        let mut rendered = Value::empty_map();
        rendered.set_field("name", Value::from(state.name.clone()));
        rendered.set_field("members", Value::Long(state.members.len() as i64));
        uow.set_response(rendered);
        Ok(())
    }

    fn update_state(state: &mut Option<Self::State>, event: &Self::Event) -> Result<(), ModelError> {
        match event {
            ConsentGroupEvent::ConsentGroupCreated { name, members } => {
                *state = Some(ConsentGroupState {
                    name: name.clone(),
                    members: members.clone(),
                });
                Ok(())
            }
            ConsentGroupEvent::MemberPut { member } => {
                let state = state
                    .as_mut()
                    .ok_or_else(|| ModelError::engine_fault("consent event before creation"))?;
                match state.members.iter_mut().find(|m| m.user_id == member.user_id) {
                    Some(existing) => *existing = member.clone(),
                    None => state.members.push(member.clone()),
                }
                Ok(())
            }
            ConsentGroupEvent::MemberRemoved { user_id } => {
                let state = state
                    .as_mut()
                    .ok_or_else(|| ModelError::engine_fault("consent event before creation"))?;
                state.members.retain(|m| &m.user_id != user_id);
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

fn require_owner<'a>(
    state: Option<&'a ConsentGroupState>,
    envelope: &MessageEnvelope,
) -> Result<&'a ConsentGroupState, ModelError> {
    let state = state.ok_or_else(|| ModelError::engine_fault("validation without state"))?;
    match state.member(&envelope.user.id) {
        Some(member) if member.owner => Ok(state),
        Some(_) => Err(ModelError::unauthorized(
            "Only consent group owners may manage members",
        )),
        None => Err(ModelError::unauthorized(format!(
            "User '{}' is not in the consent group",
            envelope.user.id
        ))),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
