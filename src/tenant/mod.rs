use serde::{Deserialize, Serialize};

use crate::actormodel::actor::{ModelDefinition, UnitOfWork};
use crate::actormodel::failure::ModelError;
use crate::actormodel::message::{ActorKind, MessageEnvelope, ResponseOutcome};
use crate::identity::Member;
use crate::value::Value;

// ============================================================================
// Tenant Actor
// ============================================================================
//
// Tenants own users. The one rule that matters: a tenant can never lose its
// last owner - not by removal, not by demotion.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TenantCommand {
    /// Bootstrap: creates the tenant with its initial users.
    CreateTenant { name: String, users: Vec<Member> },
    /// Add a user or overwrite an existing user's roles/ownership.
    SetUser { user: Member },
    RemoveUser { user_id: String },
    GetTenant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TenantEvent {
    TenantCreated { name: String, users: Vec<Member> },
    TenantUserPut { user: Member },
    TenantUserRemoved { user_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TenantCallback {}

#[derive(Debug, Clone)]
pub struct TenantState {
    pub name: String,
    pub users: Vec<Member>,
}

impl TenantState {
    pub fn user(&self, user_id: &str) -> Option<&Member> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    pub fn owner_count(&self) -> usize {
        self.users.iter().filter(|u| u.owner).count()
    }
}

// ============================================================================
// Model definition
// ============================================================================

pub struct TenantModel;

impl ModelDefinition for TenantModel {
    const KIND: ActorKind = ActorKind::Tenant;

    type State = TenantState;
    type Command = TenantCommand;
    type Event = TenantEvent;
    type Callback = TenantCallback;
    type Services = ();

    fn is_bootstrap(command: &Self::Command) -> bool {
        matches!(command, TenantCommand::CreateTenant { .. })
    }

    fn describe(command: &Self::Command) -> &'static str {
        match command {
            TenantCommand::CreateTenant { .. } => "CreateTenant",
            TenantCommand::SetUser { .. } => "SetUser",
            TenantCommand::RemoveUser { .. } => "RemoveUser",
            TenantCommand::GetTenant => "GetTenant",
        }
    }

    fn validate(
        state: Option<&Self::State>,
        envelope: &MessageEnvelope,
        command: &Self::Command,
    ) -> Result<(), ModelError> {
        match command {
            TenantCommand::CreateTenant { name, users } => {
                if state.is_some() {
                    return Err(ModelError::invalid_command("Tenant already exists"));
                }
                if name.trim().is_empty() {
                    return Err(ModelError::invalid_command("Tenant name must not be empty"));
                }
                if !users.iter().any(|u| u.owner) {
                    return Err(ModelError::invalid_command(
                        "A tenant needs at least one owner",
                    ));
                }
                let mut seen = std::collections::HashSet::new();
                for user in users {
                    if !seen.insert(&user.user_id) {
                        return Err(ModelError::invalid_command(format!(
                            "Duplicate tenant user '{}'",
                            user.user_id
                        )));
                    }
                }
                Ok(())
            }

            TenantCommand::SetUser { user } => {
                let state = require_owner(state, envelope)?;
                let demotes_owner = state
                    .user(&user.user_id)
                    .map(|existing| existing.owner && !user.owner)
                    .unwrap_or(false);
                if demotes_owner && state.owner_count() == 1 {
                    return Err(ModelError::invalid_command(
                        "Cannot remove the last tenant owner",
                    ));
                }
                Ok(())
            }

            TenantCommand::RemoveUser { user_id } => {
                let state = require_owner(state, envelope)?;
                let target = state.user(user_id).ok_or_else(|| {
                    ModelError::invalid_command(format!("User '{}' is not in the tenant", user_id))
                })?;
                if target.owner && state.owner_count() == 1 {
                    return Err(ModelError::invalid_command(
                        "Cannot remove the last tenant owner",
                    ));
                }
                Ok(())
            }

            TenantCommand::GetTenant => {
                let state =
                    state.ok_or_else(|| ModelError::engine_fault("validation without state"))?;
                state.user(&envelope.user.id).map(|_| ()).ok_or_else(|| {
                    ModelError::unauthorized(format!(
                        "User '{}' is not in the tenant",
                        envelope.user.id
                    ))
                })
            }
        }
    }

    fn process(uow: &mut UnitOfWork<Self>, command: Self::Command) -> Result<(), ModelError> {
        match command {
            TenantCommand::CreateTenant { name, users } => {
                uow.emit(TenantEvent::TenantCreated { name, users })?;
            }
            TenantCommand::SetUser { user } => {
                uow.emit(TenantEvent::TenantUserPut { user })?;
            }
            TenantCommand::RemoveUser { user_id } => {
                uow.emit(TenantEvent::TenantUserRemoved { user_id })?;
            }
            TenantCommand::GetTenant => {}
        }

        let state = uow
            .state()
            .ok_or_else(|| ModelError::engine_fault("tenant state missing"))?;
        let mut rendered = Value::empty_map();
        rendered.set_field("name", Value::from(state.name.clone()));
        let users: Vec<Value> = state
            .users
            .iter()
            .map(|u| {
                let mut entry = Value::empty_map();
                entry.set_field("userId", Value::from(u.user_id.clone()));
                entry.set_field("owner", Value::Bool(u.owner));
                entry
            })
            .collect();
        rendered.set_field("users", Value::List(users));
        uow.set_response(rendered);
        Ok(())
    }

    fn update_state(state: &mut Option<Self::State>, event: &Self::Event) -> Result<(), ModelError> {
        match event {
            TenantEvent::TenantCreated { name, users } => {
                *state = Some(TenantState {
                    name: name.clone(),
                    users: users.clone(),
                });
                Ok(())
            }
            TenantEvent::TenantUserPut { user } => {
                let state = state
                    .as_mut()
                    .ok_or_else(|| ModelError::engine_fault("tenant event before creation"))?;
                match state.users.iter_mut().find(|u| u.user_id == user.user_id) {
                    Some(existing) => *existing = user.clone(),
                    None => state.users.push(user.clone()),
                }
                Ok(())
            }
            TenantEvent::TenantUserRemoved { user_id } => {
                let state = state
                    .as_mut()
                    .ok_or_else(|| ModelError::engine_fault("tenant event before creation"))?;
                state.users.retain(|u| &u.user_id != user_id);
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
    state: Option<&'a TenantState>,
    envelope: &MessageEnvelope,
) -> Result<&'a TenantState, ModelError> {
    let state = state.ok_or_else(|| ModelError::engine_fault("validation without state"))?;
    match state.user(&envelope.user.id) {
        Some(user) if user.owner => Ok(state),
        Some(_) => Err(ModelError::unauthorized(
            "Only tenant owners may manage users",
        )),
        None => Err(ModelError::unauthorized(format!(
            "User '{}' is not in the tenant",
            envelope.user.id
        ))),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
