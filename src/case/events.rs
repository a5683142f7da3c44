use serde::{Deserialize, Serialize};

use crate::case::definition::CaseDefinition;
use crate::case::file::CaseFileItemTransitioned;
use crate::case::planitem::{State, Transition};

// ============================================================================
// Case Events
// ============================================================================
//
// The closed set of facts a case can persist. Everything the case is - plan
// items, case file, team - is a fold over these.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CaseEvent {
    CaseStarted(CaseStarted),
    PlanItemCreated(PlanItemCreated),
    PlanItemTransitioned(PlanItemTransitioned),
    CaseFileItemTransitioned(CaseFileItemTransitioned),
    TeamMemberPut(TeamMemberPut),
    TeamMemberRemoved(TeamMemberRemoved),
}

/// Bootstrap event: the case exists from here on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStarted {
    pub case_name: String,
    pub definition: CaseDefinition,
    pub team: Vec<CaseTeamMember>,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItemCreated {
    pub plan_item_id: String,
    pub definition_id: String,
    pub name: String,
    /// Containing stage's plan item id; None for the case plan root.
    pub stage_id: Option<String>,
    pub index: u32,
    pub discretionary: bool,
}

/// Every state change of a plan item after creation. Carries the computed
/// target so that applying it needs no transition table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItemTransitioned {
    pub plan_item_id: String,
    pub transition: Transition,
    pub previous_state: State,
    pub new_state: State,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMemberPut {
    pub member: CaseTeamMember,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMemberRemoved {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseTeamMember {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub owner: bool,
}

impl CaseTeamMember {
    pub fn owner(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
            owner: true,
        }
    }

    pub fn member(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
            owner: false,
        }
    }
}
