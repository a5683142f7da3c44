use serde::{Deserialize, Serialize};
use std::fmt;

use crate::actormodel::failure::ModelError;
use crate::case::sentry::CriterionInstance;

// ============================================================================
// Plan-Item State Machine
// ============================================================================
//
// Three machines share one state and one transition vocabulary:
//
//   - task/stage:       Null -> Available -> Active -> {Completed,
//                       Terminated, Failed, Suspended}; Suspended -> Active;
//                       Failed -> Active (Reactivate); discretionary items
//                       are created Disabled and need ManualStart
//   - occur items:      milestones, user events and timer events wait in
//                       Available until they Occur
//   - case plan root:   the stage machine, plus the Closed archive state
//
// Transition targets are computed at generation time and recorded in the
// transition event; applying an event never consults these tables again.
// An illegal transition is rejected, never silently ignored.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Null,
    Available,
    Active,
    Completed,
    Terminated,
    Failed,
    Suspended,
    Disabled,
    Closed,
}

impl State {
    /// Out of the running: the item will take no further part in the plan
    /// unless explicitly reactivated (Failed) or reopened.
    pub fn is_semi_terminal(&self) -> bool {
        matches!(
            self,
            State::Completed | State::Terminated | State::Failed | State::Closed
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Create,
    Start,
    ManualStart,
    Complete,
    Fault,
    Suspend,
    Resume,
    Terminate,
    Exit,
    ParentTerminate,
    ParentResume,
    Reactivate,
    Occur,
}

impl Transition {
    /// Transitions a user may request directly; lifecycle and propagation
    /// transitions belong to the engine.
    pub fn is_user_transition(&self) -> bool {
        !matches!(
            self,
            Transition::Create | Transition::ParentTerminate | Transition::ParentResume
        )
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateMachine {
    TaskStage,
    Occur,
    CasePlan,
}

impl StateMachine {
    fn task_stage_target(
        current: State,
        history: State,
        discretionary: bool,
        transition: Transition,
    ) -> Option<State> {
        use State::*;
        use Transition::*;
        match (transition, current) {
            (Create, Null) => Some(if discretionary { Disabled } else { Available }),
            (Start, Available) => Some(Active),
            (ManualStart, Disabled) | (ManualStart, Available) => Some(Active),
            (Suspend, Active) | (Suspend, Available) => Some(Suspended),
            (Resume, Suspended) => Some(Active),
            (ParentResume, Suspended) => Some(match history {
                Null => Available,
                other => other,
            }),
            (Complete, Active) => Some(Completed),
            (Fault, Active) => Some(Failed),
            (Reactivate, Failed) => Some(Active),
            (Terminate, Active) => Some(Terminated),
            (Exit, Available) | (Exit, Active) | (Exit, Suspended) | (Exit, Disabled)
            | (Exit, Failed) => Some(Terminated),
            (ParentTerminate, Available)
            | (ParentTerminate, Suspended)
            | (ParentTerminate, Disabled)
            | (ParentTerminate, Failed) => Some(Terminated),
            _ => None,
        }
    }

    fn occur_target(current: State, transition: Transition) -> Option<State> {
        use State::*;
        use Transition::*;
        match (transition, current) {
            (Create, Null) => Some(Available),
            (Occur, Available) => Some(Completed),
            (Suspend, Available) => Some(Suspended),
            (Resume, Suspended) | (ParentResume, Suspended) => Some(Available),
            (Terminate, Available)
            | (Terminate, Suspended)
            | (Exit, Available)
            | (Exit, Suspended)
            | (ParentTerminate, Available)
            | (ParentTerminate, Suspended) => Some(Terminated),
            _ => None,
        }
    }

    fn case_plan_target(
        current: State,
        history: State,
        transition: Transition,
    ) -> Option<State> {
        use State::*;
        use Transition::*;
        match (transition, current) {
            // The archive path is exclusive to the case plan root.
            (Exit, Completed) | (Exit, Terminated) | (Exit, Failed) => Some(Closed),
            _ => Self::task_stage_target(current, history, false, transition),
        }
    }

    pub fn target(
        &self,
        item_name: &str,
        current: State,
        history: State,
        discretionary: bool,
        transition: Transition,
    ) -> Result<State, ModelError> {
        let target = match self {
            StateMachine::TaskStage => {
                Self::task_stage_target(current, history, discretionary, transition)
            }
            StateMachine::Occur => Self::occur_target(current, transition),
            StateMachine::CasePlan => Self::case_plan_target(current, history, transition),
        };
        target.ok_or(ModelError::TransitionDenied {
            item: item_name.to_string(),
            transition: transition.to_string(),
            state: current.to_string(),
        })
    }
}

// ============================================================================
// Plan Items
// ============================================================================

/// A live node of the case plan. Created by PlanItemCreated, mutated only by
/// PlanItemTransitioned, never deleted.
#[derive(Debug, Clone)]
pub struct PlanItem {
    /// Instance id: `<definition id>.<index>`.
    pub id: String,
    pub definition_id: String,
    pub name: String,
    pub index: u32,
    /// Containing stage's plan item id; None for the case plan root.
    pub stage_id: Option<String>,
    pub machine: StateMachine,
    pub discretionary: bool,
    pub state: State,
    /// The state before the most recent transition.
    pub history_state: State,
    pub entry_criteria: Vec<CriterionInstance>,
    pub exit_criteria: Vec<CriterionInstance>,
}

impl PlanItem {
    /// Target state for `transition` from the current state, or a denial.
    pub fn transition_target(&self, transition: Transition) -> Result<State, ModelError> {
        self.machine.target(
            &self.name,
            self.state,
            self.history_state,
            self.discretionary,
            transition,
        )
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
