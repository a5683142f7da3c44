use crate::actormodel::failure::ModelError;
use crate::case::definition::CaseDefinition;
use crate::case::events::{CaseEvent, CaseStarted, CaseTeamMember, PlanItemCreated, PlanItemTransitioned};
use crate::case::file::{CaseFile, CaseFileEventBuffer, CaseFileItemTransitioned};
use crate::case::planitem::{PlanItem, State, StateMachine, Transition};
use crate::case::sentry::{CriterionInstance, CriterionKind};
use crate::value::Value;

// ============================================================================
// Case State
// ============================================================================
//
// Everything a case is, derived from its events. `apply` is the single pure
// state-application path, used identically by live processing (against the
// working copy), post-persist apply (against committed state) and recovery
// replay - which is what makes recovered state bit-identical to live state.
//
// `apply` reports reactions (lifecycle begins, criteria that just became
// satisfied, state changes) so the live behavior engine can decide what
// happens next; replay applies the same mutations and discards the
// reactions, because the consequences are already in the stream.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct CaseState {
    pub case_name: String,
    pub definition: CaseDefinition,
    pub team: Vec<CaseTeamMember>,
    pub plan_items: Vec<PlanItem>,
    pub file: CaseFile,
    pub change_buffer: CaseFileEventBuffer,
}

/// What just happened during one event application, for the behavior engine.
#[derive(Debug, Clone)]
pub enum Reaction {
    /// A plan item was created and must begin its lifecycle immediately,
    /// within the same application pass.
    BeginLifecycle { plan_item_id: String },
    StateChanged {
        plan_item_id: String,
        transition: Transition,
        new_state: State,
    },
    /// A criterion's on-parts all fired; the if-part has not been looked at.
    CriterionSatisfied {
        plan_item_id: String,
        kind: CriterionKind,
        if_part: Option<String>,
    },
}

impl CaseState {
    pub fn from_started(event: &CaseStarted) -> Self {
        Self {
            case_name: event.case_name.clone(),
            definition: event.definition.clone(),
            team: event.team.clone(),
            plan_items: Vec::new(),
            file: CaseFile::default(),
            change_buffer: CaseFileEventBuffer::default(),
        }
    }

    pub fn item(&self, plan_item_id: &str) -> Option<&PlanItem> {
        self.plan_items.iter().find(|i| i.id == plan_item_id)
    }

    fn item_mut(&mut self, plan_item_id: &str) -> Option<&mut PlanItem> {
        self.plan_items.iter_mut().find(|i| i.id == plan_item_id)
    }

    /// The case plan root.
    pub fn root(&self) -> Option<&PlanItem> {
        self.plan_items.iter().find(|i| i.stage_id.is_none())
    }

    pub fn children_of<'a>(&'a self, stage_item_id: &'a str) -> impl Iterator<Item = &'a PlanItem> {
        self.plan_items
            .iter()
            .filter(move |i| i.stage_id.as_deref() == Some(stage_item_id))
    }

    pub fn member(&self, user_id: &str) -> Option<&CaseTeamMember> {
        self.team.iter().find(|m| m.user_id == user_id)
    }

    pub fn owner_count(&self) -> usize {
        self.team.iter().filter(|m| m.owner).count()
    }

    /// Number of plan items instantiated from `definition_id`; the next
    /// instance gets this as its index.
    pub fn next_index(&self, definition_id: &str) -> u32 {
        self.plan_items
            .iter()
            .filter(|i| i.definition_id == definition_id)
            .count() as u32
    }

    // ------------------------------------------------------------------
    // Application
    // ------------------------------------------------------------------

    pub fn apply(&mut self, event: &CaseEvent) -> Result<Vec<Reaction>, ModelError> {
        match event {
            CaseEvent::CaseStarted(_) => Err(ModelError::engine_fault(
                "CaseStarted applied to an existing case",
            )),
            CaseEvent::PlanItemCreated(created) => self.apply_created(created),
            CaseEvent::PlanItemTransitioned(transitioned) => self.apply_transitioned(transitioned),
            CaseEvent::CaseFileItemTransitioned(change) => self.apply_file_change(change),
            CaseEvent::TeamMemberPut(put) => {
                match self.team.iter_mut().find(|m| m.user_id == put.member.user_id) {
                    Some(existing) => *existing = put.member.clone(),
                    None => self.team.push(put.member.clone()),
                }
                Ok(Vec::new())
            }
            CaseEvent::TeamMemberRemoved(removed) => {
                self.team.retain(|m| m.user_id != removed.user_id);
                Ok(Vec::new())
            }
        }
    }

    fn apply_created(&mut self, created: &PlanItemCreated) -> Result<Vec<Reaction>, ModelError> {
        let definition = self
            .definition
            .find_item(&created.definition_id)
            .ok_or_else(|| {
                ModelError::engine_fault(format!(
                    "plan item '{}' references unknown definition '{}'",
                    created.plan_item_id, created.definition_id
                ))
            })?;

        let machine = if created.stage_id.is_none() {
            StateMachine::CasePlan
        } else {
            definition.body.machine()
        };

        let entry_criteria = definition
            .entry_criteria
            .iter()
            .map(|c| CriterionInstance::new(CriterionKind::Entry, c.clone()))
            .collect();
        let exit_criteria = definition
            .exit_criteria
            .iter()
            .map(|c| CriterionInstance::new(CriterionKind::Exit, c.clone()))
            .collect();

        self.plan_items.push(PlanItem {
            id: created.plan_item_id.clone(),
            definition_id: created.definition_id.clone(),
            name: created.name.clone(),
            index: created.index,
            stage_id: created.stage_id.clone(),
            machine,
            discretionary: created.discretionary,
            state: State::Null,
            history_state: State::Null,
            entry_criteria,
            exit_criteria,
        });

        Ok(vec![Reaction::BeginLifecycle {
            plan_item_id: created.plan_item_id.clone(),
        }])
    }

    fn apply_transitioned(
        &mut self,
        transitioned: &PlanItemTransitioned,
    ) -> Result<Vec<Reaction>, ModelError> {
        let source_definition_id = {
            let item = self.item_mut(&transitioned.plan_item_id).ok_or_else(|| {
                ModelError::engine_fault(format!(
                    "transition for unknown plan item '{}'",
                    transitioned.plan_item_id
                ))
            })?;
            item.history_state = transitioned.previous_state;
            item.state = transitioned.new_state;
            item.definition_id.clone()
        };

        let mut reactions = vec![Reaction::StateChanged {
            plan_item_id: transitioned.plan_item_id.clone(),
            transition: transitioned.transition,
            new_state: transitioned.new_state,
        }];

        // Sentry sweep: every criterion in the case hears about every
        // plan-item transition. Completion consumes the fired set, in live
        // processing and replay alike.
        for item in &mut self.plan_items {
            for criterion in item
                .entry_criteria
                .iter_mut()
                .chain(item.exit_criteria.iter_mut())
            {
                if criterion.note_plan_item(&source_definition_id, transitioned.transition) {
                    reactions.push(Reaction::CriterionSatisfied {
                        plan_item_id: item.id.clone(),
                        kind: criterion.kind,
                        if_part: criterion.if_part().map(str::to_string),
                    });
                }
            }
        }

        Ok(reactions)
    }

    fn apply_file_change(
        &mut self,
        change: &CaseFileItemTransitioned,
    ) -> Result<Vec<Reaction>, ModelError> {
        self.file.apply(change);
        self.change_buffer.add(change.clone());

        let mut reactions = Vec::new();
        for item in &mut self.plan_items {
            for criterion in item
                .entry_criteria
                .iter_mut()
                .chain(item.exit_criteria.iter_mut())
            {
                if criterion.note_case_file(&change.path, change.transition) {
                    reactions.push(Reaction::CriterionSatisfied {
                        plan_item_id: item.id.clone(),
                        kind: criterion.kind,
                        if_part: criterion.if_part().map(str::to_string),
                    });
                }
            }
        }
        Ok(reactions)
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Serialize the observable case state for query responses.
    pub fn render(&self) -> Value {
        let mut out = Value::empty_map();
        out.set_field("caseName", Value::from(self.case_name.clone()));
        if let Some(root) = self.root() {
            out.set_field("state", Value::from(root.state.to_string()));
        }

        let mut items = Vec::new();
        for item in &self.plan_items {
            let mut rendered = Value::empty_map();
            rendered.set_field("id", Value::from(item.id.clone()));
            rendered.set_field("name", Value::from(item.name.clone()));
            rendered.set_field("state", Value::from(item.state.to_string()));
            rendered.set_field("index", Value::Long(item.index as i64));
            if let Some(stage) = &item.stage_id {
                rendered.set_field("stage", Value::from(stage.clone()));
            }
            items.push(rendered);
        }
        out.set_field("planItems", Value::List(items));

        let mut team = Vec::new();
        for member in &self.team {
            let mut rendered = Value::empty_map();
            rendered.set_field("userId", Value::from(member.user_id.clone()));
            rendered.set_field("owner", Value::Bool(member.owner));
            team.push(rendered);
        }
        out.set_field("team", Value::List(team));
        out.set_field("file", self.file.render());

        let changes: Vec<Value> = self
            .change_buffer
            .change_set()
            .iter()
            .map(|e| {
                let mut rendered = Value::empty_map();
                rendered.set_field("path", Value::from(e.path.to_string()));
                rendered.set_field("transition", Value::from(e.transition.to_string()));
                rendered
            })
            .collect();
        out.set_field("changeSet", Value::List(changes));
        out
    }
}
