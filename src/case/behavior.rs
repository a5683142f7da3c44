use chrono::Duration;

use crate::actormodel::actor::UnitOfWork;
use crate::actormodel::failure::ModelError;
use crate::actormodel::system::AnyCommand;
use crate::case::commands::CaseCallback;
use crate::case::definition::{ItemBody, ItemDefinition};
use crate::case::events::{CaseEvent, CaseStarted, PlanItemCreated, PlanItemTransitioned};
use crate::case::planitem::{State, StateMachine, Transition};
use crate::case::sentry::CriterionKind;
use crate::case::state::{CaseState, Reaction};
use crate::case::CaseModel;
use crate::process::ProcessCommand;
use crate::timer::{TimerCommand, TIMER_SERVICE_ID};

// ============================================================================
// Case Behavior Engine
// ============================================================================
//
// The generating side of the case: every event is applied to the working
// copy the moment it is buffered, and the reactions of that application -
// lifecycle begins, satisfied criteria, stage propagation - are handled
// synchronously within the same pass, producing further events into the same
// unit of work. Replay applies the identical mutations without the
// generation step, because the generated consequences are already persisted.
//
// ============================================================================

pub struct CaseWork<'a> {
    uow: &'a mut UnitOfWork<CaseModel>,
}

impl<'a> CaseWork<'a> {
    pub fn new(uow: &'a mut UnitOfWork<CaseModel>) -> Self {
        Self { uow }
    }

    pub fn uow(&mut self) -> &mut UnitOfWork<CaseModel> {
        self.uow
    }

    pub fn state(&self) -> Result<&CaseState, ModelError> {
        self.uow
            .state()
            .ok_or_else(|| ModelError::engine_fault("case state missing during processing"))
    }

    /// Bootstrap: bring the case into existence and record the fact.
    pub fn start_case(&mut self, event: CaseStarted) {
        *self.uow.state_mut() = Some(CaseState::from_started(&event));
        self.uow.record(CaseEvent::CaseStarted(event));
    }

    /// Apply an event to the working state, buffer it, and run every
    /// reaction it causes before returning.
    pub fn deliver(&mut self, event: CaseEvent) -> Result<(), ModelError> {
        let reactions = {
            let state = self
                .uow
                .state_mut()
                .as_mut()
                .ok_or_else(|| ModelError::engine_fault("case state missing during processing"))?;
            state.apply(&event)?
        };
        self.uow.record(event);
        for reaction in reactions {
            self.react(reaction)?;
        }
        Ok(())
    }

    /// Instantiate a plan item from its definition.
    pub fn create_item(
        &mut self,
        definition: &ItemDefinition,
        stage_id: Option<String>,
    ) -> Result<(), ModelError> {
        let index = self.state()?.next_index(&definition.id);
        let plan_item_id = format!("{}.{}", definition.id, index);
        self.deliver(CaseEvent::PlanItemCreated(PlanItemCreated {
            plan_item_id,
            definition_id: definition.id.clone(),
            name: definition.name.clone(),
            stage_id,
            index,
            discretionary: definition.discretionary,
        }))
    }

    /// Apply `transition` to a plan item; illegal transitions are an error.
    pub fn transition(&mut self, plan_item_id: &str, transition: Transition) -> Result<(), ModelError> {
        let (previous, target) = {
            let state = self.state()?;
            let item = state.item(plan_item_id).ok_or_else(|| {
                ModelError::invalid_command(format!("unknown plan item '{}'", plan_item_id))
            })?;
            (item.state, item.transition_target(transition)?)
        };
        self.deliver(CaseEvent::PlanItemTransitioned(PlanItemTransitioned {
            plan_item_id: plan_item_id.to_string(),
            transition,
            previous_state: previous,
            new_state: target,
        }))
    }

    /// Apply `transition` when it is legal from the item's current state;
    /// silently skip otherwise. Used for engine-driven propagation, where an
    /// item may already be past the point of caring.
    pub fn try_transition(&mut self, plan_item_id: &str, transition: Transition) -> Result<(), ModelError> {
        let attempt = {
            let state = self.state()?;
            state
                .item(plan_item_id)
                .and_then(|item| item.transition_target(transition).ok().map(|t| (item.state, t)))
        };
        match attempt {
            Some((previous, target)) => self.deliver(CaseEvent::PlanItemTransitioned(PlanItemTransitioned {
                plan_item_id: plan_item_id.to_string(),
                transition,
                previous_state: previous,
                new_state: target,
            })),
            None => {
                tracing::trace!(
                    plan_item_id = plan_item_id,
                    transition = %transition,
                    "Propagated transition not applicable; skipped"
                );
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------

    fn react(&mut self, reaction: Reaction) -> Result<(), ModelError> {
        match reaction {
            Reaction::BeginLifecycle { plan_item_id } => self.begin_lifecycle(&plan_item_id),
            Reaction::StateChanged {
                plan_item_id,
                transition,
                new_state,
            } => self.on_state_changed(&plan_item_id, transition, new_state),
            Reaction::CriterionSatisfied {
                plan_item_id,
                kind,
                if_part,
            } => self.on_criterion_satisfied(&plan_item_id, kind, if_part),
        }
    }

    /// Begin-lifecycle behavior of a freshly created plan item: enter the
    /// machine via Create, then auto-start when nothing is gating it.
    fn begin_lifecycle(&mut self, plan_item_id: &str) -> Result<(), ModelError> {
        self.transition(plan_item_id, Transition::Create)?;

        let start_now = {
            let state = self.state()?;
            let item = state.item(plan_item_id).ok_or_else(|| {
                ModelError::engine_fault(format!("created item '{}' not found", plan_item_id))
            })?;
            let parent_active = match &item.stage_id {
                None => true,
                Some(stage) => state
                    .item(stage)
                    .map(|s| s.state == State::Active)
                    .unwrap_or(false),
            };
            item.state == State::Available
                && item.entry_criteria.is_empty()
                && parent_active
                && matches!(item.machine, StateMachine::TaskStage | StateMachine::CasePlan)
        };
        if start_now {
            self.transition(plan_item_id, Transition::Start)?;
        }
        Ok(())
    }

    fn on_state_changed(
        &mut self,
        plan_item_id: &str,
        transition: Transition,
        new_state: State,
    ) -> Result<(), ModelError> {
        let (body, stage_id) = {
            let state = self.state()?;
            let item = state.item(plan_item_id).ok_or_else(|| {
                ModelError::engine_fault(format!("transitioned item '{}' not found", plan_item_id))
            })?;
            let body = state
                .definition
                .find_item(&item.definition_id)
                .map(|d| d.body)
                .ok_or_else(|| {
                    ModelError::engine_fault(format!(
                        "definition '{}' missing for plan item '{}'",
                        item.definition_id, plan_item_id
                    ))
                })?;
            (body, item.stage_id.clone())
        };

        match new_state {
            State::Active => match (&body, transition) {
                (ItemBody::Stage(stage), Transition::Start | Transition::ManualStart) => {
                    for child in stage.items.clone() {
                        self.create_item(&child, Some(plan_item_id.to_string()))?;
                    }
                }
                (ItemBody::Stage(_), Transition::Resume | Transition::ParentResume) => {
                    self.propagate(plan_item_id, Transition::ParentResume)?;
                }
                (ItemBody::ProcessTask { input }, Transition::Start | Transition::ManualStart) => {
                    self.kick_process_task(plan_item_id, input.clone())?;
                }
                _ => {}
            },
            State::Available => {
                if let ItemBody::TimerEvent { delay_ms } = body {
                    self.request_timer(plan_item_id, delay_ms)?;
                }
            }
            State::Suspended => {
                if matches!(body, ItemBody::Stage(_)) {
                    self.propagate(plan_item_id, Transition::Suspend)?;
                }
            }
            State::Terminated => {
                if matches!(body, ItemBody::Stage(_)) {
                    self.propagate(plan_item_id, Transition::Exit)?;
                }
            }
            _ => {}
        }

        // A child settling may complete its containing stage.
        if new_state.is_semi_terminal() {
            if let Some(stage_id) = stage_id {
                self.check_stage_completion(&stage_id)?;
            }
        }
        Ok(())
    }

    fn propagate(&mut self, stage_item_id: &str, transition: Transition) -> Result<(), ModelError> {
        let children: Vec<String> = self
            .state()?
            .children_of(stage_item_id)
            .map(|c| c.id.clone())
            .collect();
        for child in children {
            self.try_transition(&child, transition)?;
        }
        Ok(())
    }

    fn check_stage_completion(&mut self, stage_item_id: &str) -> Result<(), ModelError> {
        let complete = {
            let state = self.state()?;
            let Some(stage) = state.item(stage_item_id) else {
                return Ok(());
            };
            if stage.state != State::Active {
                return Ok(());
            }
            let auto_complete = match state
                .definition
                .find_item(&stage.definition_id)
                .map(|d| d.body)
            {
                Some(ItemBody::Stage(def)) => def.auto_complete,
                _ => false,
            };
            let mut blocked = false;
            let mut waiting = false;
            for child in state.children_of(stage_item_id) {
                match child.state {
                    State::Active | State::Suspended | State::Failed => blocked = true,
                    State::Available | State::Disabled => waiting = true,
                    _ => {}
                }
            }
            !blocked && (auto_complete || !waiting)
        };
        if complete {
            self.try_transition(stage_item_id, Transition::Complete)?;
        }
        Ok(())
    }

    fn on_criterion_satisfied(
        &mut self,
        plan_item_id: &str,
        kind: CriterionKind,
        if_part: Option<String>,
    ) -> Result<(), ModelError> {
        if let Some(expression) = if_part {
            let case_file = self.state()?.file.render();
            let evaluator = self.uow.services().evaluator.clone();
            if !evaluator.evaluate(&expression, &case_file)? {
                tracing::trace!(
                    plan_item_id = plan_item_id,
                    expression = %expression,
                    "Criterion complete but if-part evaluated false"
                );
                return Ok(());
            }
        }

        let machine = match self.state()?.item(plan_item_id) {
            Some(item) => item.machine,
            None => return Ok(()),
        };
        match kind {
            CriterionKind::Entry => match machine {
                StateMachine::Occur => self.try_transition(plan_item_id, Transition::Occur),
                StateMachine::TaskStage | StateMachine::CasePlan => {
                    self.try_transition(plan_item_id, Transition::Start)
                }
            },
            CriterionKind::Exit => self.try_transition(plan_item_id, Transition::Exit),
        }
    }

    // ------------------------------------------------------------------
    // Cross-actor kicks
    // ------------------------------------------------------------------

    fn kick_process_task(&mut self, plan_item_id: &str, input: crate::value::Value) -> Result<(), ModelError> {
        let (task_actor_id, task_name) = {
            let state = self.state()?;
            let item = state
                .item(plan_item_id)
                .ok_or_else(|| ModelError::engine_fault("process task item vanished"))?;
            (
                format!("{}/{}", self.uow.actor_id, item.id),
                item.name.clone(),
            )
        };
        tracing::debug!(
            case_id = %self.uow.actor_id,
            plan_item_id = plan_item_id,
            task_actor_id = %task_actor_id,
            "Asking process task to start"
        );
        self.uow.ask(
            task_actor_id,
            AnyCommand::Process(ProcessCommand::StartProcess {
                name: task_name,
                input,
            }),
            CaseCallback::ProcessTaskConcluded {
                plan_item_id: plan_item_id.to_string(),
            },
        );
        Ok(())
    }

    fn request_timer(&mut self, plan_item_id: &str, delay_ms: u64) -> Result<(), ModelError> {
        let case_id = self.uow.actor_id.clone();
        let due = self.uow.timestamp + Duration::milliseconds(delay_ms as i64);
        self.uow.ask(
            TIMER_SERVICE_ID,
            AnyCommand::Timer(TimerCommand::SetTimer {
                timer_id: format!("{}/{}", case_id, plan_item_id),
                case_id,
                plan_item_id: plan_item_id.to_string(),
                due,
            }),
            CaseCallback::TimerRequested {
                plan_item_id: plan_item_id.to_string(),
            },
        );
        Ok(())
    }
}
