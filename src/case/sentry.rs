use std::sync::Arc;

use crate::actormodel::failure::ModelError;
use crate::case::definition::{CriterionDefinition, OnPartDefinition};
use crate::case::file::CaseFileTransition;
use crate::case::planitem::Transition;
use crate::value::{Value, ValuePath};

// ============================================================================
// Sentries
// ============================================================================
//
// A criterion fires when all of its on-parts have fired and its optional
// if-part evaluates to true. On-part satisfaction is bookkeeping on the
// criterion instance; it is never persisted separately but re-derived by
// replaying the same transition events that drive the plan items.
//
// The fired set is consumed the moment it becomes complete - in live
// processing that is the moment the criterion fires, and replay performs the
// identical reset, so recovered sentry state matches live state exactly.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionKind {
    Entry,
    Exit,
}

#[derive(Debug, Clone)]
pub struct CriterionInstance {
    pub kind: CriterionKind,
    pub definition: CriterionDefinition,
    fired: Vec<bool>,
}

impl CriterionInstance {
    pub fn new(kind: CriterionKind, definition: CriterionDefinition) -> Self {
        let fired = vec![false; definition.on_parts.len()];
        Self {
            kind,
            definition,
            fired,
        }
    }

    pub fn if_part(&self) -> Option<&str> {
        self.definition.if_part.as_deref()
    }

    /// Record a plan-item transition. True when the criterion just became
    /// complete; the fired set is then reset.
    pub fn note_plan_item(&mut self, source_definition_id: &str, transition: Transition) -> bool {
        self.note(|on_part| {
            matches!(on_part, OnPartDefinition::PlanItem { item, transition: t }
                if item == source_definition_id && *t == transition)
        })
    }

    /// Record a case-file-item transition. Same consumption rule.
    pub fn note_case_file(&mut self, path: &ValuePath, transition: CaseFileTransition) -> bool {
        self.note(|on_part| {
            matches!(on_part, OnPartDefinition::CaseFileItem { path: p, transition: t }
                if p == path && *t == transition)
        })
    }

    fn note(&mut self, matches: impl Fn(&OnPartDefinition) -> bool) -> bool {
        let mut touched = false;
        for (i, on_part) in self.definition.on_parts.iter().enumerate() {
            if matches(on_part) {
                self.fired[i] = true;
                touched = true;
            }
        }
        if touched && !self.fired.is_empty() && self.fired.iter().all(|f| *f) {
            // Consume: the next firing needs every on-part again.
            self.fired.iter_mut().for_each(|f| *f = false);
            return true;
        }
        false
    }
}

// ============================================================================
// If-Part Evaluation
// ============================================================================

/// Expression engines are external collaborators; the engine only needs a
/// yes/no answer against the current case file.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, case_file: &Value) -> Result<bool, ModelError>;
}

/// Understands the boolean literals; anything else is a configuration error,
/// not something to guess about.
pub struct LiteralConditionEvaluator;

impl ConditionEvaluator for LiteralConditionEvaluator {
    fn evaluate(&self, expression: &str, _case_file: &Value) -> Result<bool, ModelError> {
        match expression.trim() {
            "" | "true" => Ok(true),
            "false" => Ok(false),
            other => Err(ModelError::engine_fault(format!(
                "no condition evaluator registered for expression '{}'",
                other
            ))),
        }
    }
}

pub type SharedEvaluator = Arc<dyn ConditionEvaluator>;

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn two_part_criterion() -> CriterionInstance {
        CriterionInstance::new(
            CriterionKind::Entry,
            CriterionDefinition {
                on_parts: vec![
                    OnPartDefinition::PlanItem {
                        item: "a".to_string(),
                        transition: Transition::Complete,
                    },
                    OnPartDefinition::PlanItem {
                        item: "b".to_string(),
                        transition: Transition::Complete,
                    },
                ],
                if_part: None,
            },
        )
    }

    #[test]
    fn test_single_on_part_does_not_complete() {
        let mut criterion = two_part_criterion();
        assert!(!criterion.note_plan_item("a", Transition::Complete));
        // Same on-part again: still incomplete.
        assert!(!criterion.note_plan_item("a", Transition::Complete));
    }

    #[test]
    fn test_both_on_parts_complete_in_either_order() {
        for order in [["a", "b"], ["b", "a"]] {
            let mut criterion = two_part_criterion();
            assert!(!criterion.note_plan_item(order[0], Transition::Complete));
            assert!(criterion.note_plan_item(order[1], Transition::Complete));
        }
    }

    #[test]
    fn test_consumed_after_completion() {
        let mut criterion = two_part_criterion();
        criterion.note_plan_item("a", Transition::Complete);
        assert!(criterion.note_plan_item("b", Transition::Complete));
        // Fired set was reset; one on-part alone does not complete again.
        assert!(!criterion.note_plan_item("b", Transition::Complete));
        assert!(!criterion.note_plan_item("a", Transition::Complete));
    }

    #[test]
    fn test_wrong_transition_ignored() {
        let mut criterion = two_part_criterion();
        assert!(!criterion.note_plan_item("a", Transition::Start));
        assert!(!criterion.note_plan_item("c", Transition::Complete));
    }

    #[test]
    fn test_case_file_on_part() {
        let mut criterion = CriterionInstance::new(
            CriterionKind::Entry,
            CriterionDefinition {
                on_parts: vec![OnPartDefinition::CaseFileItem {
                    path: ValuePath::parse("Claim").unwrap(),
                    transition: CaseFileTransition::Create,
                }],
                if_part: None,
            },
        );
        let path = ValuePath::parse("Claim").unwrap();
        assert!(!criterion.note_case_file(&path, CaseFileTransition::Update));
        assert!(criterion.note_case_file(&path, CaseFileTransition::Create));
    }

    #[test]
    fn test_literal_evaluator() {
        let evaluator = LiteralConditionEvaluator;
        assert!(evaluator.evaluate("true", &Value::Null).unwrap());
        assert!(evaluator.evaluate("", &Value::Null).unwrap());
        assert!(!evaluator.evaluate("false", &Value::Null).unwrap());
        assert!(evaluator.evaluate("claim.amount > 100", &Value::Null).is_err());
    }
}
