use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::actormodel::failure::ModelError;
use crate::case::file::CaseFileTransition;
use crate::case::planitem::{StateMachine, Transition};
use crate::value::{Value, ValuePath};

// ============================================================================
// Case Definition Model
// ============================================================================
//
// The serializable shape of a case: the plan hierarchy, the sentries wired
// between its items, and the case file schema. Definitions travel inside the
// StartCase command; parsing them out of CMMN XML happens elsewhere.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDefinition {
    pub name: String,
    pub plan: StageDefinition,
    #[serde(default)]
    pub case_file: Vec<CaseFileItemDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: String,
    pub name: String,
    /// Auto-completing stages finish as soon as no child is active or
    /// suspended; others wait for every child to reach a semi-terminal state.
    #[serde(default)]
    pub auto_complete: bool,
    #[serde(default)]
    pub items: Vec<ItemDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub discretionary: bool,
    pub body: ItemBody,
    #[serde(default)]
    pub entry_criteria: Vec<CriterionDefinition>,
    #[serde(default)]
    pub exit_criteria: Vec<CriterionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum ItemBody {
    HumanTask,
    ProcessTask {
        #[serde(default)]
        input: Value,
    },
    Milestone,
    TimerEvent {
        delay_ms: u64,
    },
    UserEvent,
    Stage(StageDefinition),
}

impl ItemBody {
    pub fn machine(&self) -> StateMachine {
        match self {
            ItemBody::HumanTask | ItemBody::ProcessTask { .. } | ItemBody::Stage(_) => {
                StateMachine::TaskStage
            }
            ItemBody::Milestone | ItemBody::TimerEvent { .. } | ItemBody::UserEvent => {
                StateMachine::Occur
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDefinition {
    pub on_parts: Vec<OnPartDefinition>,
    #[serde(default)]
    pub if_part: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source")]
pub enum OnPartDefinition {
    PlanItem {
        /// Item definition id of the source.
        item: String,
        transition: Transition,
    },
    CaseFileItem {
        path: ValuePath,
        transition: CaseFileTransition,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFileItemDefinition {
    pub name: String,
    #[serde(default)]
    pub children: Vec<CaseFileItemDefinition>,
}

// ============================================================================
// Lookups and validation
// ============================================================================

impl CaseDefinition {
    /// The case plan root, presented as an item definition so the plan-item
    /// machinery treats it uniformly.
    pub fn root_item(&self) -> ItemDefinition {
        ItemDefinition {
            id: self.plan.id.clone(),
            name: self.plan.name.clone(),
            discretionary: false,
            body: ItemBody::Stage(self.plan.clone()),
            entry_criteria: Vec::new(),
            exit_criteria: Vec::new(),
        }
    }

    /// Find an item definition anywhere in the plan hierarchy.
    pub fn find_item(&self, definition_id: &str) -> Option<ItemDefinition> {
        if definition_id == self.plan.id {
            return Some(self.root_item());
        }
        find_in_stage(&self.plan, definition_id)
    }

    /// True when `path`'s segment chain is declared in the case file schema.
    pub fn defines_file_path(&self, path: &ValuePath) -> bool {
        let mut scope = &self.case_file;
        for element in path.elements() {
            match scope.iter().find(|d| d.name == element.name) {
                Some(def) => scope = &def.children,
                None => return false,
            }
        }
        true
    }

    /// Structural sanity, checked once when a case is started.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut ids = HashSet::new();
        ids.insert(self.plan.id.clone());
        collect_ids(&self.plan, &mut ids).map_err(ModelError::invalid_command)?;

        let mut errors = Vec::new();
        check_criteria(self, &self.plan, &ids, &mut errors);
        if let Some(first) = errors.into_iter().next() {
            return Err(ModelError::invalid_command(first));
        }
        Ok(())
    }
}

fn find_in_stage(stage: &StageDefinition, definition_id: &str) -> Option<ItemDefinition> {
    for item in &stage.items {
        if item.id == definition_id {
            return Some(item.clone());
        }
        if let ItemBody::Stage(nested) = &item.body {
            if let Some(found) = find_in_stage(nested, definition_id) {
                return Some(found);
            }
        }
    }
    None
}

fn collect_ids(stage: &StageDefinition, ids: &mut HashSet<String>) -> Result<(), String> {
    for item in &stage.items {
        if !ids.insert(item.id.clone()) {
            return Err(format!("duplicate plan item definition id '{}'", item.id));
        }
        if let ItemBody::Stage(nested) = &item.body {
            if !ids.insert(nested.id.clone()) {
                return Err(format!("duplicate stage definition id '{}'", nested.id));
            }
            collect_ids(nested, ids)?;
        }
    }
    Ok(())
}

fn check_criteria(
    definition: &CaseDefinition,
    stage: &StageDefinition,
    ids: &HashSet<String>,
    errors: &mut Vec<String>,
) {
    for item in &stage.items {
        for criterion in item.entry_criteria.iter().chain(item.exit_criteria.iter()) {
            if criterion.on_parts.is_empty() {
                errors.push(format!("criterion on '{}' has no on-parts", item.name));
            }
            for on_part in &criterion.on_parts {
                match on_part {
                    OnPartDefinition::PlanItem { item: source, .. } => {
                        if !ids.contains(source) {
                            errors.push(format!(
                                "criterion on '{}' references unknown plan item '{}'",
                                item.name, source
                            ));
                        }
                    }
                    OnPartDefinition::CaseFileItem { path, .. } => {
                        if !definition.defines_file_path(path) {
                            errors.push(format!(
                                "criterion on '{}' references undefined case file path '{}'",
                                item.name, path
                            ));
                        }
                    }
                }
            }
        }
        if let ItemBody::Stage(nested) = &item.body {
            check_criteria(definition, nested, ids, errors);
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> CaseDefinition {
        CaseDefinition {
            name: "Claim".to_string(),
            plan: StageDefinition {
                id: "plan".to_string(),
                name: "Claim".to_string(),
                auto_complete: false,
                items: vec![
                    ItemDefinition {
                        id: "review".to_string(),
                        name: "Review".to_string(),
                        discretionary: false,
                        body: ItemBody::HumanTask,
                        entry_criteria: vec![],
                        exit_criteria: vec![],
                    },
                    ItemDefinition {
                        id: "approved".to_string(),
                        name: "Approved".to_string(),
                        discretionary: false,
                        body: ItemBody::Milestone,
                        entry_criteria: vec![CriterionDefinition {
                            on_parts: vec![OnPartDefinition::PlanItem {
                                item: "review".to_string(),
                                transition: Transition::Complete,
                            }],
                            if_part: None,
                        }],
                        exit_criteria: vec![],
                    },
                ],
            },
            case_file: vec![CaseFileItemDefinition {
                name: "Claim".to_string(),
                children: vec![CaseFileItemDefinition {
                    name: "Attachment".to_string(),
                    children: vec![],
                }],
            }],
        }
    }

    #[test]
    fn test_validate_accepts_sane_definition() {
        definition().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_unknown_on_part_source() {
        let mut def = definition();
        def.plan.items[1].entry_criteria[0].on_parts = vec![OnPartDefinition::PlanItem {
            item: "missing".to_string(),
            transition: Transition::Complete,
        }];
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut def = definition();
        def.plan.items[1].id = "review".to_string();
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_file_path_lookup() {
        let def = definition();
        assert!(def.defines_file_path(&ValuePath::parse("Claim").unwrap()));
        assert!(def.defines_file_path(&ValuePath::parse("Claim/Attachment").unwrap()));
        assert!(!def.defines_file_path(&ValuePath::parse("Other").unwrap()));
    }

    #[test]
    fn test_find_item_recurses_into_stages() {
        let mut def = definition();
        def.plan.items.push(ItemDefinition {
            id: "phase2".to_string(),
            name: "Phase 2".to_string(),
            discretionary: false,
            body: ItemBody::Stage(StageDefinition {
                id: "phase2-stage".to_string(),
                name: "Phase 2".to_string(),
                auto_complete: true,
                items: vec![ItemDefinition {
                    id: "archive".to_string(),
                    name: "Archive".to_string(),
                    discretionary: false,
                    body: ItemBody::HumanTask,
                    entry_criteria: vec![],
                    exit_criteria: vec![],
                }],
            }),
            entry_criteria: vec![],
            exit_criteria: vec![],
        });

        assert!(def.find_item("archive").is_some());
        assert!(def.find_item("plan").is_some());
        assert!(def.find_item("nope").is_none());
    }

    #[test]
    fn test_definition_serialization_round_trip() {
        let def = definition();
        let json = serde_json::to_string(&def).unwrap();
        let back: CaseDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }
}
