use serde::{Deserialize, Serialize};
use std::fmt;

use crate::actormodel::failure::ModelError;
use crate::value::{Value, ValuePath};

// ============================================================================
// Case File
// ============================================================================
//
// A tree of data items addressed by path, with its own small state machine:
//
//   Null --Create--> Available --Delete--> Discarded
//
// Update/Replace/AddChild/RemoveChild keep an item Available. Case file
// transitions feed sentries exactly like plan-item transitions do.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseFileItemState {
    Null,
    Available,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseFileTransition {
    Create,
    Update,
    Replace,
    Delete,
    AddChild,
    RemoveChild,
}

impl fmt::Display for CaseFileTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Target state for a case-file transition, or a denial.
pub fn file_transition_target(
    path: &ValuePath,
    current: CaseFileItemState,
    transition: CaseFileTransition,
) -> Result<CaseFileItemState, ModelError> {
    use CaseFileItemState::*;
    use CaseFileTransition::*;
    let target = match (transition, current) {
        (Create, Null) => Some(Available),
        (Update, Available) | (Replace, Available) => Some(Available),
        (AddChild, Available) | (RemoveChild, Available) => Some(Available),
        (Delete, Available) => Some(Discarded),
        _ => None,
    };
    target.ok_or(ModelError::TransitionDenied {
        item: path.to_string(),
        transition: transition.to_string(),
        state: format!("{:?}", current),
    })
}

/// The persisted shape of one case-file change. For AddChild/RemoveChild the
/// path is the parent's and `child` names the affected child - these events
/// are the only ones that carry both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFileItemTransitioned {
    pub path: ValuePath,
    pub transition: CaseFileTransition,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub child: Option<String>,
}

// ============================================================================
// The file itself
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CaseFileItem {
    pub path: ValuePath,
    pub state: CaseFileItemState,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseFile {
    items: Vec<CaseFileItem>,
}

impl CaseFile {
    pub fn item(&self, path: &ValuePath) -> Option<&CaseFileItem> {
        self.items.iter().find(|i| &i.path == path)
    }

    pub fn state_of(&self, path: &ValuePath) -> CaseFileItemState {
        self.item(path)
            .map(|i| i.state)
            .unwrap_or(CaseFileItemState::Null)
    }

    /// Pure application of a persisted change; shared by live apply and
    /// recovery replay.
    pub fn apply(&mut self, change: &CaseFileItemTransitioned) {
        match change.transition {
            CaseFileTransition::Create => {
                self.put(change.path.clone(), change.value.clone());
            }
            CaseFileTransition::Update => {
                if let Some(item) = self.item_mut(&change.path) {
                    match (&mut item.value, &change.value) {
                        (existing @ Value::Map(_), Value::Map(entries)) => {
                            for (k, v) in entries {
                                existing.set_field(k, v.clone());
                            }
                        }
                        (existing, replacement) => *existing = replacement.clone(),
                    }
                }
            }
            CaseFileTransition::Replace => {
                if let Some(item) = self.item_mut(&change.path) {
                    item.value = change.value.clone();
                }
            }
            CaseFileTransition::Delete => {
                let path = change.path.clone();
                for item in &mut self.items {
                    if item.path == path || path.is_ancestor_of(&item.path) {
                        item.state = CaseFileItemState::Discarded;
                        item.value = Value::Null;
                    }
                }
            }
            CaseFileTransition::AddChild => {
                if let Some(name) = &change.child {
                    self.put(change.path.child(name), change.value.clone());
                }
            }
            CaseFileTransition::RemoveChild => {
                if let Some(name) = &change.child {
                    let child_path = change.path.child(name);
                    self.items
                        .retain(|i| i.path != child_path && !child_path.is_ancestor_of(&i.path));
                }
            }
        }
    }

    fn put(&mut self, path: ValuePath, value: Value) {
        match self.item_mut(&path) {
            Some(item) => {
                item.state = CaseFileItemState::Available;
                item.value = value;
            }
            None => self.items.push(CaseFileItem {
                path,
                state: CaseFileItemState::Available,
                value,
            }),
        }
    }

    fn item_mut(&mut self, path: &ValuePath) -> Option<&mut CaseFileItem> {
        self.items.iter_mut().find(|i| &i.path == path)
    }

    /// Render the live items as a value tree keyed by path.
    pub fn render(&self) -> Value {
        let mut out = Value::empty_map();
        for item in &self.items {
            if item.state == CaseFileItemState::Available {
                out.set_field(&item.path.to_string(), item.value.clone());
            }
        }
        out
    }
}

// ============================================================================
// Change-Set Buffer
// ============================================================================
//
// Builds the minimal change-set for downstream projections: only
// top-level-path events are kept. An event on a parent path supersedes
// buffered events on child paths, and a new parent event evicts buffered
// descendants. RemoveChild is the exception - it uniquely carries both the
// parent and the child path, so it is always retained on the side.
//
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseFileEventBuffer {
    retained: Vec<CaseFileItemTransitioned>,
    removals: Vec<CaseFileItemTransitioned>,
}

impl CaseFileEventBuffer {
    pub fn add(&mut self, event: CaseFileItemTransitioned) {
        if event.transition == CaseFileTransition::RemoveChild {
            self.removals.push(event);
            return;
        }
        // An already-buffered ancestor covers this change.
        if self
            .retained
            .iter()
            .any(|e| e.path.is_ancestor_of(&event.path))
        {
            return;
        }
        // This change covers buffered descendants, and replaces a buffered
        // event on the same path.
        self.retained
            .retain(|e| !event.path.is_ancestor_of(&e.path) && e.path != event.path);
        self.retained.push(event);
    }

    /// Top-level changes plus every child removal.
    pub fn change_set(&self) -> Vec<&CaseFileItemTransitioned> {
        self.retained.iter().chain(self.removals.iter()).collect()
    }

    pub fn len(&self) -> usize {
        self.retained.len() + self.removals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty() && self.removals.is_empty()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn path(text: &str) -> ValuePath {
        ValuePath::parse(text).unwrap()
    }

    fn change(p: &str, transition: CaseFileTransition) -> CaseFileItemTransitioned {
        CaseFileItemTransitioned {
            path: path(p),
            transition,
            value: Value::Null,
            child: None,
        }
    }

    #[test]
    fn test_file_state_machine() {
        let p = path("Claim");
        assert_eq!(
            file_transition_target(&p, CaseFileItemState::Null, CaseFileTransition::Create).unwrap(),
            CaseFileItemState::Available
        );
        assert_eq!(
            file_transition_target(&p, CaseFileItemState::Available, CaseFileTransition::Delete)
                .unwrap(),
            CaseFileItemState::Discarded
        );
        assert!(file_transition_target(&p, CaseFileItemState::Null, CaseFileTransition::Update)
            .is_err());
        assert!(
            file_transition_target(&p, CaseFileItemState::Discarded, CaseFileTransition::Create)
                .is_err()
        );
    }

    #[test]
    fn test_apply_create_update_replace() {
        let mut file = CaseFile::default();
        let mut value = Value::empty_map();
        value.set_field("amount", Value::Long(100));
        file.apply(&CaseFileItemTransitioned {
            path: path("Claim"),
            transition: CaseFileTransition::Create,
            value,
            child: None,
        });
        assert_eq!(file.state_of(&path("Claim")), CaseFileItemState::Available);

        let mut update = Value::empty_map();
        update.set_field("status", Value::from("open"));
        file.apply(&CaseFileItemTransitioned {
            path: path("Claim"),
            transition: CaseFileTransition::Update,
            value: update,
            child: None,
        });
        let item = file.item(&path("Claim")).unwrap();
        // Update merges; the original field survives.
        assert_eq!(item.value.field("amount"), Some(&Value::Long(100)));
        assert_eq!(item.value.field("status"), Some(&Value::Text("open".into())));

        file.apply(&CaseFileItemTransitioned {
            path: path("Claim"),
            transition: CaseFileTransition::Replace,
            value: Value::from("gone"),
            child: None,
        });
        assert_eq!(file.item(&path("Claim")).unwrap().value, Value::from("gone"));
    }

    #[test]
    fn test_apply_children() {
        let mut file = CaseFile::default();
        file.apply(&change("Claim", CaseFileTransition::Create));
        file.apply(&CaseFileItemTransitioned {
            path: path("Claim"),
            transition: CaseFileTransition::AddChild,
            value: Value::from("scan.pdf"),
            child: Some("Attachment".to_string()),
        });
        assert_eq!(
            file.state_of(&path("Claim/Attachment")),
            CaseFileItemState::Available
        );

        file.apply(&CaseFileItemTransitioned {
            path: path("Claim"),
            transition: CaseFileTransition::RemoveChild,
            value: Value::Null,
            child: Some("Attachment".to_string()),
        });
        assert_eq!(file.state_of(&path("Claim/Attachment")), CaseFileItemState::Null);
    }

    #[test]
    fn test_buffer_parent_supersedes_buffered_child() {
        let mut buffer = CaseFileEventBuffer::default();
        buffer.add(change("A/B", CaseFileTransition::Update));
        buffer.add(change("A", CaseFileTransition::Update));
        let paths: Vec<String> = buffer.change_set().iter().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, vec!["A"]);
    }

    #[test]
    fn test_buffer_child_absorbed_by_buffered_parent() {
        let mut buffer = CaseFileEventBuffer::default();
        buffer.add(change("A", CaseFileTransition::Update));
        buffer.add(change("A/B", CaseFileTransition::Update));
        let paths: Vec<String> = buffer.change_set().iter().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, vec!["A"]);
    }

    #[test]
    fn test_buffer_keeps_unrelated_paths() {
        let mut buffer = CaseFileEventBuffer::default();
        buffer.add(change("A", CaseFileTransition::Update));
        buffer.add(change("B/C", CaseFileTransition::Create));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_buffer_always_keeps_child_removals() {
        let mut buffer = CaseFileEventBuffer::default();
        let mut removal = change("A", CaseFileTransition::RemoveChild);
        removal.child = Some("B".to_string());
        buffer.add(removal);
        // A later parent-level event does not evict the removal.
        buffer.add(change("A", CaseFileTransition::Update));
        assert_eq!(buffer.len(), 2);
        let transitions: Vec<CaseFileTransition> =
            buffer.change_set().iter().map(|e| e.transition).collect();
        assert!(transitions.contains(&CaseFileTransition::RemoveChild));
    }

    #[test]
    fn test_buffer_same_path_latest_wins() {
        let mut buffer = CaseFileEventBuffer::default();
        buffer.add(change("A", CaseFileTransition::Create));
        buffer.add(change("A", CaseFileTransition::Update));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.change_set()[0].transition, CaseFileTransition::Update);
    }
}
