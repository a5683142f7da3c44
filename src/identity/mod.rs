use serde::{Deserialize, Serialize};

use crate::actormodel::failure::ModelError;

// ============================================================================
// User Identity & Membership
// ============================================================================
//
// Opaque identity records attached to every command and event, used for
// authorization checks and audit trails. Construction is fail-fast: an
// identity without an id is rejected before a command is ever built.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Where the identity was established (IDP, platform, test harness).
    #[serde(default)]
    pub origin: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Result<Self, ModelError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ModelError::invalid_command("User id must not be empty"));
        }
        Ok(Self {
            id,
            roles: Vec::new(),
            origin: None,
        })
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Re-validates an identity that crossed a serialization boundary.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.id.trim().is_empty() {
            return Err(ModelError::invalid_command("User id must not be empty"));
        }
        Ok(())
    }
}

/// Membership record used by tenants and consent groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub owner: bool,
}

impl Member {
    pub fn new(user_id: impl Into<String>, owner: bool) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
            owner,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_requires_id() {
        assert!(UserIdentity::new("alice").is_ok());
        assert!(UserIdentity::new("").is_err());
        assert!(UserIdentity::new("   ").is_err());
    }

    #[test]
    fn test_roles() {
        let user = UserIdentity::new("alice")
            .unwrap()
            .with_roles(["Admin", "Clerk"]);
        assert!(user.has_role("Admin"));
        assert!(!user.has_role("Owner"));
    }

    #[test]
    fn test_identity_serialization() {
        let user = UserIdentity::new("alice").unwrap().with_roles(["Admin"]);
        let json = serde_json::to_string(&user).unwrap();
        let back: UserIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(user, back);
    }
}
