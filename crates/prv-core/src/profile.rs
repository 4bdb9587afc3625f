//! User profiles.
//!
//! A profile is a named identity. Exactly one profile is active per context;
//! every ledger and protocol operation runs against the active one.

use serde::{Deserialize, Serialize};

use crate::ids::ProfileId;

/// A named user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Username; also serves as the profile identifier.
    pub username: String,
    /// Optional email address.
    pub email: Option<String>,
    /// Optional external user id.
    pub user_id: Option<String>,
    /// When the profile was created (epoch seconds).
    pub created_at: i64,
}

impl Profile {
    /// Create a profile.
    pub fn new(username: impl Into<String>, now: i64) -> Self {
        Self {
            username: username.into(),
            email: None,
            user_id: None,
            created_at: now,
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the external user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// The profile's identifier.
    pub fn id(&self) -> ProfileId {
        ProfileId::new(self.username.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_id_is_username() {
        let profile = Profile::new("alice", 100).with_email("alice@example.org");
        assert_eq!(profile.id().as_str(), "alice");
        assert_eq!(profile.email.as_deref(), Some("alice@example.org"));
        assert!(profile.user_id.is_none());
    }
}
