//! Profile registry: named identities, exactly one active at a time.

use std::collections::HashMap;

use tracing::info;

use prv_core::{Profile, ProfileId};

use crate::error::{ContextError, Result};

/// What a switch request actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The requested profile was already active; nothing changed.
    AlreadyActive,
    /// The profile was activated; `created` is true on first reference.
    Activated {
        /// Whether the profile was created by this switch.
        created: bool,
    },
}

/// In-memory registry of profiles.
///
/// Callers are expected to guard this with the context's profile lock;
/// the registry itself does no synchronization.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: HashMap<ProfileId, Profile>,
    active: Option<ProfileId>,
}

impl ProfileStore {
    /// An empty registry with no active profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a profile, creating it on first reference.
    ///
    /// Idempotent: switching to the already-active profile is a no-op.
    pub fn switch(
        &mut self,
        username: &str,
        email: Option<&str>,
        user_id: Option<&str>,
        now: i64,
    ) -> SwitchOutcome {
        let id = ProfileId::new(username);
        if self.active.as_ref() == Some(&id) {
            return SwitchOutcome::AlreadyActive;
        }

        let created = !self.profiles.contains_key(&id);
        if created {
            let mut profile = Profile::new(username, now);
            if let Some(email) = email {
                profile = profile.with_email(email);
            }
            if let Some(user_id) = user_id {
                profile = profile.with_user_id(user_id);
            }
            self.profiles.insert(id.clone(), profile);
        }

        info!(profile = %id, created, "profile activated");
        self.active = Some(id);
        SwitchOutcome::Activated { created }
    }

    /// The active profile id, or `NoActiveProfile`.
    pub fn active_id(&self) -> Result<ProfileId> {
        self.active.clone().ok_or(ContextError::NoActiveProfile)
    }

    /// The active profile, if any.
    pub fn active(&self) -> Option<&Profile> {
        let id = self.active.as_ref()?;
        self.profiles.get(id)
    }

    /// All known profiles, in creation-independent id order.
    pub fn list(&self) -> Vec<Profile> {
        let mut profiles: Vec<_> = self.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        profiles
    }
}
