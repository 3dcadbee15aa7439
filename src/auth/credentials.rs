//! Credential storage and management
//!
//! Handles user credential storage and validation.

use std::collections::HashMap;

use crate::config::UserEntry;

/// Source of truth for which users exist and what their passwords are.
pub trait CredentialStore: Send + Sync {
    fn user_exists(&self, name: &str) -> bool;

    fn verify_credentials(&self, name: &str, password: &str) -> bool;
}

/// Credential store backed by a map, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentials {
    users: HashMap<String, String>,
}

impl MemoryCredentials {
    pub fn from_users(users: &[UserEntry]) -> Self {
        let users = users
            .iter()
            .map(|u| (u.name.clone(), u.password.clone()))
            .collect();
        Self { users }
    }

    /// Adds or replaces a user.
    pub fn insert(&mut self, name: impl Into<String>, password: impl Into<String>) {
        self.users.insert(name.into(), password.into());
    }
}

impl CredentialStore for MemoryCredentials {
    fn user_exists(&self, name: &str) -> bool {
        self.users.contains_key(name)
    }

    fn verify_credentials(&self, name: &str, password: &str) -> bool {
        self.users.get(name).is_some_and(|expected| expected == password)
    }
}
