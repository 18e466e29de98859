//! Identity resolution for leaderboard rows.
//!
//! The engine only ever sees opaque user ids; display names come from an
//! external directory at read time.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Display metadata for a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// Read-only user lookup.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` when the user is unknown.
    async fn lookup(&self, user_id: &str) -> Result<Option<Identity>>;
}

/// In-memory user directory.
pub struct UserDirectory {
    users: DashMap<String, Identity>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }

    pub fn register(&self, user_id: impl Into<String>, username: impl Into<String>) {
        let user_id = user_id.into();
        self.users.insert(
            user_id.clone(),
            Identity {
                user_id,
                username: username.into(),
            },
        );
    }

    pub fn remove(&self, user_id: &str) -> bool {
        self.users.remove(user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityResolver for UserDirectory {
    async fn lookup(&self, user_id: &str) -> Result<Option<Identity>> {
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let dir = UserDirectory::new();
        dir.register("u1", "alice");

        let found = dir.lookup("u1").await.unwrap().unwrap();
        assert_eq!(found.username, "alice");
        assert!(dir.lookup("u2").await.unwrap().is_none());

        assert!(dir.remove("u1"));
        assert!(dir.lookup("u1").await.unwrap().is_none());
        assert!(dir.is_empty());
    }
}
