//! Actor role resolution.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::types::Role;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("unknown actor: {0}")]
    UnknownActor(String),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Resolves the role an actor holds. Implementations sit at the edge of the
/// system (directory service, session store); the engine only sees `Role`.
#[async_trait]
pub trait RoleProvider: Send + Sync {
    async fn actor_role(&self, actor_id: &str) -> Result<Role, IdentityError>;
}

/// A fixed actor table, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticRoleProvider {
    roles: HashMap<String, Role>,
}

impl StaticRoleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>, role: Role) -> Self {
        self.roles.insert(actor_id.into(), role);
        self
    }

    pub fn insert(&mut self, actor_id: impl Into<String>, role: Role) -> Option<Role> {
        self.roles.insert(actor_id.into(), role)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl FromIterator<(String, Role)> for StaticRoleProvider {
    fn from_iter<I: IntoIterator<Item = (String, Role)>>(iter: I) -> Self {
        Self {
            roles: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RoleProvider for StaticRoleProvider {
    async fn actor_role(&self, actor_id: &str) -> Result<Role, IdentityError> {
        self.roles
            .get(actor_id)
            .copied()
            .ok_or_else(|| IdentityError::UnknownActor(actor_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_resolves_known_actors() {
        let provider = StaticRoleProvider::new()
            .with_actor("alice", Role::Manager)
            .with_actor("bob", Role::Approver);
        assert_eq!(provider.actor_role("bob").await, Ok(Role::Approver));
        assert_eq!(
            provider.actor_role("mallory").await,
            Err(IdentityError::UnknownActor("mallory".to_string()))
        );
    }
}
