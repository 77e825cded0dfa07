//! Resolves a user's roles from the store into a permission set.

use std::collections::BTreeSet;

use anyhow::Result;

use crate::db::Store;
use crate::models::{Permission, Role, permissions_for_roles};

/// Reads roles fresh from the store on every call, so role changes apply
/// to the next request rather than the next token.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Store,
}

impl PermissionResolver {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Union of the permissions of every role held; empty for unknown users.
    pub async fn permissions_for(&self, user_id: &str) -> Result<BTreeSet<Permission>> {
        let roles = self.roles_for(user_id).await?;
        Ok(permissions_for_roles(&roles))
    }

    /// Current roles, which may differ from a token's snapshot.
    pub async fn roles_for(&self, user_id: &str) -> Result<BTreeSet<Role>> {
        self.store.get_user_roles(user_id).await
    }

    pub async fn is_admin(&self, user_id: &str) -> Result<bool> {
        Ok(self.roles_for(user_id).await?.contains(&Role::Admin))
    }

    pub async fn has_permission(&self, user_id: &str, permission: Permission) -> Result<bool> {
        Ok(self.permissions_for(user_id).await?.contains(&permission))
    }
}
