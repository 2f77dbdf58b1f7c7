/// Per-request actor identity
use crate::{
    access::{RoleName, RolePermissionRegistry},
    error::{IpamError, IpamResult},
    users::{UserStatus, UserWithRoles},
};
use serde::Serialize;
use std::collections::BTreeSet;

/// Originating client metadata recorded on audit entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Resolved identity of an authenticated requester
#[derive(Debug, Clone, Serialize)]
pub struct ActorContext {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub roles: Vec<RoleName>,
    pub permissions: BTreeSet<String>,
    #[serde(skip)]
    pub session_id: Option<String>,
    #[serde(skip)]
    pub client: ClientMeta,
}

impl ActorContext {
    /// Resolve roles and effective permissions for an active user
    pub async fn resolve(
        registry: &RolePermissionRegistry,
        user: UserWithRoles,
        session_id: Option<String>,
        client: ClientMeta,
    ) -> IpamResult<Self> {
        if user.user.status != UserStatus::Active {
            return Err(IpamError::Unauthenticated);
        }

        let permissions = registry.effective_permissions(&user.roles).await?;

        Ok(ActorContext {
            user_id: user.user.id,
            name: user.user.name,
            email: user.user.email,
            roles: user.roles,
            permissions,
            session_id,
            client,
        })
    }

    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[RoleName]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        permissions.iter().any(|p| self.has_permission(p))
    }

    /// Holds Developer or Super-Admin
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(RoleName::is_admin)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Actor with the given roles and permissions, no database needed
    pub fn actor(user_id: i64, roles: &[RoleName], permissions: &[&str]) -> ActorContext {
        ActorContext {
            user_id,
            name: format!("user-{}", user_id),
            email: format!("user{}@example.com", user_id),
            roles: roles.to_vec(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            session_id: None,
            client: ClientMeta::default(),
        }
    }
}
