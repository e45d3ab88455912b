use serde::{Deserialize, Serialize};

use shopfloor_core::UserId;

use crate::{Permission, Role, role_permissions};

/// The actor behind a lifecycle call, resolved by the caller's auth layer.
///
/// Permissions are derived from roles at construction; explicit grants can be
/// added on top for service accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(principal_id: UserId, roles: Vec<Role>) -> Self {
        let mut permissions: Vec<Permission> = Vec::new();
        for role in &roles {
            for p in role_permissions(role) {
                if !permissions.contains(&p) {
                    permissions.push(p);
                }
            }
        }
        Self {
            principal_id,
            roles,
            permissions,
        }
    }

    pub fn admin(principal_id: UserId) -> Self {
        Self::new(principal_id, vec![Role::ADMIN])
    }

    pub fn manager(principal_id: UserId) -> Self {
        Self::new(principal_id, vec![Role::PRODUCTION_MANAGER])
    }

    pub fn worker(principal_id: UserId) -> Self {
        Self::new(principal_id, vec![Role::PRODUCTION_WORKER])
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
        self
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    pub fn is_manager(&self) -> bool {
        self.roles.iter().any(Role::is_manager)
    }

    pub fn is_worker(&self) -> bool {
        self.roles.iter().any(Role::is_worker)
    }
}
