use std::collections::HashSet;

use thiserror::Error;

use shopfloor_core::DomainError;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(perm) => {
                DomainError::forbidden(format!("missing permission '{perm}'"))
            }
        }
    }
}

/// Default role → permission policy for the factory roles.
///
/// Workers may request orders and progress their own items; ownership of the
/// item is checked by the engine, not here.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    if *role == Role::ADMIN {
        return vec![Permission::ALL];
    }
    if *role == Role::PRODUCTION_MANAGER {
        return vec![
            Permission::ORDER_READ,
            Permission::ORDER_CREATE,
            Permission::ORDER_APPROVE,
            Permission::ORDER_ASSIGN,
            Permission::ORDER_CANCEL,
            Permission::ITEM_PROGRESS,
            Permission::PRODUCTION_CONFIRM,
            Permission::MOVEMENT_POST,
            Permission::STOCK_LEVELS,
        ];
    }
    if *role == Role::PRODUCTION_WORKER {
        return vec![
            Permission::ORDER_READ,
            Permission::ORDER_CREATE,
            Permission::ITEM_PROGRESS,
        ];
    }
    Vec::new()
}

/// Check a principal against a required permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
