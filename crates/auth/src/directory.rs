//! Worker/role directory (external collaborator seam).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shopfloor_core::{DepartmentId, UserId};

use crate::{Principal, Role};

/// A user as the directory knows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
    /// Assignment context: where the user works.
    pub department_id: Option<DepartmentId>,
    pub branch: Option<String>,
    pub active: bool,
}

impl DirectoryUser {
    pub fn new(id: UserId, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role,
            department_id: None,
            branch: None,
            active: true,
        }
    }

    pub fn in_department(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.id, vec![self.role.clone()])
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

/// `resolveUser` / `listUsersByRole`.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve_user(&self, id: UserId) -> Result<Option<DirectoryUser>, DirectoryError>;

    /// Active users holding `role`.
    async fn list_users_by_role(&self, role: &Role) -> Result<Vec<UserId>, DirectoryError>;
}

#[async_trait]
impl<D> UserDirectory for Arc<D>
where
    D: UserDirectory + ?Sized,
{
    async fn resolve_user(&self, id: UserId) -> Result<Option<DirectoryUser>, DirectoryError> {
        (**self).resolve_user(id).await
    }

    async fn list_users_by_role(&self, role: &Role) -> Result<Vec<UserId>, DirectoryError> {
        (**self).list_users_by_role(role).await
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, DirectoryUser>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: DirectoryUser) {
        if let Ok(mut users) = self.users.write() {
            users.insert(user.id, user);
        }
    }

    pub fn deactivate(&self, id: UserId) {
        if let Ok(mut users) = self.users.write() {
            if let Some(u) = users.get_mut(&id) {
                u.active = false;
            }
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn resolve_user(&self, id: UserId) -> Result<Option<DirectoryUser>, DirectoryError> {
        let users = self
            .users
            .read()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        Ok(users.get(&id).cloned())
    }

    async fn list_users_by_role(&self, role: &Role) -> Result<Vec<UserId>, DirectoryError> {
        let users = self
            .users
            .read()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        let mut ids: Vec<UserId> = users
            .values()
            .filter(|u| u.active && u.role == *role)
            .map(|u| u.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}
