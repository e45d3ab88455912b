use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles stay opaque strings so the directory can carry roles this crate
/// does not know about; the factory roles are provided as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const PRODUCTION_MANAGER: Role = Role(Cow::Borrowed("production_manager"));
    pub const PRODUCTION_WORKER: Role = Role(Cow::Borrowed("production_worker"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Admins and production managers run the order lifecycle.
    pub fn is_manager(&self) -> bool {
        *self == Role::ADMIN || *self == Role::PRODUCTION_MANAGER
    }

    pub fn is_worker(&self) -> bool {
        *self == Role::PRODUCTION_WORKER
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
