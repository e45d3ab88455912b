use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "production.order.approve"). The
/// wildcard `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ALL: Permission = Permission(Cow::Borrowed("*"));
    pub const ORDER_READ: Permission = Permission(Cow::Borrowed("production.order.read"));
    pub const ORDER_CREATE: Permission = Permission(Cow::Borrowed("production.order.create"));
    pub const ORDER_APPROVE: Permission = Permission(Cow::Borrowed("production.order.approve"));
    pub const ORDER_ASSIGN: Permission = Permission(Cow::Borrowed("production.order.assign"));
    pub const ORDER_CANCEL: Permission = Permission(Cow::Borrowed("production.order.cancel"));
    pub const ITEM_PROGRESS: Permission = Permission(Cow::Borrowed("production.item.progress"));
    pub const PRODUCTION_CONFIRM: Permission =
        Permission(Cow::Borrowed("production.order.confirm"));
    pub const MOVEMENT_POST: Permission = Permission(Cow::Borrowed("inventory.movement.post"));
    pub const STOCK_LEVELS: Permission = Permission(Cow::Borrowed("inventory.levels.configure"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
