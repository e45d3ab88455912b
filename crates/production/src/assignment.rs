//! Per-item worker assignment records.
//!
//! One record per `(order_id, item_id)`, kept apart from the order document so
//! worker task lists can be read without loading orders. The worker binding
//! is fixed at creation; only the status moves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfloor_core::{DomainError, UserId};
use shopfloor_products::ProductId;

use crate::order::{OrderItemId, ProductionOrderId};
use crate::status::ItemStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    /// Assignment status mirroring an item status (pending items have none).
    pub fn mirror(item: ItemStatus) -> Option<Self> {
        match item {
            ItemStatus::Pending => None,
            ItemStatus::Assigned => Some(AssignmentStatus::Assigned),
            ItemStatus::InProgress => Some(AssignmentStatus::InProgress),
            ItemStatus::Completed => Some(AssignmentStatus::Completed),
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, AssignmentStatus::Assigned | AssignmentStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AssignmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(AssignmentStatus::Assigned),
            "in_progress" => Ok(AssignmentStatus::InProgress),
            "completed" => Ok(AssignmentStatus::Completed),
            "cancelled" => Ok(AssignmentStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown assignment status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionAssignment {
    pub order_id: ProductionOrderId,
    pub order_number: String,
    pub item_id: OrderItemId,
    pub worker_id: UserId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub status: AssignmentStatus,
    pub assigned_by: UserId,
    pub assigned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductionAssignment {
    pub fn key(&self) -> (ProductionOrderId, OrderItemId) {
        (self.order_id, self.item_id)
    }

    /// Check that an upsert of `next` over `self` keeps the worker binding.
    pub fn ensure_same_binding(&self, next: &ProductionAssignment) -> Result<(), DomainError> {
        if self.key() != next.key() {
            return Err(DomainError::invariant("assignment key mismatch"));
        }
        if self.worker_id != next.worker_id {
            return Err(DomainError::reassignment_denied(format!(
                "item {} is bound to worker {}",
                self.item_id, self.worker_id
            )));
        }
        Ok(())
    }

    /// Mirror an item status change.
    pub fn track(&mut self, item: ItemStatus, at: DateTime<Utc>) {
        if let Some(status) = AssignmentStatus::mirror(item) {
            self.status = status;
            self.updated_at = at;
        }
    }

    /// Close an open assignment because its order was cancelled.
    ///
    /// Returns `false` when the assignment was already closed.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> bool {
        if !self.status.is_open() {
            return false;
        }
        self.status = AssignmentStatus::Cancelled;
        self.updated_at = at;
        true
    }
}
