//! Persistence for orders, assignments, the inventory ledger and
//! notifications.
//!
//! Every state change goes through [`ProductionStore::commit`] with a
//! [`UnitOfWork`]: the order document (version-checked), assignment upserts,
//! ledger movements and durable notifications land together or not at all.
//! Implementations must validate the whole unit before making any of it
//! visible to readers.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use shopfloor_core::{DepartmentId, DomainError, ExpectedVersion, UserId};
use shopfloor_inventory::{InventoryRecord, MovementType, SetStockLevels, StockLevels};
use shopfloor_production::{
    OrderItemId, OrderStatus, ProductionAssignment, ProductionOrder, ProductionOrderId,
};
use shopfloor_products::ProductId;

use crate::fanout::Notification;

pub use in_memory::InMemoryProductionStore;
pub use postgres::PostgresProductionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A business rule enforced at write time (duplicate order number,
    /// worker rebinding, insufficient stock).
    #[error(transparent)]
    Rejected(#[from] DomainError),

    /// Stale expected version; the caller should re-read and retry.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Backend unreachable or failing; retry-safe.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be decoded.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

/// Order document to insert or replace.
#[derive(Debug, Clone)]
pub struct OrderWrite {
    pub order: ProductionOrder,
    /// Version the stored document must have (`NoStream` for inserts).
    pub expected: ExpectedVersion,
}

/// One ledger movement to apply atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementWrite {
    pub product_id: ProductId,
    /// Used only when the record does not exist yet.
    pub department_id: Option<DepartmentId>,
    pub levels_if_new: StockLevels,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    pub order: Option<OrderWrite>,
    pub assignments: Vec<ProductionAssignment>,
    pub movements: Vec<MovementWrite>,
    pub notifications: Vec<Notification>,
}

impl UnitOfWork {
    pub fn is_empty(&self) -> bool {
        self.order.is_none()
            && self.assignments.is_empty()
            && self.movements.is_empty()
            && self.notifications.is_empty()
    }
}

/// What a successful commit produced.
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    /// Stored order version after the commit.
    pub order_version: Option<u64>,
    /// Post-commit state of every inventory record a movement touched.
    pub inventory: Vec<InventoryRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

#[async_trait]
pub trait ProductionStore: Send + Sync {
    async fn load_order(&self, id: ProductionOrderId) -> Result<Option<ProductionOrder>, StoreError>;

    async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<ProductionOrder>, StoreError>;

    /// Newest first.
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<ProductionOrder>, StoreError>;

    async fn load_assignments(
        &self,
        order_id: ProductionOrderId,
    ) -> Result<Vec<ProductionAssignment>, StoreError>;

    async fn assignment(
        &self,
        order_id: ProductionOrderId,
        item_id: OrderItemId,
    ) -> Result<Option<ProductionAssignment>, StoreError>;

    /// Oldest assignment first.
    async fn assignments_for_worker(
        &self,
        worker_id: UserId,
    ) -> Result<Vec<ProductionAssignment>, StoreError>;

    async fn load_inventory(&self, product_id: ProductId)
    -> Result<Option<InventoryRecord>, StoreError>;

    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>, StoreError>;

    /// Change min/max levels, creating the record if needed.
    async fn update_stock_levels(&self, command: SetStockLevels)
    -> Result<InventoryRecord, StoreError>;

    /// Newest first.
    async fn notifications_for(&self, recipient: UserId) -> Result<Vec<Notification>, StoreError>;

    async fn mark_notification_read(
        &self,
        recipient: UserId,
        notification_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError>;
}

#[async_trait]
impl<S> ProductionStore for Arc<S>
where
    S: ProductionStore + ?Sized,
{
    async fn load_order(&self, id: ProductionOrderId) -> Result<Option<ProductionOrder>, StoreError> {
        (**self).load_order(id).await
    }

    async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<ProductionOrder>, StoreError> {
        (**self).find_order_by_number(order_number).await
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<ProductionOrder>, StoreError> {
        (**self).list_orders(filter).await
    }

    async fn load_assignments(
        &self,
        order_id: ProductionOrderId,
    ) -> Result<Vec<ProductionAssignment>, StoreError> {
        (**self).load_assignments(order_id).await
    }

    async fn assignment(
        &self,
        order_id: ProductionOrderId,
        item_id: OrderItemId,
    ) -> Result<Option<ProductionAssignment>, StoreError> {
        (**self).assignment(order_id, item_id).await
    }

    async fn assignments_for_worker(
        &self,
        worker_id: UserId,
    ) -> Result<Vec<ProductionAssignment>, StoreError> {
        (**self).assignments_for_worker(worker_id).await
    }

    async fn load_inventory(
        &self,
        product_id: ProductId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).load_inventory(product_id).await
    }

    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).list_inventory().await
    }

    async fn update_stock_levels(
        &self,
        command: SetStockLevels,
    ) -> Result<InventoryRecord, StoreError> {
        (**self).update_stock_levels(command).await
    }

    async fn notifications_for(&self, recipient: UserId) -> Result<Vec<Notification>, StoreError> {
        (**self).notifications_for(recipient).await
    }

    async fn mark_notification_read(
        &self,
        recipient: UserId,
        notification_id: Uuid,
    ) -> Result<(), StoreError> {
        (**self).mark_notification_read(recipient, notification_id).await
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        (**self).commit(unit).await
    }
}
