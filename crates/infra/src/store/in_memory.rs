use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use shopfloor_core::{AggregateRoot, DomainError, UserId, execute};
use shopfloor_inventory::{InventoryCommand, InventoryRecord, PostMovement, SetStockLevels};
use shopfloor_production::{OrderItemId, ProductionAssignment, ProductionOrder, ProductionOrderId};
use shopfloor_products::ProductId;

use super::{CommitReceipt, OrderFilter, ProductionStore, StoreError, UnitOfWork};
use crate::fanout::Notification;

#[derive(Debug, Default)]
struct State {
    orders: HashMap<ProductionOrderId, ProductionOrder>,
    order_numbers: HashMap<String, ProductionOrderId>,
    assignments: HashMap<(ProductionOrderId, OrderItemId), ProductionAssignment>,
    inventory: HashMap<ProductId, InventoryRecord>,
    notifications: Vec<Notification>,
}

/// In-memory store.
///
/// Intended for tests/dev. One write lock per commit gives the same
/// all-or-nothing visibility as a database transaction.
#[derive(Debug, Default)]
pub struct InMemoryProductionStore {
    state: RwLock<State>,
    offline: AtomicBool,
}

impl InMemoryProductionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `Unavailable` until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.ensure_online()?;
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.ensure_online()?;
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl ProductionStore for InMemoryProductionStore {
    async fn load_order(&self, id: ProductionOrderId) -> Result<Option<ProductionOrder>, StoreError> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<ProductionOrder>, StoreError> {
        let state = self.read()?;
        Ok(state
            .order_numbers
            .get(order_number)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<ProductionOrder>, StoreError> {
        let state = self.read()?;
        let mut orders: Vec<ProductionOrder> = state
            .orders
            .values()
            .filter(|o| filter.status.is_none_or(|s| o.status() == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id_typed().cmp(&a.id_typed())));
        Ok(orders)
    }

    async fn load_assignments(
        &self,
        order_id: ProductionOrderId,
    ) -> Result<Vec<ProductionAssignment>, StoreError> {
        let state = self.read()?;
        let mut rows: Vec<ProductionAssignment> = state
            .assignments
            .values()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.assigned_at, a.item_id));
        Ok(rows)
    }

    async fn assignment(
        &self,
        order_id: ProductionOrderId,
        item_id: OrderItemId,
    ) -> Result<Option<ProductionAssignment>, StoreError> {
        Ok(self.read()?.assignments.get(&(order_id, item_id)).cloned())
    }

    async fn assignments_for_worker(
        &self,
        worker_id: UserId,
    ) -> Result<Vec<ProductionAssignment>, StoreError> {
        let state = self.read()?;
        let mut rows: Vec<ProductionAssignment> = state
            .assignments
            .values()
            .filter(|a| a.worker_id == worker_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.assigned_at, a.item_id));
        Ok(rows)
    }

    async fn load_inventory(
        &self,
        product_id: ProductId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self.read()?.inventory.get(&product_id).cloned())
    }

    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let state = self.read()?;
        let mut records: Vec<InventoryRecord> = state.inventory.values().cloned().collect();
        records.sort_by_key(|r| r.product_id());
        Ok(records)
    }

    async fn update_stock_levels(
        &self,
        command: SetStockLevels,
    ) -> Result<InventoryRecord, StoreError> {
        let mut state = self.write()?;
        let mut record = state
            .inventory
            .get(&command.product_id)
            .cloned()
            .unwrap_or_else(|| InventoryRecord::empty(command.product_id));
        execute(&mut record, &InventoryCommand::SetStockLevels(command))?;
        state.inventory.insert(record.product_id(), record.clone());
        Ok(record)
    }

    async fn notifications_for(&self, recipient: UserId) -> Result<Vec<Notification>, StoreError> {
        let state = self.read()?;
        let mut rows: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn mark_notification_read(
        &self,
        recipient: UserId,
        notification_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let row = state
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.recipient_id == recipient)
            .ok_or_else(|| DomainError::not_found(format!("notification {notification_id}")))?;
        row.read = true;
        Ok(())
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        let mut state = self.write()?;

        // Stage and validate everything before touching `state`.
        if let Some(write) = &unit.order {
            let id = write.order.id_typed();
            let current = state.orders.get(&id).map(|o| o.version());
            if !write.expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "order {id}: expected {:?}, found {current:?}",
                    write.expected
                )));
            }
            if let Some(owner) = state.order_numbers.get(write.order.order_number()) {
                if *owner != id {
                    return Err(DomainError::DuplicateOrderNumber(
                        write.order.order_number().to_string(),
                    )
                    .into());
                }
            }
        }

        for next in &unit.assignments {
            if let Some(existing) = state.assignments.get(&next.key()) {
                existing.ensure_same_binding(next)?;
            }
        }

        let mut staged: HashMap<ProductId, InventoryRecord> = HashMap::new();
        for movement in &unit.movements {
            let mut record = match staged.remove(&movement.product_id) {
                Some(record) => record,
                None => state
                    .inventory
                    .get(&movement.product_id)
                    .cloned()
                    .unwrap_or_else(|| InventoryRecord::empty(movement.product_id)),
            };
            execute(
                &mut record,
                &InventoryCommand::PostMovement(PostMovement {
                    product_id: movement.product_id,
                    department_id: movement.department_id,
                    levels_if_new: movement.levels_if_new,
                    movement_type: movement.movement_type,
                    quantity: movement.quantity,
                    reference: movement.reference.clone(),
                    actor: movement.actor,
                    occurred_at: movement.occurred_at,
                }),
            )?;
            staged.insert(movement.product_id, record);
        }

        // Apply.
        let mut receipt = CommitReceipt::default();
        if let Some(write) = unit.order {
            let order = write.order;
            receipt.order_version = Some(order.version());
            state
                .order_numbers
                .insert(order.order_number().to_string(), order.id_typed());
            state.orders.insert(order.id_typed(), order);
        }
        for assignment in unit.assignments {
            state.assignments.insert(assignment.key(), assignment);
        }
        let mut touched: Vec<InventoryRecord> = staged.into_values().collect();
        touched.sort_by_key(|r| r.product_id());
        for record in &touched {
            state.inventory.insert(record.product_id(), record.clone());
        }
        receipt.inventory = touched;
        for notification in unit.notifications {
            let duplicate = state.notifications.iter().any(|n| {
                n.recipient_id == notification.recipient_id && n.event_id == notification.event_id
            });
            if !duplicate {
                state.notifications.push(notification);
            }
        }

        Ok(receipt)
    }
}
