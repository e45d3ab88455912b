//! Production assignment tracker.
//!
//! Keeps one [`ProductionAssignment`] per order item in step with the order
//! document. The engine asks for the upserts implied by a batch of order
//! events and writes them in the same unit of work as the order.

use std::collections::HashMap;

use shopfloor_core::{DomainError, UserId};
use shopfloor_production::{
    AssignmentStatus, OrderItemId, ProductionAssignment, ProductionOrder, ProductionOrderEvent, ProductionOrderId,
};

use crate::store::{ProductionStore, StoreError};

#[derive(Debug, Default, Clone, Copy)]
pub struct AssignmentTracker;

impl AssignmentTracker {
    pub fn new() -> Self {
        Self
    }

    /// Assignment rows to upsert for `events`, given the rows already stored
    /// for the order. Rows are returned in first-touched order.
    pub fn changes(
        &self,
        existing: &[ProductionAssignment],
        order: &ProductionOrder,
        events: &[ProductionOrderEvent],
    ) -> Result<Vec<ProductionAssignment>, DomainError> {
        let mut rows: HashMap<OrderItemId, ProductionAssignment> = existing
            .iter()
            .filter(|a| a.order_id == order.id_typed())
            .map(|a| (a.item_id, a.clone()))
            .collect();
        let mut touched: Vec<OrderItemId> = Vec::new();
        fn touch(item_id: OrderItemId, touched: &mut Vec<OrderItemId>) {
            if !touched.contains(&item_id) {
                touched.push(item_id);
            }
        }

        for event in events {
            match event {
                ProductionOrderEvent::WorkerAssigned(e) => {
                    let next = ProductionAssignment {
                        order_id: e.order_id,
                        order_number: e.order_number.clone(),
                        item_id: e.item_id,
                        worker_id: e.worker_id,
                        product_id: e.product_id,
                        quantity: e.quantity,
                        status: AssignmentStatus::Assigned,
                        assigned_by: e.assigned_by,
                        assigned_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    };
                    if let Some(current) = rows.get(&e.item_id) {
                        current.ensure_same_binding(&next)?;
                        continue;
                    }
                    rows.insert(e.item_id, next);
                    touch(e.item_id, &mut touched);
                }
                ProductionOrderEvent::ItemStatusChanged(e) => {
                    let row = rows.get_mut(&e.item_id).ok_or_else(|| {
                        DomainError::invariant(format!(
                            "item {} changed status without an assignment record",
                            e.item_id
                        ))
                    })?;
                    row.track(e.to, e.occurred_at);
                    touch(e.item_id, &mut touched);
                }
                ProductionOrderEvent::OrderCancelled(e) => {
                    for row in rows.values_mut() {
                        if row.cancel(e.occurred_at) {
                            touch(row.item_id, &mut touched);
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(touched
            .into_iter()
            .filter_map(|item_id| rows.remove(&item_id))
            .collect())
    }

    /// A worker's task list, oldest first. `open_only` hides completed and
    /// cancelled work.
    pub async fn tasks_for<S>(
        &self,
        store: &S,
        worker_id: UserId,
        open_only: bool,
    ) -> Result<Vec<ProductionAssignment>, StoreError>
    where
        S: ProductionStore + ?Sized,
    {
        let rows = store.assignments_for_worker(worker_id).await?;
        Ok(rows
            .into_iter()
            .filter(|a| !open_only || a.status.is_open())
            .collect())
    }

    pub async fn assignment<S>(
        &self,
        store: &S,
        order_id: ProductionOrderId,
        item_id: OrderItemId,
    ) -> Result<Option<ProductionAssignment>, StoreError>
    where
        S: ProductionStore + ?Sized,
    {
        store.assignment(order_id, item_id).await
    }
}
