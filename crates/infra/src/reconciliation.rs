//! Stock reconciliation service.
//!
//! The only path by which stock changes: every movement goes through a store
//! commit that appends the ledger entry and moves `current_stock` with one
//! guarded increment. Low-stock signals are raised after the commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use shopfloor_auth::{Permission, Principal, authorize};
use shopfloor_core::{AggregateRoot, DomainError, UserId};
use shopfloor_events::{Delivery, EventBus, EventEnvelope};
use shopfloor_inventory::{
    INVENTORY_AGGREGATE_TYPE, InventoryEvent, InventoryRecord, MovementType, SetStockLevels,
    StockLevels,
};
use shopfloor_production::ProductionCredit;
use shopfloor_products::{ProductCatalog, ProductId};

use crate::engine::EngineError;
use crate::fanout::{NotificationFanout, low_stock_recipients};
use crate::store::{MovementWrite, ProductionStore, UnitOfWork};

/// Result of a ledger audit for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerAudit {
    pub product_id: ProductId,
    pub current_stock: i64,
    pub ledger_balance: i64,
    pub movement_count: usize,
    pub consistent: bool,
}

#[derive(Debug)]
pub struct StockReconciliationService<S, C, B> {
    store: Arc<S>,
    catalog: Arc<C>,
    fanout: NotificationFanout<B>,
    default_levels: StockLevels,
}

impl<S, C, B> Clone for StockReconciliationService<S, C, B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            catalog: Arc::clone(&self.catalog),
            fanout: self.fanout.clone(),
            default_levels: self.default_levels,
        }
    }
}

impl<S, C, B> StockReconciliationService<S, C, B>
where
    S: ProductionStore,
    C: ProductCatalog,
    B: EventBus<Delivery>,
{
    pub fn new(
        store: Arc<S>,
        catalog: Arc<C>,
        fanout: NotificationFanout<B>,
        default_levels: StockLevels,
    ) -> Self {
        Self {
            store,
            catalog,
            fanout,
            default_levels,
        }
    }

    /// Build a movement for `product_id`, resolving its department from the
    /// catalog. Unknown products are rejected.
    async fn movement(
        &self,
        product_id: ProductId,
        movement_type: MovementType,
        quantity: i64,
        reference: String,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Result<MovementWrite, EngineError> {
        if quantity <= 0 {
            return Err(DomainError::invalid_quantity(format!(
                "movement quantity must be positive (got {quantity})"
            ))
            .into());
        }
        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::ProductNotFound(product_id.to_string()))?;

        Ok(MovementWrite {
            product_id,
            department_id: Some(product.department_id),
            levels_if_new: self.default_levels,
            movement_type,
            quantity,
            reference,
            actor,
            occurred_at,
        })
    }

    /// Apply one movement atomically and return the updated record.
    pub async fn post_movement(
        &self,
        actor: &Principal,
        product_id: ProductId,
        quantity: i64,
        movement_type: MovementType,
        reference: impl Into<String>,
    ) -> Result<InventoryRecord, EngineError> {
        authorize(actor, &Permission::MOVEMENT_POST)?;
        let now = Utc::now();
        let movement = self
            .movement(
                product_id,
                movement_type,
                quantity,
                reference.into(),
                actor.principal_id,
                now,
            )
            .await?;

        let receipt = self
            .store
            .commit(UnitOfWork {
                movements: vec![movement],
                ..UnitOfWork::default()
            })
            .await?;

        let record = receipt
            .inventory
            .into_iter()
            .find(|r| r.product_id() == product_id)
            .ok_or_else(|| EngineError::Unavailable("commit returned no inventory record".into()))?;

        info!(
            product_id = %product_id,
            movement_type = %movement_type,
            quantity,
            current_stock = record.current_stock(),
            "movement posted"
        );
        self.signal_low_stock(std::slice::from_ref(&record), now);
        Ok(record)
    }

    /// `in` movements for a confirmed order, to be committed together with
    /// the order document that flips `inventory_processed`.
    pub async fn prepare_production_credit(
        &self,
        credits: &[ProductionCredit],
        actor: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<MovementWrite>, EngineError> {
        let mut movements = Vec::with_capacity(credits.len());
        for credit in credits {
            movements.push(
                self.movement(
                    credit.product_id,
                    MovementType::In,
                    credit.quantity,
                    credit.reference.clone(),
                    actor,
                    occurred_at,
                )
                .await?,
            );
        }
        Ok(movements)
    }

    pub async fn set_stock_levels(
        &self,
        actor: &Principal,
        product_id: ProductId,
        min_stock_level: i64,
        max_stock_level: i64,
    ) -> Result<InventoryRecord, EngineError> {
        authorize(actor, &Permission::STOCK_LEVELS)?;
        let levels = StockLevels::new(min_stock_level, max_stock_level)?;
        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::ProductNotFound(product_id.to_string()))?;

        let now = Utc::now();
        let record = self
            .store
            .update_stock_levels(SetStockLevels {
                product_id,
                department_id: Some(product.department_id),
                levels,
                changed_by: actor.principal_id,
                occurred_at: now,
            })
            .await?;

        info!(product_id = %product_id, min_stock_level, max_stock_level, "stock levels changed");
        self.signal_low_stock(std::slice::from_ref(&record), now);
        Ok(record)
    }

    pub async fn inventory_record(&self, product_id: ProductId) -> Result<InventoryRecord, EngineError> {
        self.store
            .load_inventory(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("inventory record for product {product_id}")).into())
    }

    pub async fn low_stock_records(&self) -> Result<Vec<InventoryRecord>, EngineError> {
        let records = self.store.list_inventory().await?;
        Ok(records.into_iter().filter(InventoryRecord::is_low_stock).collect())
    }

    /// Recompute the movement sum and compare it with the cached counter.
    pub async fn verify_ledger(&self, product_id: ProductId) -> Result<LedgerAudit, EngineError> {
        let record = self.inventory_record(product_id).await?;
        let audit = LedgerAudit {
            product_id,
            current_stock: record.current_stock(),
            ledger_balance: record.ledger_balance(),
            movement_count: record.movements().len(),
            consistent: record.is_consistent(),
        };
        if !audit.consistent {
            tracing::error!(
                product_id = %product_id,
                current_stock = audit.current_stock,
                ledger_balance = audit.ledger_balance,
                "inventory counter disagrees with its ledger"
            );
        }
        Ok(audit)
    }

    /// Fan out `inventory.stock.low` for every record at or below its minimum.
    pub fn signal_low_stock(&self, records: &[InventoryRecord], occurred_at: DateTime<Utc>) -> usize {
        let mut signalled = 0;
        for record in records {
            let Some(signal) = record.low_stock_signal(occurred_at) else {
                continue;
            };
            debug!(
                product_id = %signal.product_id,
                current_stock = signal.current_stock,
                min_stock_level = signal.min_stock_level,
                "low stock"
            );
            let recipients = low_stock_recipients(&signal);
            let envelope = EventEnvelope::wrap(
                signal.product_id.0,
                INVENTORY_AGGREGATE_TYPE,
                record.version(),
                InventoryEvent::LowStockDetected(signal),
            );
            self.fanout.publish_typed(&envelope, &recipients);
            signalled += 1;
        }
        signalled
    }
}
