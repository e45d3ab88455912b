//! Order lifecycle engine.
//!
//! Every lifecycle operation follows the same pipeline:
//!
//! ```text
//! authorize
//!   ↓
//! load the order document (fresh read)
//!   ↓
//! handle the command (pure decision) and apply the events to a copy
//!   ↓
//! derive assignment upserts, credit movements and durable notifications
//!   ↓
//! commit one unit of work (version-checked)
//!   ↓
//! fan out events and low-stock signals (best-effort)
//! ```
//!
//! A commit that loses the version check is re-run from the fresh-read step
//! up to `conflict_retries` times, so a concurrent confirmation observes the
//! winner's `inventory_processed` flag and fails with `AlreadyProcessed`
//! instead of crediting twice.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use shopfloor_auth::{
    AuthzError, DirectoryError, Permission, Principal, UserDirectory, authorize,
};
use shopfloor_core::{AggregateRoot, DomainError, ErrorKind, ExpectedVersion, UserId, execute};
use shopfloor_events::{Delivery, EventBus, EventEnvelope};
use shopfloor_inventory::{InventoryRecord, MovementType};
use shopfloor_production::{
    ApproveOrder, AssignWorkers, CancelOrder, ConfirmProduction, CreateOrder, ItemAssignment,
    ItemStatus, LineRequest, NewOrderItem, ORDER_AGGREGATE_TYPE, OrderItemId, OrderOrigin,
    Priority, ProductionAssignment, ProductionOrder, ProductionOrderCommand, ProductionOrderEvent,
    ProductionOrderId, UpdateItemStatus, merge_lines,
};
use shopfloor_products::{CatalogError, ProductCatalog, ProductId};

use crate::config::EngineConfig;
use crate::fanout::{Notification, NotificationFanout, is_durable, notifications_for, order_recipients};
use crate::reconciliation::{LedgerAudit, StockReconciliationService};
use crate::store::{OrderFilter, OrderWrite, ProductionStore, StoreError, UnitOfWork};
use crate::tracker::AssignmentTracker;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Deterministic business rejection; retrying the same call fails again.
    #[error(transparent)]
    Rejected(#[from] DomainError),

    /// Infrastructure failure (store, catalog, directory); retry-safe.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Rejected(err) => err.kind(),
            EngineError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Rejected(err) => Some(err),
            EngineError::Unavailable(_) => None,
        }
    }

    fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EngineError::Rejected(err) if err.is_concurrency_conflict())
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Rejected(err) => EngineError::Rejected(err),
            StoreError::Concurrency(msg) => EngineError::Rejected(DomainError::conflict(msg)),
            StoreError::Unavailable(msg) => EngineError::Unavailable(msg),
            StoreError::Corrupt(msg) => EngineError::Unavailable(format!("corrupt stored data: {msg}")),
        }
    }
}

impl From<AuthzError> for EngineError {
    fn from(value: AuthzError) -> Self {
        EngineError::Rejected(value.into())
    }
}

impl From<CatalogError> for EngineError {
    fn from(value: CatalogError) -> Self {
        EngineError::Unavailable(value.to_string())
    }
}

impl From<DirectoryError> for EngineError {
    fn from(value: DirectoryError) -> Self {
        EngineError::Unavailable(value.to_string())
    }
}

/// Input of [`ProductionEngine::create_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderRequest {
    pub order_number: String,
    pub priority: Priority,
    pub items: Vec<LineRequest>,
    pub notes: Option<String>,
}

impl CreateOrderRequest {
    pub fn new(order_number: impl Into<String>, items: Vec<LineRequest>) -> Self {
        Self {
            order_number: order_number.into(),
            priority: Priority::default(),
            items,
            notes: None,
        }
    }
}

/// Committed state after a lifecycle operation.
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub order: ProductionOrder,
    /// Events committed by this call, in order. Empty for idempotent no-ops.
    pub events: Vec<EventEnvelope<ProductionOrderEvent>>,
    /// Inventory records moved by this call.
    pub inventory: Vec<InventoryRecord>,
}

impl OrderOutcome {
    fn unchanged(order: ProductionOrder) -> Self {
        Self {
            order,
            events: Vec::new(),
            inventory: Vec::new(),
        }
    }
}

pub struct ProductionEngine<S, B, D, C> {
    store: Arc<S>,
    directory: Arc<D>,
    fanout: NotificationFanout<B>,
    stock: StockReconciliationService<S, C, B>,
    catalog: Arc<C>,
    tracker: AssignmentTracker,
    config: EngineConfig,
}

impl<S, B, D, C> ProductionEngine<S, B, D, C>
where
    S: ProductionStore,
    B: EventBus<Delivery>,
    D: UserDirectory,
    C: ProductCatalog,
{
    pub fn new(
        store: Arc<S>,
        bus: Arc<B>,
        directory: Arc<D>,
        catalog: Arc<C>,
        config: EngineConfig,
    ) -> Self {
        let fanout = NotificationFanout::new(bus);
        let stock = StockReconciliationService::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            fanout.clone(),
            config.default_levels(),
        );
        Self {
            store,
            directory,
            fanout,
            stock,
            catalog,
            tracker: AssignmentTracker::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stock(&self) -> &StockReconciliationService<S, C, B> {
        &self.stock
    }

    pub async fn create_order(
        &self,
        actor: &Principal,
        request: CreateOrderRequest,
    ) -> Result<OrderOutcome, EngineError> {
        authorize(actor, &Permission::ORDER_CREATE)?;

        let order_number = request.order_number.trim().to_string();
        if order_number.is_empty() {
            return Err(DomainError::validation("order number cannot be blank").into());
        }
        if request.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item").into());
        }
        if let Some(line) = request.items.iter().find(|l| l.quantity <= 0) {
            return Err(DomainError::validation(format!(
                "item quantity must be positive (product {}, got {})",
                line.product_id, line.quantity
            ))
            .into());
        }

        for line in &request.items {
            let product = self
                .catalog
                .get_product(line.product_id)
                .await?
                .ok_or_else(|| DomainError::ProductNotFound(line.product_id.to_string()))?;
            if product.price != line.unit_price {
                return Err(DomainError::PriceMismatch {
                    product: line.product_id.to_string(),
                    submitted: line.unit_price,
                    catalog: product.price,
                }
                .into());
            }
        }

        let items = merge_lines(request.items)?
            .into_iter()
            .map(|line| NewOrderItem {
                item_id: OrderItemId::generate(),
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        let order_id = ProductionOrderId::generate();
        let origin = if actor.is_manager() {
            OrderOrigin::Manager
        } else {
            OrderOrigin::Worker
        };
        let command = ProductionOrderCommand::CreateOrder(CreateOrder {
            order_id,
            order_number,
            priority: request.priority,
            origin,
            items,
            notes: request.notes,
            created_by: actor.principal_id,
            occurred_at: Utc::now(),
        });

        let mut order = ProductionOrder::empty(order_id);
        let events = execute(&mut order, &command)?;
        self.commit_order(order, ExpectedVersion::NoStream, events, "create_order")
            .await
    }

    pub async fn approve_order(
        &self,
        actor: &Principal,
        order_id: ProductionOrderId,
    ) -> Result<OrderOutcome, EngineError> {
        authorize(actor, &Permission::ORDER_APPROVE)?;
        let command = ProductionOrderCommand::ApproveOrder(ApproveOrder {
            order_id,
            approved_by: actor.principal_id,
            occurred_at: Utc::now(),
        });
        self.run(order_id, command, "approve_order").await
    }

    pub async fn assign_workers(
        &self,
        actor: &Principal,
        order_id: ProductionOrderId,
        assignments: Vec<ItemAssignment>,
    ) -> Result<OrderOutcome, EngineError> {
        authorize(actor, &Permission::ORDER_ASSIGN)?;

        let order = self.load_order(order_id).await?;
        if !order.status().accepts_assignment() {
            return Err(DomainError::invalid_state(format!(
                "workers can only be assigned while the order is pending or approved (current: {})",
                order.status()
            ))
            .into());
        }
        for pair in &assignments {
            if order.item(pair.item_id).is_none() {
                return Err(DomainError::not_found(format!("order item {}", pair.item_id)).into());
            }
            self.ensure_worker(pair.worker_id).await?;
        }

        let command = ProductionOrderCommand::AssignWorkers(AssignWorkers {
            order_id,
            assignments,
            assigned_by: actor.principal_id,
            occurred_at: Utc::now(),
        });
        self.run(order_id, command, "assign_workers").await
    }

    pub async fn update_item_status(
        &self,
        actor: &Principal,
        order_id: ProductionOrderId,
        item_id: OrderItemId,
        new_status: ItemStatus,
    ) -> Result<OrderOutcome, EngineError> {
        authorize(actor, &Permission::ITEM_PROGRESS)?;
        let command = ProductionOrderCommand::UpdateItemStatus(UpdateItemStatus {
            order_id,
            item_id,
            new_status,
            changed_by: actor.principal_id,
            actor_is_manager: actor.is_manager(),
            credit_on_completion: self.config.auto_credit_on_completion,
            occurred_at: Utc::now(),
        });
        self.run(order_id, command, "update_item_status").await
    }

    pub async fn confirm_production(
        &self,
        actor: &Principal,
        order_id: ProductionOrderId,
    ) -> Result<OrderOutcome, EngineError> {
        authorize(actor, &Permission::PRODUCTION_CONFIRM)?;
        let command = ProductionOrderCommand::ConfirmProduction(ConfirmProduction {
            order_id,
            confirmed_by: actor.principal_id,
            occurred_at: Utc::now(),
        });
        self.run(order_id, command, "confirm_production").await
    }

    pub async fn cancel_order(
        &self,
        actor: &Principal,
        order_id: ProductionOrderId,
        reason: Option<String>,
    ) -> Result<OrderOutcome, EngineError> {
        authorize(actor, &Permission::ORDER_CANCEL)?;
        let command = ProductionOrderCommand::CancelOrder(CancelOrder {
            order_id,
            reason: reason.filter(|r| !r.trim().is_empty()),
            cancelled_by: actor.principal_id,
            occurred_at: Utc::now(),
        });
        self.run(order_id, command, "cancel_order").await
    }

    pub async fn get_order(
        &self,
        actor: &Principal,
        order_id: ProductionOrderId,
    ) -> Result<ProductionOrder, EngineError> {
        authorize(actor, &Permission::ORDER_READ)?;
        self.load_order(order_id).await
    }

    pub async fn get_order_by_number(
        &self,
        actor: &Principal,
        order_number: &str,
    ) -> Result<ProductionOrder, EngineError> {
        authorize(actor, &Permission::ORDER_READ)?;
        self.store
            .find_order_by_number(order_number.trim())
            .await?
            .ok_or_else(|| DomainError::not_found(format!("production order {order_number}")).into())
    }

    pub async fn list_orders(
        &self,
        actor: &Principal,
        filter: OrderFilter,
    ) -> Result<Vec<ProductionOrder>, EngineError> {
        authorize(actor, &Permission::ORDER_READ)?;
        Ok(self.store.list_orders(filter).await?)
    }

    /// A worker's task list. Workers only see their own; managers see anyone's.
    pub async fn worker_tasks(
        &self,
        actor: &Principal,
        worker_id: UserId,
        open_only: bool,
    ) -> Result<Vec<ProductionAssignment>, EngineError> {
        authorize(actor, &Permission::ORDER_READ)?;
        if actor.principal_id != worker_id && !actor.is_manager() {
            return Err(DomainError::forbidden("workers can only list their own tasks").into());
        }
        Ok(self
            .tracker
            .tasks_for(self.store.as_ref(), worker_id, open_only)
            .await?)
    }

    pub async fn assignment(
        &self,
        actor: &Principal,
        order_id: ProductionOrderId,
        item_id: OrderItemId,
    ) -> Result<ProductionAssignment, EngineError> {
        authorize(actor, &Permission::ORDER_READ)?;
        self.tracker
            .assignment(self.store.as_ref(), order_id, item_id)
            .await?
            .ok_or_else(|| {
                DomainError::not_found(format!("assignment for item {item_id} of order {order_id}")).into()
            })
    }

    /// The actor's persisted notifications, newest first.
    pub async fn notifications(&self, actor: &Principal) -> Result<Vec<Notification>, EngineError> {
        Ok(self.store.notifications_for(actor.principal_id).await?)
    }

    pub async fn mark_notification_read(
        &self,
        actor: &Principal,
        notification_id: Uuid,
    ) -> Result<(), EngineError> {
        Ok(self
            .store
            .mark_notification_read(actor.principal_id, notification_id)
            .await?)
    }

    pub async fn post_movement(
        &self,
        actor: &Principal,
        product_id: ProductId,
        quantity: i64,
        movement_type: MovementType,
        reference: impl Into<String>,
    ) -> Result<InventoryRecord, EngineError> {
        self.stock
            .post_movement(actor, product_id, quantity, movement_type, reference)
            .await
    }

    pub async fn set_stock_levels(
        &self,
        actor: &Principal,
        product_id: ProductId,
        min_stock_level: i64,
        max_stock_level: i64,
    ) -> Result<InventoryRecord, EngineError> {
        self.stock
            .set_stock_levels(actor, product_id, min_stock_level, max_stock_level)
            .await
    }

    pub async fn inventory_record(&self, product_id: ProductId) -> Result<InventoryRecord, EngineError> {
        self.stock.inventory_record(product_id).await
    }

    pub async fn low_stock_records(&self) -> Result<Vec<InventoryRecord>, EngineError> {
        self.stock.low_stock_records().await
    }

    pub async fn verify_ledger(&self, product_id: ProductId) -> Result<LedgerAudit, EngineError> {
        self.stock.verify_ledger(product_id).await
    }

    async fn load_order(&self, order_id: ProductionOrderId) -> Result<ProductionOrder, EngineError> {
        self.store
            .load_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("production order {order_id}")).into())
    }

    async fn ensure_worker(&self, worker_id: UserId) -> Result<(), EngineError> {
        match self.directory.resolve_user(worker_id).await? {
            Some(user) if user.active && user.role.is_worker() => Ok(()),
            _ => Err(DomainError::WorkerNotFound(worker_id.to_string()).into()),
        }
    }

    /// Execute `command` against the stored order, retrying on stale versions.
    async fn run(
        &self,
        order_id: ProductionOrderId,
        command: ProductionOrderCommand,
        operation: &'static str,
    ) -> Result<OrderOutcome, EngineError> {
        let mut attempt = 0;
        loop {
            match self.attempt(order_id, &command, operation).await {
                Err(err) if err.is_concurrency_conflict() && attempt < self.config.conflict_retries => {
                    attempt += 1;
                    debug!(
                        order_id = %order_id,
                        operation,
                        attempt,
                        error = %err,
                        "version conflict, retrying from a fresh read"
                    );
                    tokio::time::sleep(self.config.backoff(attempt)).await;
                }
                other => return other,
            }
        }
    }

    async fn attempt(
        &self,
        order_id: ProductionOrderId,
        command: &ProductionOrderCommand,
        operation: &'static str,
    ) -> Result<OrderOutcome, EngineError> {
        let current = self.load_order(order_id).await?;
        let expected = ExpectedVersion::Exact(current.version());

        let mut next = current.clone();
        let events = execute(&mut next, command)?;
        if events.is_empty() {
            debug!(order_id = %order_id, operation, "nothing to change");
            return Ok(OrderOutcome::unchanged(current));
        }

        self.commit_order(next, expected, events, operation).await
    }

    /// Build and commit the unit of work for `order` (already evolved by
    /// `events`), then fan out.
    async fn commit_order(
        &self,
        order: ProductionOrder,
        expected: ExpectedVersion,
        events: Vec<ProductionOrderEvent>,
        operation: &'static str,
    ) -> Result<OrderOutcome, EngineError> {
        let order_id = order.id_typed();
        let base_version = order.version().saturating_sub(events.len() as u64);

        let existing = match expected {
            ExpectedVersion::NoStream => Vec::new(),
            _ => self.store.load_assignments(order_id).await?,
        };
        let assignments = self.tracker.changes(&existing, &order, &events)?;

        let mut movements = Vec::new();
        for event in &events {
            if let ProductionOrderEvent::ProductionConfirmed(e) = event {
                movements.extend(
                    self.stock
                        .prepare_production_credit(&e.credits, e.confirmed_by, e.occurred_at)
                        .await?,
                );
            }
        }

        let envelopes: Vec<EventEnvelope<ProductionOrderEvent>> = events
            .into_iter()
            .enumerate()
            .map(|(idx, event)| {
                EventEnvelope::wrap(order_id.0, ORDER_AGGREGATE_TYPE, base_version + idx as u64 + 1, event)
            })
            .collect();

        let mut notifications = Vec::new();
        for envelope in envelopes.iter().filter(|e| is_durable(e.event_type())) {
            let users = order_recipients(envelope.payload(), &order)
                .resolve_users(self.directory.as_ref())
                .await?;
            notifications.extend(notifications_for(envelope, &users));
        }

        let receipt = self
            .store
            .commit(UnitOfWork {
                order: Some(OrderWrite {
                    order: order.clone(),
                    expected,
                }),
                assignments,
                movements,
                notifications,
            })
            .await?;

        info!(
            order_id = %order_id,
            order_number = order.order_number(),
            operation,
            status = %order.status(),
            version = receipt.order_version.unwrap_or(order.version()),
            events = envelopes.len(),
            "order committed"
        );

        for envelope in &envelopes {
            let recipients = order_recipients(envelope.payload(), &order);
            self.fanout.publish_typed(envelope, &recipients);
        }
        self.stock.signal_low_stock(&receipt.inventory, Utc::now());

        Ok(OrderOutcome {
            order,
            events: envelopes,
            inventory: receipt.inventory,
        })
    }
}
