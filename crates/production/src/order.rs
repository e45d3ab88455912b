use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfloor_core::{Aggregate, AggregateRoot, DomainError, UserId, typed_aggregate_id};
use shopfloor_events::Event;
use shopfloor_products::ProductId;

use crate::status::{ItemStatus, OrderStatus, Priority};

pub const ORDER_AGGREGATE_TYPE: &str = "production.order";

typed_aggregate_id!(
    /// Production order identifier.
    ProductionOrderId
);

typed_aggregate_id!(
    /// Order line identifier (stable across the item's lifetime).
    OrderItemId
);

/// Order line: product, quantity, price and production progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub status: ItemStatus,
    pub assigned_to: Option<UserId>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OrderItem {
    pub fn line_total(&self) -> u64 {
        (self.quantity.max(0) as u64).saturating_mul(self.unit_price)
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Who raised the order; decides the initial status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderOrigin {
    Manager,
    Worker,
}

impl OrderOrigin {
    pub fn initial_status(self) -> OrderStatus {
        match self {
            OrderOrigin::Manager => OrderStatus::Pending,
            OrderOrigin::Worker => OrderStatus::Requested,
        }
    }
}

/// Aggregate root: ProductionOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    id: ProductionOrderId,
    order_number: String,
    priority: Priority,
    status: OrderStatus,
    created_by: Option<UserId>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    inventory_processed: bool,
    notes: Option<String>,
    status_history: Vec<StatusHistoryEntry>,
    items: Vec<OrderItem>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl ProductionOrder {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ProductionOrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            priority: Priority::default(),
            status: OrderStatus::Pending,
            created_by: None,
            approved_by: None,
            approved_at: None,
            inventory_processed: false,
            notes: None,
            status_history: Vec::new(),
            items: Vec::new(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductionOrderId {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn inventory_processed(&self) -> bool {
        self.inventory_processed
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn total_amount(&self) -> u64 {
        self.items
            .iter()
            .map(OrderItem::line_total)
            .fold(0, u64::saturating_add)
    }

    pub fn all_items_completed(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.status == ItemStatus::Completed)
    }

    /// Status implied by the items, given the current status.
    ///
    /// Terminal and pre-approval (`requested`) orders are never moved by item
    /// progress.
    pub fn derived_status(&self) -> OrderStatus {
        if self.status.is_terminal() || self.status == OrderStatus::Requested {
            return self.status;
        }
        if self.all_items_completed() {
            return OrderStatus::Completed;
        }
        if !self.items.is_empty() && self.items.iter().all(|i| i.status >= ItemStatus::Assigned) {
            return OrderStatus::InProduction;
        }
        self.status
    }

    /// Credits the order posts into the ledger once confirmed.
    pub fn production_credits(&self) -> Vec<ProductionCredit> {
        self.items
            .iter()
            .map(|i| ProductionCredit {
                item_id: i.item_id,
                product_id: i.product_id,
                quantity: i.quantity,
                reference: production_reference(&self.order_number, i.item_id),
            })
            .collect()
    }
}

/// Ledger reference of a production credit.
pub fn production_reference(order_number: &str, item_id: OrderItemId) -> String {
    format!("production:{order_number}:{item_id}")
}

impl AggregateRoot for ProductionOrder {
    type Id = ProductionOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// A validated, merged line ready to become an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub item_id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: u64,
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: ProductionOrderId,
    pub order_number: String,
    pub priority: Priority,
    pub origin: OrderOrigin,
    pub items: Vec<NewOrderItem>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveOrder {
    pub order_id: ProductionOrderId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// One `(item, worker)` pair of an assignment batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAssignment {
    pub item_id: OrderItemId,
    pub worker_id: UserId,
}

/// Command: AssignWorkers (atomic batch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignWorkers {
    pub order_id: ProductionOrderId,
    pub assignments: Vec<ItemAssignment>,
    pub assigned_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItemStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemStatus {
    pub order_id: ProductionOrderId,
    pub item_id: OrderItemId,
    pub new_status: ItemStatus,
    pub changed_by: UserId,
    /// Managers may progress any item; others only their own.
    pub actor_is_manager: bool,
    /// Credit inventory in the same commit when this completes the order.
    pub credit_on_completion: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmProduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmProduction {
    pub order_id: ProductionOrderId,
    pub confirmed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: ProductionOrderId,
    pub reason: Option<String>,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionOrderCommand {
    CreateOrder(CreateOrder),
    ApproveOrder(ApproveOrder),
    AssignWorkers(AssignWorkers),
    UpdateItemStatus(UpdateItemStatus),
    ConfirmProduction(ConfirmProduction),
    CancelOrder(CancelOrder),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: ProductionOrderId,
    pub order_number: String,
    pub priority: Priority,
    pub status: OrderStatus,
    pub items: Vec<NewOrderItem>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub order_id: ProductionOrderId,
    pub order_number: String,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WorkerAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAssigned {
    pub order_id: ProductionOrderId,
    pub order_number: String,
    pub item_id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub worker_id: UserId,
    pub assigned_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStatusChanged {
    pub order_id: ProductionOrderId,
    pub order_number: String,
    pub item_id: OrderItemId,
    pub from: ItemStatus,
    pub to: ItemStatus,
    pub worker_id: Option<UserId>,
    pub changed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStatusChanged (derived from item progress).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: ProductionOrderId,
    pub order_number: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// One stock credit derived from a completed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionCredit {
    pub item_id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub reference: String,
}

/// Event: ProductionConfirmed (flips `inventory_processed`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionConfirmed {
    pub order_id: ProductionOrderId,
    pub order_number: String,
    pub credits: Vec<ProductionCredit>,
    pub confirmed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: ProductionOrderId,
    pub order_number: String,
    pub from: OrderStatus,
    pub reason: Option<String>,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductionOrderEvent {
    OrderCreated(OrderCreated),
    OrderApproved(OrderApproved),
    WorkerAssigned(WorkerAssigned),
    ItemStatusChanged(ItemStatusChanged),
    OrderStatusChanged(OrderStatusChanged),
    ProductionConfirmed(ProductionConfirmed),
    OrderCancelled(OrderCancelled),
}

impl ProductionOrderEvent {
    pub fn order_id(&self) -> ProductionOrderId {
        match self {
            ProductionOrderEvent::OrderCreated(e) => e.order_id,
            ProductionOrderEvent::OrderApproved(e) => e.order_id,
            ProductionOrderEvent::WorkerAssigned(e) => e.order_id,
            ProductionOrderEvent::ItemStatusChanged(e) => e.order_id,
            ProductionOrderEvent::OrderStatusChanged(e) => e.order_id,
            ProductionOrderEvent::ProductionConfirmed(e) => e.order_id,
            ProductionOrderEvent::OrderCancelled(e) => e.order_id,
        }
    }
}

impl Event for ProductionOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductionOrderEvent::OrderCreated(_) => "production.order.created",
            ProductionOrderEvent::OrderApproved(_) => "production.order.approved",
            ProductionOrderEvent::WorkerAssigned(_) => "production.item.assigned",
            ProductionOrderEvent::ItemStatusChanged(_) => "production.item.status_changed",
            ProductionOrderEvent::OrderStatusChanged(e) => match e.to {
                OrderStatus::Completed => "production.order.completed",
                _ => "production.order.status_changed",
            },
            ProductionOrderEvent::ProductionConfirmed(_) => "production.order.confirmed",
            ProductionOrderEvent::OrderCancelled(_) => "production.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductionOrderEvent::OrderCreated(e) => e.occurred_at,
            ProductionOrderEvent::OrderApproved(e) => e.occurred_at,
            ProductionOrderEvent::WorkerAssigned(e) => e.occurred_at,
            ProductionOrderEvent::ItemStatusChanged(e) => e.occurred_at,
            ProductionOrderEvent::OrderStatusChanged(e) => e.occurred_at,
            ProductionOrderEvent::ProductionConfirmed(e) => e.occurred_at,
            ProductionOrderEvent::OrderCancelled(e) => e.occurred_at,
        }
    }

    fn entity_key(&self) -> String {
        match self {
            ProductionOrderEvent::WorkerAssigned(e) => e.item_id.to_string(),
            ProductionOrderEvent::ItemStatusChanged(e) => format!("{}.{}", e.item_id, e.to),
            ProductionOrderEvent::OrderStatusChanged(e) => format!("{}.{}", e.order_id, e.to),
            other => other.order_id().to_string(),
        }
    }
}

impl Aggregate for ProductionOrder {
    type Command = ProductionOrderCommand;
    type Event = ProductionOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductionOrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.priority = e.priority;
                self.status = e.status;
                self.created_by = Some(e.created_by);
                self.notes = e.notes.clone();
                self.items = e
                    .items
                    .iter()
                    .map(|i| OrderItem {
                        item_id: i.item_id,
                        product_id: i.product_id,
                        quantity: i.quantity,
                        unit_price: i.unit_price,
                        status: ItemStatus::Pending,
                        assigned_to: None,
                        started_at: None,
                        completed_at: None,
                    })
                    .collect();
                self.status_history = vec![StatusHistoryEntry {
                    status: e.status,
                    changed_by: e.created_by,
                    changed_at: e.occurred_at,
                    notes: e.notes.clone(),
                }];
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            ProductionOrderEvent::OrderApproved(e) => {
                self.status = OrderStatus::Approved;
                self.approved_by = Some(e.approved_by);
                self.approved_at = Some(e.occurred_at);
                self.status_history.push(StatusHistoryEntry {
                    status: OrderStatus::Approved,
                    changed_by: e.approved_by,
                    changed_at: e.occurred_at,
                    notes: None,
                });
            }
            ProductionOrderEvent::WorkerAssigned(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.item_id == e.item_id) {
                    item.assigned_to = Some(e.worker_id);
                    item.status = ItemStatus::Assigned;
                }
            }
            ProductionOrderEvent::ItemStatusChanged(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.item_id == e.item_id) {
                    item.status = e.to;
                    match e.to {
                        ItemStatus::InProgress if item.started_at.is_none() => {
                            item.started_at = Some(e.occurred_at);
                        }
                        ItemStatus::Completed => item.completed_at = Some(e.occurred_at),
                        _ => {}
                    }
                }
            }
            ProductionOrderEvent::OrderStatusChanged(e) => {
                self.status = e.to;
                self.status_history.push(StatusHistoryEntry {
                    status: e.to,
                    changed_by: e.changed_by,
                    changed_at: e.occurred_at,
                    notes: e.notes.clone(),
                });
            }
            ProductionOrderEvent::ProductionConfirmed(_) => {
                self.inventory_processed = true;
            }
            ProductionOrderEvent::OrderCancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.status_history.push(StatusHistoryEntry {
                    status: OrderStatus::Cancelled,
                    changed_by: e.cancelled_by,
                    changed_at: e.occurred_at,
                    notes: e.reason.clone(),
                });
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductionOrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            ProductionOrderCommand::ApproveOrder(cmd) => self.handle_approve(cmd),
            ProductionOrderCommand::AssignWorkers(cmd) => self.handle_assign(cmd),
            ProductionOrderCommand::UpdateItemStatus(cmd) => self.handle_item_status(cmd),
            ProductionOrderCommand::ConfirmProduction(cmd) => self.handle_confirm(cmd),
            ProductionOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl ProductionOrder {
    fn ensure_exists(&self, order_id: ProductionOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("production order {order_id}")));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    /// Events that move the order to its derived status, walking legal edges.
    fn derive_status_events(
        &self,
        changed_by: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<ProductionOrderEvent>, DomainError> {
        let target = self.derived_status();
        if target == self.status {
            return Ok(Vec::new());
        }

        let mut path = Vec::with_capacity(2);
        if target == OrderStatus::Completed && self.status != OrderStatus::InProduction {
            path.push(OrderStatus::InProduction);
        }
        path.push(target);

        let mut from = self.status;
        let mut events = Vec::with_capacity(path.len());
        for to in path {
            if !from.can_transition_to(to) {
                return Err(DomainError::invariant(format!(
                    "derived order status {to} is unreachable from {from}"
                )));
            }
            events.push(ProductionOrderEvent::OrderStatusChanged(OrderStatusChanged {
                order_id: self.id,
                order_number: self.order_number.clone(),
                from,
                to,
                changed_by,
                notes: None,
                occurred_at,
            }));
            from = to;
        }
        Ok(events)
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<ProductionOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("production order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order number cannot be blank"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }

        for (idx, item) in cmd.items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "item quantity must be positive (product {}, got {})",
                    item.product_id, item.quantity
                )));
            }
            if cmd.items[..idx].iter().any(|i| i.product_id == item.product_id) {
                return Err(DomainError::invariant(format!(
                    "duplicate line for product {} must be merged",
                    item.product_id
                )));
            }
        }

        Ok(vec![ProductionOrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            order_number: cmd.order_number.trim().to_string(),
            priority: cmd.priority,
            status: cmd.origin.initial_status(),
            items: cmd.items.clone(),
            notes: cmd.notes.clone(),
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveOrder) -> Result<Vec<ProductionOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if !matches!(self.status, OrderStatus::Requested | OrderStatus::Pending) {
            return Err(DomainError::invalid_state(format!(
                "order can only be approved from requested or pending (current: {})",
                self.status
            )));
        }

        Ok(vec![ProductionOrderEvent::OrderApproved(OrderApproved {
            order_id: self.id,
            order_number: self.order_number.clone(),
            approved_by: cmd.approved_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignWorkers) -> Result<Vec<ProductionOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if !self.status.accepts_assignment() {
            return Err(DomainError::invalid_state(format!(
                "workers can only be assigned while the order is pending or approved (current: {})",
                self.status
            )));
        }
        if cmd.assignments.is_empty() {
            return Err(DomainError::validation("assignment batch cannot be empty"));
        }

        // Decide against a scratch copy so later pairs see earlier ones.
        let mut draft = self.clone();
        let mut events = Vec::new();

        for pair in &cmd.assignments {
            let item = draft
                .item(pair.item_id)
                .ok_or_else(|| DomainError::not_found(format!("order item {}", pair.item_id)))?;

            if item.status.is_started() {
                return Err(DomainError::reassignment_denied(format!(
                    "item {} is already {}",
                    item.item_id, item.status
                )));
            }
            match item.assigned_to {
                Some(current) if current == pair.worker_id => continue,
                Some(current) => {
                    return Err(DomainError::reassignment_denied(format!(
                        "item {} is already assigned to worker {current}",
                        item.item_id
                    )));
                }
                None => {}
            }

            let event = ProductionOrderEvent::WorkerAssigned(WorkerAssigned {
                order_id: self.id,
                order_number: self.order_number.clone(),
                item_id: item.item_id,
                product_id: item.product_id,
                quantity: item.quantity,
                worker_id: pair.worker_id,
                assigned_by: cmd.assigned_by,
                occurred_at: cmd.occurred_at,
            });
            draft.apply(&event);
            events.push(event);
        }

        events.extend(draft.derive_status_events(cmd.assigned_by, cmd.occurred_at)?);
        Ok(events)
    }

    fn handle_item_status(
        &self,
        cmd: &UpdateItemStatus,
    ) -> Result<Vec<ProductionOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        let item = self
            .item(cmd.item_id)
            .ok_or_else(|| DomainError::not_found(format!("order item {}", cmd.item_id)))?;

        if !cmd.actor_is_manager && item.assigned_to != Some(cmd.changed_by) {
            return Err(DomainError::forbidden(format!(
                "only the assigned worker or a manager may update item {}",
                item.item_id
            )));
        }
        if !self.status.accepts_item_progress() {
            return Err(DomainError::invalid_state(format!(
                "items cannot change while the order is {}",
                self.status
            )));
        }
        if cmd.new_status == ItemStatus::Assigned {
            return Err(DomainError::validation(
                "items are assigned through assign_workers, not a status update",
            ));
        }
        item.status.ensure_transition(cmd.new_status)?;

        let mut draft = self.clone();
        let first = ProductionOrderEvent::ItemStatusChanged(ItemStatusChanged {
            order_id: self.id,
            order_number: self.order_number.clone(),
            item_id: item.item_id,
            from: item.status,
            to: cmd.new_status,
            worker_id: item.assigned_to,
            changed_by: cmd.changed_by,
            occurred_at: cmd.occurred_at,
        });
        draft.apply(&first);

        let mut events = vec![first];
        for event in draft.derive_status_events(cmd.changed_by, cmd.occurred_at)? {
            draft.apply(&event);
            events.push(event);
        }

        if cmd.credit_on_completion
            && draft.status == OrderStatus::Completed
            && !draft.inventory_processed
        {
            events.push(draft.confirmation_event(cmd.changed_by, cmd.occurred_at));
        }

        Ok(events)
    }

    fn confirmation_event(
        &self,
        confirmed_by: UserId,
        occurred_at: DateTime<Utc>,
    ) -> ProductionOrderEvent {
        ProductionOrderEvent::ProductionConfirmed(ProductionConfirmed {
            order_id: self.id,
            order_number: self.order_number.clone(),
            credits: self.production_credits(),
            confirmed_by,
            occurred_at,
        })
    }

    fn handle_confirm(
        &self,
        cmd: &ConfirmProduction,
    ) -> Result<Vec<ProductionOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.status != OrderStatus::Completed {
            return Err(DomainError::invalid_state(
                "order must be completed to confirm production",
            ));
        }
        if self.inventory_processed {
            return Err(DomainError::already_processed(format!(
                "inventory for order {} was already credited",
                self.order_number
            )));
        }

        Ok(vec![self.confirmation_event(cmd.confirmed_by, cmd.occurred_at)])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<ProductionOrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.status.ensure_transition(OrderStatus::Cancelled)?;

        Ok(vec![ProductionOrderEvent::OrderCancelled(OrderCancelled {
            order_id: self.id,
            order_number: self.order_number.clone(),
            from: self.status,
            reason: cmd.reason.clone(),
            cancelled_by: cmd.cancelled_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}
