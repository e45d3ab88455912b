//! End-to-end tests of the lifecycle engine.
//!
//! Engine → in-memory store → in-memory bus, with in-memory catalog and
//! directory collaborators.
//!
//! Verifies:
//! - order and item state machines, including the ORD-1 scenario
//! - exactly one production credit per order, also under retries
//! - the ledger invariant and the insufficient-stock guard
//! - notifications and fan-out stay consistent with committed state

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use shopfloor_auth::{DirectoryUser, InMemoryUserDirectory, Principal, Role};
use shopfloor_core::{AggregateRoot, DepartmentId, DomainError, ErrorKind, UserId};
use shopfloor_events::{Delivery, EventBus, InMemoryEventBus, Topic};
use shopfloor_inventory::{InventoryRecord, MovementType, SetStockLevels};
use shopfloor_production::{
    AssignmentStatus, ItemAssignment, ItemStatus, LineRequest, OrderItemId, OrderStatus,
    ProductionAssignment, ProductionOrder, ProductionOrderId, production_reference,
};
use shopfloor_products::{CatalogProduct, InMemoryCatalog, ProductId};

use crate::config::EngineConfig;
use crate::engine::{CreateOrderRequest, EngineError, ProductionEngine};
use crate::fanout::Notification;
use crate::store::{
    CommitReceipt, InMemoryProductionStore, OrderFilter, ProductionStore, StoreError, UnitOfWork,
};

type Engine<S> = ProductionEngine<S, InMemoryEventBus<Delivery>, InMemoryUserDirectory, InMemoryCatalog>;

struct Harness<S = InMemoryProductionStore> {
    engine: Engine<S>,
    store: Arc<S>,
    bus: Arc<InMemoryEventBus<Delivery>>,
    catalog: Arc<InMemoryCatalog>,
    directory: Arc<InMemoryUserDirectory>,
    department: DepartmentId,
    admin: Principal,
    manager: Principal,
    worker: Principal,
    other_worker: Principal,
}

fn harness() -> Harness {
    harness_with(InMemoryProductionStore::new(), EngineConfig::default())
}

fn harness_with<S: ProductionStore>(store: S, config: EngineConfig) -> Harness<S> {
    shopfloor_observability::init_for_tests();

    let store = Arc::new(store);
    let bus = Arc::new(InMemoryEventBus::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let directory = Arc::new(InMemoryUserDirectory::new());
    let department = DepartmentId::new();

    let admin = DirectoryUser::new(UserId::new(), "Ada", Role::ADMIN);
    let manager = DirectoryUser::new(UserId::new(), "Mo", Role::PRODUCTION_MANAGER);
    let worker = DirectoryUser::new(UserId::new(), "Wen", Role::PRODUCTION_WORKER).in_department(department);
    let other_worker =
        DirectoryUser::new(UserId::new(), "Ola", Role::PRODUCTION_WORKER).in_department(department);
    for user in [&admin, &manager, &worker, &other_worker] {
        directory.insert(user.clone());
    }

    let engine = ProductionEngine::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&directory),
        Arc::clone(&catalog),
        config,
    );

    Harness {
        engine,
        store,
        bus,
        catalog,
        directory,
        department,
        admin: admin.principal(),
        manager: manager.principal(),
        worker: worker.principal(),
        other_worker: other_worker.principal(),
    }
}

impl<S: ProductionStore> Harness<S> {
    fn product(&self, price: u64) -> ProductId {
        let id = ProductId::generate();
        self.catalog.insert(CatalogProduct {
            id,
            name: format!("product {id}"),
            price,
            unit: "pcs".into(),
            department_id: self.department,
        });
        id
    }

    async fn create(&self, number: &str, lines: Vec<LineRequest>) -> ProductionOrder {
        self.engine
            .create_order(&self.manager, CreateOrderRequest::new(number, lines))
            .await
            .unwrap()
            .order
    }

    async fn assign_all(&self, order: &ProductionOrder, worker: &Principal) -> ProductionOrder {
        let pairs = order
            .items()
            .iter()
            .map(|i| ItemAssignment {
                item_id: i.item_id,
                worker_id: worker.principal_id,
            })
            .collect();
        self.engine
            .assign_workers(&self.manager, order.id_typed(), pairs)
            .await
            .unwrap()
            .order
    }

    async fn finish_all(&self, order: &ProductionOrder, worker: &Principal) -> ProductionOrder {
        let mut current = order.clone();
        for item in order.items() {
            for status in [ItemStatus::InProgress, ItemStatus::Completed] {
                current = self
                    .engine
                    .update_item_status(worker, order.id_typed(), item.item_id, status)
                    .await
                    .unwrap()
                    .order;
            }
        }
        current
    }

    async fn stock(&self, product_id: ProductId) -> Option<InventoryRecord> {
        self.store.load_inventory(product_id).await.unwrap()
    }
}

fn rejected(err: EngineError) -> DomainError {
    match err {
        EngineError::Rejected(e) => e,
        other => panic!("expected a business rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_ord_1_runs_from_creation_to_single_credit() {
    let h = harness();
    let p1 = h.product(10);

    let order = h.create("ORD-1", vec![LineRequest::new(p1, 3, 10)]).await;
    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.total_amount(), 30);

    let order = h
        .engine
        .approve_order(&h.manager, order.id_typed())
        .await
        .unwrap()
        .order;
    assert_eq!(order.status(), OrderStatus::Approved);
    assert_eq!(order.approved_by(), Some(h.manager.principal_id));

    let order = h.assign_all(&order, &h.worker).await;
    assert_eq!(order.status(), OrderStatus::InProduction);

    let order = h.finish_all(&order, &h.worker).await;
    assert_eq!(order.status(), OrderStatus::Completed);
    assert!(order.all_items_completed());
    assert!(h.stock(p1).await.is_none(), "completion alone must not credit stock");

    let outcome = h
        .engine
        .confirm_production(&h.manager, order.id_typed())
        .await
        .unwrap();
    assert!(outcome.order.inventory_processed());
    assert_eq!(outcome.inventory.len(), 1);

    let record = h.stock(p1).await.unwrap();
    assert_eq!(record.current_stock(), 3);
    assert_eq!(record.movements().len(), 1);
    assert_eq!(record.movements()[0].movement_type, MovementType::In);
    assert_eq!(
        record.movements()[0].reference,
        production_reference("ORD-1", order.items()[0].item_id)
    );

    let err = h
        .engine
        .confirm_production(&h.manager, order.id_typed())
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::AlreadyProcessed(_)));

    let record = h.stock(p1).await.unwrap();
    assert_eq!(record.current_stock(), 3);
    assert_eq!(record.movements().len(), 1);
    assert!(record.is_consistent());

    let history: Vec<OrderStatus> = h
        .engine
        .get_order(&h.manager, order.id_typed())
        .await
        .unwrap()
        .status_history()
        .iter()
        .map(|e| e.status)
        .collect();
    assert_eq!(
        history,
        vec![
            OrderStatus::Pending,
            OrderStatus::Approved,
            OrderStatus::InProduction,
            OrderStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn price_mismatch_persists_nothing() {
    let h = harness();
    let p1 = h.product(10);

    let err = h
        .engine
        .create_order(&h.manager, CreateOrderRequest::new("ORD-2", vec![LineRequest::new(p1, 3, 9)]))
        .await
        .unwrap_err();

    match rejected(err) {
        DomainError::PriceMismatch {
            submitted, catalog, ..
        } => {
            assert_eq!(submitted, 9);
            assert_eq!(catalog, 10);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.store.list_orders(OrderFilter::default()).await.unwrap().is_empty());
    assert!(h.store.find_order_by_number("ORD-2").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_products_and_bad_lines_are_rejected() {
    let h = harness();
    let p1 = h.product(10);

    let err = h
        .engine
        .create_order(
            &h.manager,
            CreateOrderRequest::new("ORD-3", vec![LineRequest::new(ProductId::generate(), 1, 10)]),
        )
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::ProductNotFound(_)));

    let err = h
        .engine
        .create_order(&h.manager, CreateOrderRequest::new("ORD-3", vec![LineRequest::new(p1, 0, 10)]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .engine
        .create_order(&h.manager, CreateOrderRequest::new("  ", vec![LineRequest::new(p1, 1, 10)]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .engine
        .create_order(&h.manager, CreateOrderRequest::new("ORD-3", Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn duplicate_product_lines_are_merged() {
    let h = harness();
    let a = h.product(4);

    let order = h
        .create("ORD-4", vec![LineRequest::new(a, 2, 4), LineRequest::new(a, 3, 4)])
        .await;

    assert_eq!(order.items().len(), 1);
    assert_eq!(order.items()[0].product_id, a);
    assert_eq!(order.items()[0].quantity, 5);
    assert_eq!(order.total_amount(), 20);
}

#[tokio::test]
async fn merged_quantities_past_i64_are_rejected() {
    let h = harness();
    let a = h.product(1);

    let err = h
        .engine
        .create_order(
            &h.manager,
            CreateOrderRequest::new(
                "ORD-BIG",
                vec![LineRequest::new(a, i64::MAX, 1), LineRequest::new(a, 1, 1)],
            ),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(h.store.list_orders(OrderFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn managers_cannot_assign_through_a_status_update() {
    let h = harness();
    let p1 = h.product(10);
    let order = h.create("ORD-ASSIGN", vec![LineRequest::new(p1, 1, 10)]).await;
    let item = order.items()[0].item_id;

    let err = h
        .engine
        .update_item_status(&h.manager, order.id_typed(), item, ItemStatus::Assigned)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let stored = h.store.load_order(order.id_typed()).await.unwrap().unwrap();
    assert_eq!(stored.items()[0].status, ItemStatus::Pending);
    assert!(h.store.load_assignments(order.id_typed()).await.unwrap().is_empty());
}

#[tokio::test]
async fn order_numbers_are_unique() {
    let h = harness();
    let p1 = h.product(10);
    h.create("ORD-5", vec![LineRequest::new(p1, 1, 10)]).await;

    let err = h
        .engine
        .create_order(&h.manager, CreateOrderRequest::new("ORD-5", vec![LineRequest::new(p1, 2, 10)]))
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::DuplicateOrderNumber(_)));
    assert_eq!(h.store.list_orders(OrderFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn worker_requests_start_requested_and_need_approval() {
    let h = harness();
    let p1 = h.product(10);

    let order = h
        .engine
        .create_order(&h.worker, CreateOrderRequest::new("REQ-1", vec![LineRequest::new(p1, 1, 10)]))
        .await
        .unwrap()
        .order;
    assert_eq!(order.status(), OrderStatus::Requested);

    let err = h
        .engine
        .approve_order(&h.worker, order.id_typed())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let pair = vec![ItemAssignment {
        item_id: order.items()[0].item_id,
        worker_id: h.worker.principal_id,
    }];
    let err = h
        .engine
        .assign_workers(&h.manager, order.id_typed(), pair)
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::InvalidState(_)));

    let order = h
        .engine
        .approve_order(&h.admin, order.id_typed())
        .await
        .unwrap()
        .order;
    assert_eq!(order.status(), OrderStatus::Approved);
}

#[tokio::test]
async fn reassignment_rules_hold() {
    let h = harness();
    let p1 = h.product(10);
    let p2 = h.product(5);
    let order = h
        .create("ORD-6", vec![LineRequest::new(p1, 1, 10), LineRequest::new(p2, 1, 5)])
        .await;
    let first = order.items()[0].item_id;
    let second = order.items()[1].item_id;

    let bind = |item_id: OrderItemId, worker: &Principal| {
        vec![ItemAssignment {
            item_id,
            worker_id: worker.principal_id,
        }]
    };

    let order = h
        .engine
        .assign_workers(&h.manager, order.id_typed(), bind(first, &h.worker))
        .await
        .unwrap()
        .order;
    assert_eq!(order.status(), OrderStatus::Pending, "one item is still unassigned");

    // Same worker again: no-op, nothing committed.
    let outcome = h
        .engine
        .assign_workers(&h.manager, order.id_typed(), bind(first, &h.worker))
        .await
        .unwrap();
    assert!(outcome.events.is_empty());
    assert_eq!(outcome.order.version(), order.version());

    let err = h
        .engine
        .assign_workers(&h.manager, order.id_typed(), bind(first, &h.other_worker))
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::ReassignmentDenied(_)));

    let err = h
        .engine
        .assign_workers(&h.manager, order.id_typed(), bind(second, &h.manager))
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::WorkerNotFound(_)));

    let err = h
        .engine
        .assign_workers(&h.manager, order.id_typed(), bind(OrderItemId::generate(), &h.worker))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let order = h
        .engine
        .assign_workers(&h.manager, order.id_typed(), bind(second, &h.other_worker))
        .await
        .unwrap()
        .order;
    assert_eq!(order.status(), OrderStatus::InProduction);

    let row = h
        .engine
        .assignment(&h.manager, order.id_typed(), first)
        .await
        .unwrap();
    assert_eq!(row.worker_id, h.worker.principal_id);
    assert_eq!(row.status, AssignmentStatus::Assigned);
}

#[tokio::test]
async fn only_the_assigned_worker_or_a_manager_progresses_an_item() {
    let h = harness();
    let p1 = h.product(10);
    let order = h.create("ORD-7", vec![LineRequest::new(p1, 2, 10)]).await;
    let order = h.assign_all(&order, &h.worker).await;
    let item = order.items()[0].item_id;

    let err = h
        .engine
        .update_item_status(&h.other_worker, order.id_typed(), item, ItemStatus::InProgress)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = h
        .engine
        .update_item_status(&h.worker, order.id_typed(), item, ItemStatus::Completed)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let order = h
        .engine
        .update_item_status(&h.manager, order.id_typed(), item, ItemStatus::InProgress)
        .await
        .unwrap()
        .order;
    assert!(order.items()[0].started_at.is_some());

    let err = h
        .engine
        .update_item_status(&h.worker, order.id_typed(), item, ItemStatus::Assigned)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let tasks = h
        .engine
        .worker_tasks(&h.worker, h.worker.principal_id, true)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, AssignmentStatus::InProgress);

    let err = h
        .engine
        .worker_tasks(&h.other_worker, h.worker.principal_id, false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn confirming_an_unfinished_order_is_an_invalid_state() {
    let h = harness();
    let p1 = h.product(10);
    let order = h.create("ORD-8", vec![LineRequest::new(p1, 1, 10)]).await;

    let err = h
        .engine
        .confirm_production(&h.manager, order.id_typed())
        .await
        .unwrap_err();
    match rejected(err) {
        DomainError::InvalidState(msg) => {
            assert_eq!(msg, "order must be completed to confirm production")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_confirmations_credit_exactly_once() {
    let h = harness();
    let p1 = h.product(10);
    let order = h.create("ORD-9", vec![LineRequest::new(p1, 4, 10)]).await;
    let order = h.assign_all(&order, &h.worker).await;
    let order = h.finish_all(&order, &h.worker).await;

    let (a, b) = tokio::join!(
        h.engine.confirm_production(&h.manager, order.id_typed()),
        h.engine.confirm_production(&h.admin, order.id_typed()),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(EngineError::Rejected(DomainError::AlreadyProcessed(_)))
    )));

    let record = h.stock(p1).await.unwrap();
    assert_eq!(record.current_stock(), 4);
    assert_eq!(record.movements().len(), 1);
}

#[tokio::test]
async fn cancellation_closes_assignments_and_blocks_progress() {
    let h = harness();
    let p1 = h.product(10);
    let order = h.create("ORD-10", vec![LineRequest::new(p1, 1, 10)]).await;
    let order = h.assign_all(&order, &h.worker).await;

    let outcome = h
        .engine
        .cancel_order(&h.manager, order.id_typed(), Some("customer withdrew".into()))
        .await
        .unwrap();
    assert_eq!(outcome.order.status(), OrderStatus::Cancelled);
    assert_eq!(
        outcome.order.status_history().last().and_then(|e| e.notes.as_deref()),
        Some("customer withdrew")
    );

    let row = h
        .engine
        .assignment(&h.manager, order.id_typed(), order.items()[0].item_id)
        .await
        .unwrap();
    assert_eq!(row.status, AssignmentStatus::Cancelled);
    assert!(h
        .engine
        .worker_tasks(&h.worker, h.worker.principal_id, true)
        .await
        .unwrap()
        .is_empty());

    let err = h
        .engine
        .update_item_status(&h.worker, order.id_typed(), order.items()[0].item_id, ItemStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::InvalidState(_)));

    let err = h
        .engine
        .cancel_order(&h.manager, order.id_typed(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let cancelled = h
        .engine
        .list_orders(&h.manager, OrderFilter { status: Some(OrderStatus::Cancelled) })
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
}

#[tokio::test]
async fn durable_events_become_notifications_once_per_recipient() {
    let h = harness();
    let p1 = h.product(10);
    let order = h.create("ORD-11", vec![LineRequest::new(p1, 1, 10)]).await;
    let order = h.assign_all(&order, &h.worker).await;
    let order = h.finish_all(&order, &h.worker).await;
    h.engine
        .confirm_production(&h.manager, order.id_typed())
        .await
        .unwrap();

    let types = |rows: &[Notification]| {
        let mut t: Vec<String> = rows.iter().map(|n| n.event_type.clone()).collect();
        t.sort();
        t
    };

    let manager_rows = h.engine.notifications(&h.manager).await.unwrap();
    assert_eq!(
        types(&manager_rows),
        vec![
            "production.order.completed",
            "production.order.confirmed",
            "production.order.created",
        ]
    );
    assert_eq!(h.engine.notifications(&h.admin).await.unwrap().len(), 3);
    // Workers only hear about assignments and progress in real time.
    assert!(h.engine.notifications(&h.worker).await.unwrap().is_empty());

    let first = manager_rows[0].id;
    h.engine
        .mark_notification_read(&h.manager, first)
        .await
        .unwrap();
    let rows = h.engine.notifications(&h.manager).await.unwrap();
    assert!(rows.iter().find(|n| n.id == first).is_some_and(|n| n.read));

    let err = h
        .engine
        .mark_notification_read(&h.admin, first)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn fan_out_reaches_the_assigned_worker_with_stable_ids() {
    let h = harness();
    let sub = h.bus.subscribe();
    let p1 = h.product(10);
    let order = h.create("ORD-12", vec![LineRequest::new(p1, 1, 10)]).await;
    let order = h.assign_all(&order, &h.worker).await;

    let deliveries = sub.drain();
    let to_worker: Vec<&Delivery> = deliveries
        .iter()
        .filter(|d| d.topic == Topic::user(h.worker.principal_id))
        .collect();
    assert_eq!(to_worker.len(), 1);
    assert_eq!(to_worker[0].envelope.event_type(), "production.item.assigned");
    assert_eq!(
        to_worker[0].envelope.event_id(),
        format!("{}-production.item.assigned", order.items()[0].item_id)
    );

    let created: Vec<&Delivery> = deliveries
        .iter()
        .filter(|d| d.envelope.event_type() == "production.order.created")
        .collect();
    assert!(created.iter().any(|d| d.topic == Topic::role("production_manager")));
    assert!(created.iter().any(|d| d.topic == Topic::order_room(order.id_typed())));
}

#[tokio::test]
async fn outbound_stock_never_goes_negative() {
    let h = harness();
    let p1 = h.product(10);

    h.engine
        .post_movement(&h.manager, p1, 40, MovementType::In, "receipt:1")
        .await
        .unwrap();
    let err = h
        .engine
        .post_movement(&h.manager, p1, 100, MovementType::Out, "pick:1")
        .await
        .unwrap_err();
    match rejected(err) {
        DomainError::InsufficientStock {
            available, requested, ..
        } => {
            assert_eq!(available, 40);
            assert_eq!(requested, 100);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let record = h
        .engine
        .post_movement(&h.manager, p1, 5, MovementType::Allocated, "reserve:1")
        .await
        .unwrap();
    assert_eq!(record.current_stock(), 40);
    assert_eq!(record.movements().len(), 2);

    let audit = h.engine.verify_ledger(p1).await.unwrap();
    assert!(audit.consistent);
    assert_eq!(audit.ledger_balance, 40);

    let err = h
        .engine
        .post_movement(&h.manager, p1, 0, MovementType::In, "receipt:2")
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::InvalidQuantity(_)));

    let err = h
        .engine
        .post_movement(&h.worker, p1, 1, MovementType::In, "receipt:3")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = h
        .engine
        .post_movement(&h.manager, ProductId::generate(), 1, MovementType::In, "receipt:4")
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::ProductNotFound(_)));
}

#[tokio::test]
async fn counter_overflow_is_rejected_and_the_store_stays_usable() {
    let h = harness();
    let p1 = h.product(10);
    let p2 = h.product(10);

    h.engine
        .post_movement(&h.manager, p1, i64::MAX, MovementType::In, "receipt:max")
        .await
        .unwrap();
    let err = h
        .engine
        .post_movement(&h.manager, p1, 1, MovementType::In, "receipt:over")
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::InvalidQuantity(_)));

    let record = h.stock(p1).await.unwrap();
    assert_eq!(record.current_stock(), i64::MAX);
    assert_eq!(record.movements().len(), 1);

    let record = h
        .engine
        .post_movement(&h.manager, p2, 3, MovementType::In, "receipt:after")
        .await
        .unwrap();
    assert_eq!(record.current_stock(), 3);
    assert!(h.engine.verify_ledger(p1).await.unwrap().consistent);
}

#[tokio::test]
async fn low_stock_is_signalled_to_managers_and_department() {
    let h = harness();
    let sub = h.bus.subscribe();
    let p1 = h.product(10);

    let record = h.engine.set_stock_levels(&h.manager, p1, 5, 50).await.unwrap();
    assert_eq!(record.min_stock_level(), 5);
    assert_eq!(record.department_id(), Some(h.department));
    // An empty record is already at or below its minimum.
    assert!(sub
        .drain()
        .iter()
        .any(|d| d.envelope.event_type() == "inventory.stock.low"));

    h.engine
        .post_movement(&h.manager, p1, 3, MovementType::In, "receipt:1")
        .await
        .unwrap();

    let low: Vec<Delivery> = sub
        .drain()
        .into_iter()
        .filter(|d| d.envelope.event_type() == "inventory.stock.low")
        .collect();
    assert!(low.iter().any(|d| d.topic == Topic::role("admin")));
    assert!(low.iter().any(|d| d.topic == Topic::department_room(h.department)));
    assert_eq!(low[0].envelope.payload()["current_stock"], 3);

    let records = h.engine.low_stock_records().await.unwrap();
    assert_eq!(records.len(), 1);

    let err = h.engine.set_stock_levels(&h.manager, p1, 10, 2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn auto_credit_posts_stock_when_the_last_item_completes() {
    let config = EngineConfig {
        auto_credit_on_completion: true,
        ..EngineConfig::default()
    };
    let h = harness_with(InMemoryProductionStore::new(), config);
    let p1 = h.product(10);
    let order = h.create("ORD-13", vec![LineRequest::new(p1, 2, 10)]).await;
    let order = h.assign_all(&order, &h.worker).await;
    let order = h.finish_all(&order, &h.worker).await;

    assert_eq!(order.status(), OrderStatus::Completed);
    assert!(order.inventory_processed());
    assert_eq!(h.stock(p1).await.unwrap().current_stock(), 2);

    let err = h
        .engine
        .confirm_production(&h.manager, order.id_typed())
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::AlreadyProcessed(_)));
}

#[tokio::test]
async fn store_outages_surface_as_unavailable() {
    let h = harness();
    let p1 = h.product(10);
    let order = h.create("ORD-14", vec![LineRequest::new(p1, 1, 10)]).await;

    h.store.set_offline(true);
    let err = h
        .engine
        .approve_order(&h.manager, order.id_typed())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(err.domain().is_none());

    h.store.set_offline(false);
    let order = h.engine.get_order(&h.manager, order.id_typed()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
}

#[tokio::test]
async fn inactive_workers_cannot_be_assigned() {
    let h = harness();
    let p1 = h.product(10);
    let order = h.create("ORD-15", vec![LineRequest::new(p1, 1, 10)]).await;
    h.directory.deactivate(h.other_worker.principal_id);

    let err = h
        .engine
        .assign_workers(
            &h.manager,
            order.id_typed(),
            vec![ItemAssignment {
                item_id: order.items()[0].item_id,
                worker_id: h.other_worker.principal_id,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(rejected(err), DomainError::WorkerNotFound(_)));
}

/// Store that loses the version check a fixed number of times.
#[derive(Debug, Default)]
struct ContendedStore {
    inner: InMemoryProductionStore,
    conflicts: AtomicU32,
    commits: AtomicU32,
}

impl ContendedStore {
    fn lose_next(&self, n: u32) {
        self.conflicts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProductionStore for ContendedStore {
    async fn load_order(&self, id: ProductionOrderId) -> Result<Option<ProductionOrder>, StoreError> {
        self.inner.load_order(id).await
    }

    async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<ProductionOrder>, StoreError> {
        self.inner.find_order_by_number(order_number).await
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<ProductionOrder>, StoreError> {
        self.inner.list_orders(filter).await
    }

    async fn load_assignments(
        &self,
        order_id: ProductionOrderId,
    ) -> Result<Vec<ProductionAssignment>, StoreError> {
        self.inner.load_assignments(order_id).await
    }

    async fn assignment(
        &self,
        order_id: ProductionOrderId,
        item_id: OrderItemId,
    ) -> Result<Option<ProductionAssignment>, StoreError> {
        self.inner.assignment(order_id, item_id).await
    }

    async fn assignments_for_worker(
        &self,
        worker_id: UserId,
    ) -> Result<Vec<ProductionAssignment>, StoreError> {
        self.inner.assignments_for_worker(worker_id).await
    }

    async fn load_inventory(
        &self,
        product_id: ProductId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        self.inner.load_inventory(product_id).await
    }

    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        self.inner.list_inventory().await
    }

    async fn update_stock_levels(
        &self,
        command: SetStockLevels,
    ) -> Result<InventoryRecord, StoreError> {
        self.inner.update_stock_levels(command).await
    }

    async fn notifications_for(&self, recipient: UserId) -> Result<Vec<Notification>, StoreError> {
        self.inner.notifications_for(recipient).await
    }

    async fn mark_notification_read(
        &self,
        recipient: UserId,
        notification_id: Uuid,
    ) -> Result<(), StoreError> {
        self.inner.mark_notification_read(recipient, notification_id).await
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let lose = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lose {
            return Err(StoreError::Concurrency("simulated concurrent writer".into()));
        }
        self.inner.commit(unit).await
    }
}

#[tokio::test]
async fn lost_version_checks_are_retried_from_a_fresh_read() {
    let config = EngineConfig {
        conflict_retries: 3,
        retry_backoff_ms: 0,
        ..EngineConfig::default()
    };
    let h = harness_with(ContendedStore::default(), config);
    let p1 = h.product(10);
    let order = h.create("ORD-16", vec![LineRequest::new(p1, 1, 10)]).await;
    let before = h.store.commits.load(Ordering::SeqCst);

    h.store.lose_next(2);
    let order = h
        .engine
        .approve_order(&h.manager, order.id_typed())
        .await
        .unwrap()
        .order;
    assert_eq!(order.status(), OrderStatus::Approved);
    assert_eq!(h.store.commits.load(Ordering::SeqCst) - before, 3);

    h.store.lose_next(10);
    let err = h
        .engine
        .cancel_order(&h.manager, order.id_typed(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let stored = h.store.load_order(order.id_typed()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Approved);
}
