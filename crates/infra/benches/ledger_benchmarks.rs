use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::Utc;
use shopfloor_auth::{DirectoryUser, InMemoryUserDirectory, Principal, Role};
use shopfloor_core::{DepartmentId, UserId, execute};
use shopfloor_events::{Delivery, InMemoryEventBus};
use shopfloor_infra::{CreateOrderRequest, EngineConfig, InMemoryProductionStore, ProductionEngine};
use shopfloor_inventory::{InventoryCommand, InventoryRecord, MovementType, PostMovement, StockLevels};
use shopfloor_production::{ItemAssignment, ItemStatus, LineRequest};
use shopfloor_products::{CatalogProduct, InMemoryCatalog, ProductId};
use tokio::runtime::Runtime;

type Engine =
    ProductionEngine<InMemoryProductionStore, InMemoryEventBus<Delivery>, InMemoryUserDirectory, InMemoryCatalog>;

struct Setup {
    engine: Engine,
    manager: Principal,
    worker: Principal,
    product: ProductId,
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn setup() -> Setup {
    let directory = Arc::new(InMemoryUserDirectory::new());
    let manager = DirectoryUser::new(UserId::new(), "manager", Role::PRODUCTION_MANAGER);
    let worker = DirectoryUser::new(UserId::new(), "worker", Role::PRODUCTION_WORKER);
    directory.insert(manager.clone());
    directory.insert(worker.clone());

    let catalog = Arc::new(InMemoryCatalog::new());
    let product = ProductId::generate();
    catalog.insert(CatalogProduct {
        id: product,
        name: "widget".into(),
        price: 10,
        unit: "pcs".into(),
        department_id: DepartmentId::new(),
    });

    let engine = ProductionEngine::new(
        Arc::new(InMemoryProductionStore::new()),
        Arc::new(InMemoryEventBus::new()),
        directory,
        catalog,
        EngineConfig::default(),
    );

    Setup {
        engine,
        manager: manager.principal(),
        worker: worker.principal(),
        product,
    }
}

fn bench_movement_posting(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("movement_posting");
    group.throughput(Throughput::Elements(1));

    for history in [0usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(history), history, |b, &history| {
            let s = setup();
            rt.block_on(async {
                for i in 0..history {
                    s.engine
                        .post_movement(&s.manager, s.product, 1, MovementType::In, format!("seed:{i}"))
                        .await
                        .unwrap();
                }
            });

            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                let record = rt
                    .block_on(s.engine.post_movement(
                        &s.manager,
                        s.product,
                        1,
                        MovementType::In,
                        format!("bench:{n}"),
                    ))
                    .unwrap();
                black_box(record.current_stock());
            });
        });
    }

    group.finish();
}

fn bench_ledger_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_replay");

    for count in [10usize, 100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let product_id = ProductId::generate();
            let actor = UserId::new();
            let now = Utc::now();
            let commands: Vec<InventoryCommand> = (0..count)
                .map(|i| {
                    let movement_type = if i % 3 == 2 { MovementType::Out } else { MovementType::In };
                    InventoryCommand::PostMovement(PostMovement {
                        product_id,
                        department_id: None,
                        levels_if_new: StockLevels::default(),
                        movement_type,
                        quantity: 1,
                        reference: format!("replay:{i}"),
                        actor,
                        occurred_at: now,
                    })
                })
                .collect();

            b.iter(|| {
                let mut record = InventoryRecord::empty(product_id);
                for command in &commands {
                    execute(&mut record, command).unwrap();
                }
                black_box(record.is_consistent());
            });
        });
    }

    group.finish();
}

fn bench_order_lifecycle(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("order_lifecycle");
    group.sample_size(200);

    group.bench_function("create_assign_complete_confirm", |b| {
        let s = setup();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            rt.block_on(async {
                let order = s
                    .engine
                    .create_order(
                        &s.manager,
                        CreateOrderRequest::new(format!("BENCH-{n}"), vec![LineRequest::new(s.product, 3, 10)]),
                    )
                    .await
                    .unwrap()
                    .order;
                let item = order.items()[0].item_id;
                s.engine
                    .assign_workers(
                        &s.manager,
                        order.id_typed(),
                        vec![ItemAssignment {
                            item_id: item,
                            worker_id: s.worker.principal_id,
                        }],
                    )
                    .await
                    .unwrap();
                for status in [ItemStatus::InProgress, ItemStatus::Completed] {
                    s.engine
                        .update_item_status(&s.worker, order.id_typed(), item, status)
                        .await
                        .unwrap();
                }
                let outcome = s
                    .engine
                    .confirm_production(&s.manager, order.id_typed())
                    .await
                    .unwrap();
                black_box(outcome.inventory.len());
            });
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_movement_posting,
    bench_ledger_replay,
    bench_order_lifecycle
);
criterion_main!(benches);
