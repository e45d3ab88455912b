//! Infrastructure layer: stores, the lifecycle engine, stock reconciliation,
//! assignment tracking, event fan-out and configuration.

pub mod config;
pub mod engine;
pub mod event_bus;
pub mod fanout;
pub mod reconciliation;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod integration_tests;

pub use config::{EngineConfig, StoreConfig};
pub use engine::{CreateOrderRequest, EngineError, OrderOutcome, ProductionEngine};
pub use fanout::{Notification, NotificationFanout, Recipients};
pub use reconciliation::{LedgerAudit, StockReconciliationService};
pub use store::{
    CommitReceipt, InMemoryProductionStore, MovementWrite, OrderFilter, OrderWrite,
    PostgresProductionStore, ProductionStore, StoreError, UnitOfWork,
};
pub use tracker::AssignmentTracker;
