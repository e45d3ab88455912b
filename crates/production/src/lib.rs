//! Production orders domain module.
//!
//! The order aggregate owns its items and both state machines; assignment
//! records mirror item progress for worker task lists. Pure domain logic (no
//! IO, no storage).

pub mod assignment;
pub mod lines;
pub mod order;
pub mod status;

pub use assignment::{AssignmentStatus, ProductionAssignment};
pub use lines::{LineRequest, merge_lines};
pub use order::{
    ApproveOrder, AssignWorkers, CancelOrder, ConfirmProduction, CreateOrder, ItemAssignment,
    ItemStatusChanged, NewOrderItem, ORDER_AGGREGATE_TYPE, OrderApproved, OrderCancelled,
    OrderCreated, OrderItem, OrderItemId, OrderOrigin, OrderStatusChanged, ProductionConfirmed,
    ProductionCredit, ProductionOrder, ProductionOrderCommand, ProductionOrderEvent,
    ProductionOrderId, StatusHistoryEntry, UpdateItemStatus, WorkerAssigned, production_reference,
};
pub use status::{ItemStatus, OrderStatus, Priority};
