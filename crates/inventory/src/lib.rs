//! Inventory ledger domain module.
//!
//! One [`InventoryRecord`] per product: an append-only movement log plus the
//! cached `current_stock` projection of it. Pure domain logic (no IO, no
//! storage); stores call `handle`/`apply` inside their atomic write.

pub mod record;

pub use record::{
    InventoryCommand, InventoryEvent, InventoryRecord, LowStockDetected, Movement, MovementPosted,
    MovementType, PostMovement, RecordOpened, SetStockLevels, StockLevels, StockLevelsChanged,
    INVENTORY_AGGREGATE_TYPE,
};
