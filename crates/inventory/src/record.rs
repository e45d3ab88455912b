use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfloor_core::{Aggregate, AggregateRoot, DepartmentId, DomainError, UserId};
use shopfloor_events::Event;
use shopfloor_products::ProductId;

pub const INVENTORY_AGGREGATE_TYPE: &str = "inventory.record";

/// Kind of ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Stock received (production credit, purchase, return).
    In,
    /// Stock issued; never below zero.
    Out,
    /// Soft reservation: recorded, counter untouched.
    Allocated,
}

impl MovementType {
    /// Contribution of a movement of `quantity` to `current_stock`.
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            MovementType::In => quantity,
            MovementType::Out => -quantity,
            MovementType::Allocated => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Allocated => "allocated",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(MovementType::In),
            "out" => Ok(MovementType::Out),
            "allocated" => Ok(MovementType::Allocated),
            other => Err(DomainError::validation(format!(
                "unknown movement type '{other}' (expected in, out or allocated)"
            ))),
        }
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    pub fn signed_quantity(&self) -> i64 {
        self.movement_type.signed(self.quantity)
    }
}

/// Low/high watermarks for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub min_stock_level: i64,
    pub max_stock_level: i64,
}

impl StockLevels {
    pub fn new(min_stock_level: i64, max_stock_level: i64) -> Result<Self, DomainError> {
        let levels = Self {
            min_stock_level,
            max_stock_level,
        };
        levels.validate()?;
        Ok(levels)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.min_stock_level < 0 {
            return Err(DomainError::validation("min_stock_level cannot be negative"));
        }
        if self.max_stock_level < self.min_stock_level {
            return Err(DomainError::validation(
                "max_stock_level must be greater than or equal to min_stock_level",
            ));
        }
        Ok(())
    }
}

impl Default for StockLevels {
    fn default() -> Self {
        Self {
            min_stock_level: 0,
            max_stock_level: 1000,
        }
    }
}

/// Aggregate root: InventoryRecord (one per product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    product_id: ProductId,
    department_id: Option<DepartmentId>,
    current_stock: i64,
    levels: StockLevels,
    movements: Vec<Movement>,
    version: u64,
    created: bool,
}

impl InventoryRecord {
    /// Create an empty, not-yet-opened record.
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            department_id: None,
            current_stock: 0,
            levels: StockLevels::default(),
            movements: Vec::new(),
            version: 0,
            created: false,
        }
    }

    /// Rebuild a record from persisted columns (stores only).
    pub fn from_parts(
        product_id: ProductId,
        department_id: Option<DepartmentId>,
        current_stock: i64,
        levels: StockLevels,
        movements: Vec<Movement>,
        version: u64,
    ) -> Self {
        Self {
            product_id,
            department_id,
            current_stock,
            levels,
            movements,
            version,
            created: true,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn levels(&self) -> StockLevels {
        self.levels
    }

    pub fn min_stock_level(&self) -> i64 {
        self.levels.min_stock_level
    }

    pub fn max_stock_level(&self) -> i64 {
        self.levels.max_stock_level
    }

    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Sum of signed movements: the authoritative stock figure.
    pub fn ledger_balance(&self) -> i64 {
        self.movements.iter().map(Movement::signed_quantity).sum()
    }

    /// The cached counter agrees with the movement log.
    pub fn is_consistent(&self) -> bool {
        self.current_stock == self.ledger_balance()
    }

    pub fn is_low_stock(&self) -> bool {
        self.created && self.current_stock <= self.levels.min_stock_level
    }

    /// Advisory signal; repeating it is harmless and it is never applied.
    pub fn low_stock_signal(&self, occurred_at: DateTime<Utc>) -> Option<LowStockDetected> {
        if !self.is_low_stock() {
            return None;
        }
        Some(LowStockDetected {
            product_id: self.product_id,
            department_id: self.department_id,
            current_stock: self.current_stock,
            min_stock_level: self.levels.min_stock_level,
            sequence: self.movements.len() as u64,
            occurred_at,
        })
    }
}

impl AggregateRoot for InventoryRecord {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PostMovement.
///
/// Carries what is needed to open the record lazily on first movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMovement {
    pub product_id: ProductId,
    pub department_id: Option<DepartmentId>,
    pub levels_if_new: StockLevels,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reference: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetStockLevels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStockLevels {
    pub product_id: ProductId,
    pub department_id: Option<DepartmentId>,
    pub levels: StockLevels,
    pub changed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    PostMovement(PostMovement),
    SetStockLevels(SetStockLevels),
}

/// Event: RecordOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOpened {
    pub product_id: ProductId,
    pub department_id: Option<DepartmentId>,
    pub levels: StockLevels,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovementPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPosted {
    pub product_id: ProductId,
    pub movement: Movement,
    /// Position of the movement in the ledger (1-based).
    pub sequence: u64,
    pub stock_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockLevelsChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevelsChanged {
    pub product_id: ProductId,
    pub levels: StockLevels,
    pub changed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Signal: LowStockDetected (not state; never applied).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockDetected {
    pub product_id: ProductId,
    pub department_id: Option<DepartmentId>,
    pub current_stock: i64,
    pub min_stock_level: i64,
    /// Ledger length when the signal was raised.
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryEvent {
    RecordOpened(RecordOpened),
    MovementPosted(MovementPosted),
    StockLevelsChanged(StockLevelsChanged),
    LowStockDetected(LowStockDetected),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::RecordOpened(_) => "inventory.record.opened",
            InventoryEvent::MovementPosted(_) => "inventory.movement.posted",
            InventoryEvent::StockLevelsChanged(_) => "inventory.levels.changed",
            InventoryEvent::LowStockDetected(_) => "inventory.stock.low",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::RecordOpened(e) => e.occurred_at,
            InventoryEvent::MovementPosted(e) => e.occurred_at,
            InventoryEvent::StockLevelsChanged(e) => e.occurred_at,
            InventoryEvent::LowStockDetected(e) => e.occurred_at,
        }
    }

    fn entity_key(&self) -> String {
        match self {
            InventoryEvent::RecordOpened(e) => e.product_id.to_string(),
            InventoryEvent::MovementPosted(e) => format!("{}.{}", e.product_id, e.sequence),
            InventoryEvent::StockLevelsChanged(e) => {
                format!("{}.{}", e.product_id, e.occurred_at.timestamp_micros())
            }
            InventoryEvent::LowStockDetected(e) => format!("{}.{}", e.product_id, e.sequence),
        }
    }
}

impl Aggregate for InventoryRecord {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::RecordOpened(e) => {
                self.product_id = e.product_id;
                self.department_id = e.department_id;
                self.levels = e.levels;
                self.current_stock = 0;
                self.created = true;
            }
            InventoryEvent::MovementPosted(e) => {
                self.current_stock = e.stock_after;
                self.movements.push(e.movement.clone());
            }
            InventoryEvent::StockLevelsChanged(e) => {
                self.levels = e.levels;
            }
            InventoryEvent::LowStockDetected(_) => return,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::PostMovement(cmd) => self.handle_post(cmd),
            InventoryCommand::SetStockLevels(cmd) => self.handle_set_levels(cmd),
        }
    }
}

impl InventoryRecord {
    fn ensure_product(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.product_id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn open_event(
        &self,
        department_id: Option<DepartmentId>,
        levels: StockLevels,
        occurred_at: DateTime<Utc>,
    ) -> Option<InventoryEvent> {
        if self.created {
            return None;
        }
        Some(InventoryEvent::RecordOpened(RecordOpened {
            product_id: self.product_id,
            department_id,
            levels,
            occurred_at,
        }))
    }

    fn handle_post(&self, cmd: &PostMovement) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_product(cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::invalid_quantity(format!(
                "movement quantity must be positive (got {})",
                cmd.quantity
            )));
        }
        if cmd.reference.trim().is_empty() {
            return Err(DomainError::validation("movement reference cannot be empty"));
        }

        let current = if self.created { self.current_stock } else { 0 };
        if cmd.movement_type == MovementType::Out && current < cmd.quantity {
            return Err(DomainError::InsufficientStock {
                product: cmd.product_id.to_string(),
                available: current,
                requested: cmd.quantity,
            });
        }

        let stock_after = current
            .checked_add(cmd.movement_type.signed(cmd.quantity))
            .ok_or_else(|| {
                DomainError::invalid_quantity(format!(
                    "movement of {} would overflow the stock counter (current {current})",
                    cmd.quantity
                ))
            })?;

        let mut events = Vec::with_capacity(2);
        if let Some(open) = self.open_event(cmd.department_id, cmd.levels_if_new, cmd.occurred_at) {
            events.push(open);
        }

        events.push(InventoryEvent::MovementPosted(MovementPosted {
            product_id: cmd.product_id,
            movement: Movement {
                movement_type: cmd.movement_type,
                quantity: cmd.quantity,
                reference: cmd.reference.clone(),
                created_by: cmd.actor,
                created_at: cmd.occurred_at,
            },
            sequence: self.movements.len() as u64 + 1,
            stock_after,
            occurred_at: cmd.occurred_at,
        }));

        Ok(events)
    }

    fn handle_set_levels(&self, cmd: &SetStockLevels) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_product(cmd.product_id)?;
        cmd.levels.validate()?;

        let mut events = Vec::with_capacity(2);
        if let Some(open) = self.open_event(cmd.department_id, cmd.levels, cmd.occurred_at) {
            events.push(open);
        }
        events.push(InventoryEvent::StockLevelsChanged(StockLevelsChanged {
            product_id: cmd.product_id,
            levels: cmd.levels,
            changed_by: cmd.changed_by,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }
}
