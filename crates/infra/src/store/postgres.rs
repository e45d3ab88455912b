//! Postgres-backed production store.
//!
//! One transaction per [`UnitOfWork`]. Atomicity and concurrency are enforced
//! by the database:
//!
//! - the order row is locked with `FOR UPDATE`, its version compared with the
//!   expectation, and updated with `WHERE version = $expected`;
//! - `order_number` and `(order_id, item_id)` are unique;
//! - stock moves only through one guarded statement,
//!   `UPDATE ... SET current_stock = current_stock + $delta WHERE current_stock + $delta >= 0`,
//!   backed by a `CHECK (current_stock >= 0)`;
//! - notifications are unique on `(recipient_id, event_id)` and inserted with
//!   `ON CONFLICT DO NOTHING`.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | StoreError |
//! |------------|---------------|------------|
//! | unique violation on `order_number` | `23505` | `Rejected(DuplicateOrderNumber)` |
//! | other unique violation | `23505` | `Concurrency` |
//! | check violation | `23514` | `Rejected(InvariantViolation)` |
//! | decode failures | n/a | `Corrupt` |
//! | anything else | any | `Unavailable` |

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgConnection, PgPool, Row};
use tracing::{Span, info, instrument};
use uuid::Uuid;

use shopfloor_core::{AggregateId, AggregateRoot, DepartmentId, DomainError, UserId};
use shopfloor_inventory::{InventoryRecord, Movement, MovementType, SetStockLevels, StockLevels};
use shopfloor_production::{
    AssignmentStatus, OrderItemId, ProductionAssignment, ProductionOrder, ProductionOrderId,
};
use shopfloor_products::ProductId;

use super::{
    CommitReceipt, MovementWrite, OrderFilter, OrderWrite, ProductionStore, StoreError, UnitOfWork,
};
use crate::config::StoreConfig;
use crate::fanout::Notification;

const MIGRATION: &str = include_str!("../../migrations/0001_init.sql");
const ORDER_NUMBER_CONSTRAINT: &str = "production_orders_order_number_key";

#[derive(Debug, Clone)]
pub struct PostgresProductionStore {
    pool: Arc<PgPool>,
}

impl PostgresProductionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a connection pool.
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database_url)
            .await
            .context("failed to connect to postgres")?;
        info!(max_connections = config.max_connections, "connected to postgres");
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema. Idempotent.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .context("failed to apply schema migration")?;
        Ok(())
    }

    #[instrument(
        skip(self, unit),
        fields(
            order_id = tracing::field::Empty,
            assignments = unit.assignments.len(),
            movements = unit.movements.len(),
            notifications = unit.notifications.len(),
            inserted_notifications = tracing::field::Empty
        ),
        err
    )]
    pub async fn commit_unit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        let span = Span::current();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut receipt = CommitReceipt::default();

        if let Some(write) = &unit.order {
            span.record("order_id", tracing::field::display(write.order.id_typed()));
            receipt.order_version = Some(write_order(&mut tx, write).await?);
        }

        for assignment in &unit.assignments {
            upsert_assignment(&mut tx, assignment).await?;
        }

        let mut touched: Vec<ProductId> = Vec::new();
        for movement in &unit.movements {
            apply_movement(&mut tx, movement).await?;
            if !touched.contains(&movement.product_id) {
                touched.push(movement.product_id);
            }
        }

        let mut inserted = 0u64;
        for notification in &unit.notifications {
            inserted += insert_notification(&mut tx, notification).await?;
        }
        span.record("inserted_notifications", inserted);

        touched.sort();
        for product_id in touched {
            if let Some(record) = fetch_inventory(&mut tx, product_id).await? {
                receipt.inventory.push(record);
            }
        }

        // Dropping `tx` on any early return above rolls everything back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(receipt)
    }

    #[instrument(skip(self, command), fields(product_id = %command.product_id), err)]
    pub async fn set_levels(&self, command: SetStockLevels) -> Result<InventoryRecord, StoreError> {
        command.levels.validate()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO inventory_records (
                product_id, department_id, current_stock, min_stock_level, max_stock_level, version
            )
            VALUES ($1, $2, 0, $3, $4, 1)
            ON CONFLICT (product_id) DO UPDATE SET
                department_id = COALESCE(inventory_records.department_id, EXCLUDED.department_id),
                min_stock_level = EXCLUDED.min_stock_level,
                max_stock_level = EXCLUDED.max_stock_level,
                version = inventory_records.version + 1
            "#,
        )
        .bind(*command.product_id.as_uuid())
        .bind(command.department_id.map(Uuid::from))
        .bind(command.levels.min_stock_level)
        .bind(command.levels.max_stock_level)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_stock_levels", e))?;

        let record = fetch_inventory(&mut tx, command.product_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt("inventory record vanished after upsert".into()))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(record)
    }

    async fn fetch_assignments(
        &self,
        operation: &str,
        sql: &'static str,
        key: Uuid,
    ) -> Result<Vec<ProductionAssignment>, StoreError> {
        let rows = sqlx::query(sql)
            .bind(key)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(assignment_from_row).collect()
    }
}

#[async_trait]
impl ProductionStore for PostgresProductionStore {
    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn load_order(&self, id: ProductionOrderId) -> Result<Option<ProductionOrder>, StoreError> {
        let document: Option<JsonValue> =
            sqlx::query_scalar("SELECT document FROM production_orders WHERE order_id = $1")
                .bind(*id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_order", e))?;
        document.map(decode_order).transpose()
    }

    async fn find_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<ProductionOrder>, StoreError> {
        let document: Option<JsonValue> =
            sqlx::query_scalar("SELECT document FROM production_orders WHERE order_number = $1")
                .bind(order_number)
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("find_order_by_number", e))?;
        document.map(decode_order).transpose()
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<ProductionOrder>, StoreError> {
        let documents: Vec<JsonValue> = sqlx::query_scalar(
            r#"
            SELECT document
            FROM production_orders
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, order_id DESC
            "#,
        )
        .bind(filter.status.map(|s| s.to_string()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;
        documents.into_iter().map(decode_order).collect()
    }

    async fn load_assignments(
        &self,
        order_id: ProductionOrderId,
    ) -> Result<Vec<ProductionAssignment>, StoreError> {
        self.fetch_assignments(
            "load_assignments",
            r#"
            SELECT order_id, item_id, order_number, worker_id, product_id, quantity,
                   status, assigned_by, assigned_at, updated_at
            FROM production_assignments
            WHERE order_id = $1
            ORDER BY assigned_at ASC, item_id ASC
            "#,
            *order_id.as_uuid(),
        )
        .await
    }

    async fn assignment(
        &self,
        order_id: ProductionOrderId,
        item_id: OrderItemId,
    ) -> Result<Option<ProductionAssignment>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_assignment(&mut conn, order_id, item_id, false).await
    }

    async fn assignments_for_worker(
        &self,
        worker_id: UserId,
    ) -> Result<Vec<ProductionAssignment>, StoreError> {
        self.fetch_assignments(
            "assignments_for_worker",
            r#"
            SELECT order_id, item_id, order_number, worker_id, product_id, quantity,
                   status, assigned_by, assigned_at, updated_at
            FROM production_assignments
            WHERE worker_id = $1
            ORDER BY assigned_at ASC, item_id ASC
            "#,
            *worker_id.as_uuid(),
        )
        .await
    }

    async fn load_inventory(
        &self,
        product_id: ProductId,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_inventory(&mut conn, product_id).await
    }

    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT product_id FROM inventory_records ORDER BY product_id")
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("list_inventory", e))?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = fetch_inventory(&mut conn, product_id(id)).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn update_stock_levels(
        &self,
        command: SetStockLevels,
    ) -> Result<InventoryRecord, StoreError> {
        self.set_levels(command).await
    }

    async fn notifications_for(&self, recipient: UserId) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT notification_id, recipient_id, event_id, event_type, title, message,
                   order_id, read, created_at
            FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC, notification_id DESC
            "#,
        )
        .bind(*recipient.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("notifications_for", e))?;

        rows.iter()
            .map(|row| {
                NotificationRow::from_row(row)
                    .map(Notification::from)
                    .map_err(|e| decode_error("notification", e))
            })
            .collect()
    }

    async fn mark_notification_read(
        &self,
        recipient: UserId,
        notification_id: Uuid,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE notification_id = $1 AND recipient_id = $2",
        )
        .bind(notification_id)
        .bind(*recipient.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_notification_read", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("notification {notification_id}")).into());
        }
        Ok(())
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        self.commit_unit(unit).await
    }
}

/// Insert or version-checked update of the order document. Returns the
/// stored version.
async fn write_order(conn: &mut PgConnection, write: &OrderWrite) -> Result<u64, StoreError> {
    let order = &write.order;
    let order_id = *order.id_typed().as_uuid();

    let current: Option<i64> =
        sqlx::query_scalar("SELECT version FROM production_orders WHERE order_id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?;
    let current = current.map(|v| v as u64);

    if !write.expected.matches(current) {
        return Err(StoreError::Concurrency(format!(
            "order {order_id}: expected {:?}, found {current:?}",
            write.expected
        )));
    }

    let document = serde_json::to_value(order)
        .map_err(|e| StoreError::Corrupt(format!("failed to encode order document: {e}")))?;
    let created_at = order.created_at().unwrap_or_else(Utc::now);
    let updated_at = order.updated_at().unwrap_or(created_at);

    match current {
        None => {
            sqlx::query(
                r#"
                INSERT INTO production_orders (
                    order_id, order_number, status, version, document, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order_id)
            .bind(order.order_number())
            .bind(order.status().to_string())
            .bind(order.version() as i64)
            .bind(&document)
            .bind(created_at)
            .bind(updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                if violates(&e, ORDER_NUMBER_CONSTRAINT) {
                    DomainError::DuplicateOrderNumber(order.order_number().to_string()).into()
                } else {
                    map_sqlx_error("insert_order", e)
                }
            })?;
        }
        Some(previous) => {
            let result = sqlx::query(
                r#"
                UPDATE production_orders
                SET status = $2, version = $3, document = $4, updated_at = $5
                WHERE order_id = $1 AND version = $6
                "#,
            )
            .bind(order_id)
            .bind(order.status().to_string())
            .bind(order.version() as i64)
            .bind(&document)
            .bind(updated_at)
            .bind(previous as i64)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("update_order", e))?;

            if result.rows_affected() != 1 {
                return Err(StoreError::Concurrency(format!(
                    "order {order_id} changed while being written"
                )));
            }
        }
    }

    Ok(order.version())
}

async fn upsert_assignment(
    conn: &mut PgConnection,
    next: &ProductionAssignment,
) -> Result<(), StoreError> {
    if let Some(existing) = fetch_assignment(&mut *conn, next.order_id, next.item_id, true).await? {
        existing.ensure_same_binding(next)?;
    }

    sqlx::query(
        r#"
        INSERT INTO production_assignments (
            order_id, item_id, order_number, worker_id, product_id, quantity,
            status, assigned_by, assigned_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (order_id, item_id) DO UPDATE SET
            status = EXCLUDED.status,
            updated_at = EXCLUDED.updated_at
        WHERE production_assignments.worker_id = EXCLUDED.worker_id
        "#,
    )
    .bind(*next.order_id.as_uuid())
    .bind(*next.item_id.as_uuid())
    .bind(&next.order_number)
    .bind(*next.worker_id.as_uuid())
    .bind(*next.product_id.as_uuid())
    .bind(next.quantity)
    .bind(next.status.as_str())
    .bind(*next.assigned_by.as_uuid())
    .bind(next.assigned_at)
    .bind(next.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("upsert_assignment", e))?;

    Ok(())
}

/// Open the record if needed, move the counter with one guarded increment
/// and append the ledger entry.
async fn apply_movement(conn: &mut PgConnection, movement: &MovementWrite) -> Result<(), StoreError> {
    if movement.quantity <= 0 {
        return Err(DomainError::invalid_quantity(format!(
            "movement quantity must be positive (got {})",
            movement.quantity
        ))
        .into());
    }
    if movement.reference.trim().is_empty() {
        return Err(DomainError::validation("movement reference cannot be empty").into());
    }
    let product = *movement.product_id.as_uuid();

    sqlx::query(
        r#"
        INSERT INTO inventory_records (
            product_id, department_id, current_stock, min_stock_level, max_stock_level, version
        )
        VALUES ($1, $2, 0, $3, $4, 1)
        ON CONFLICT (product_id) DO NOTHING
        "#,
    )
    .bind(product)
    .bind(movement.department_id.map(Uuid::from))
    .bind(movement.levels_if_new.min_stock_level)
    .bind(movement.levels_if_new.max_stock_level)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("open_inventory_record", e))?;

    let delta = movement.movement_type.signed(movement.quantity);
    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE inventory_records
        SET current_stock = current_stock + $2, version = version + 1
        WHERE product_id = $1 AND current_stock + $2 >= 0
        RETURNING current_stock
        "#,
    )
    .bind(product)
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("move_stock", e))?;

    if updated.is_none() {
        let available: i64 =
            sqlx::query_scalar("SELECT current_stock FROM inventory_records WHERE product_id = $1")
                .bind(product)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("read_stock", e))?;
        return Err(DomainError::InsufficientStock {
            product: movement.product_id.to_string(),
            available,
            requested: movement.quantity,
        }
        .into());
    }

    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            product_id, movement_type, quantity, reference, created_by, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(product)
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(&movement.reference)
    .bind(*movement.actor.as_uuid())
    .bind(movement.occurred_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;

    Ok(())
}

/// Returns the number of rows inserted (0 for an already-delivered event).
async fn insert_notification(
    conn: &mut PgConnection,
    notification: &Notification,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (
            notification_id, recipient_id, event_id, event_type, title, message,
            order_id, read, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (recipient_id, event_id) DO NOTHING
        "#,
    )
    .bind(notification.id)
    .bind(*notification.recipient_id.as_uuid())
    .bind(&notification.event_id)
    .bind(&notification.event_type)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.order_id.map(|id| *id.as_uuid()))
    .bind(notification.read)
    .bind(notification.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_notification", e))?;

    Ok(result.rows_affected())
}

async fn fetch_assignment(
    conn: &mut PgConnection,
    order_id: ProductionOrderId,
    item_id: OrderItemId,
    for_update: bool,
) -> Result<Option<ProductionAssignment>, StoreError> {
    let sql = if for_update {
        r#"
        SELECT order_id, item_id, order_number, worker_id, product_id, quantity,
               status, assigned_by, assigned_at, updated_at
        FROM production_assignments
        WHERE order_id = $1 AND item_id = $2
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT order_id, item_id, order_number, worker_id, product_id, quantity,
               status, assigned_by, assigned_at, updated_at
        FROM production_assignments
        WHERE order_id = $1 AND item_id = $2
        "#
    };

    let row = sqlx::query(sql)
        .bind(*order_id.as_uuid())
        .bind(*item_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_assignment", e))?;
    row.as_ref().map(assignment_from_row).transpose()
}

async fn fetch_inventory(
    conn: &mut PgConnection,
    product: ProductId,
) -> Result<Option<InventoryRecord>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT product_id, department_id, current_stock, min_stock_level, max_stock_level, version
        FROM inventory_records
        WHERE product_id = $1
        "#,
    )
    .bind(*product.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_inventory", e))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let record = InventoryRow::from_row(&row).map_err(|e| decode_error("inventory record", e))?;

    let rows = sqlx::query(
        r#"
        SELECT movement_type, quantity, reference, created_by, created_at
        FROM inventory_movements
        WHERE product_id = $1
        ORDER BY movement_id ASC
        "#,
    )
    .bind(*product.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_movements", e))?;

    let mut movements = Vec::with_capacity(rows.len());
    for row in &rows {
        let movement = MovementRow::from_row(row).map_err(|e| decode_error("movement", e))?;
        movements.push(movement.try_into()?);
    }

    Ok(Some(InventoryRecord::from_parts(
        product_id(record.product_id),
        record.department_id.map(DepartmentId::from_uuid),
        record.current_stock,
        StockLevels {
            min_stock_level: record.min_stock_level,
            max_stock_level: record.max_stock_level,
        },
        movements,
        record.version as u64,
    )))
}

fn decode_order(document: JsonValue) -> Result<ProductionOrder, StoreError> {
    serde_json::from_value(document)
        .map_err(|e| StoreError::Corrupt(format!("failed to decode order document: {e}")))
}

fn decode_error(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(format!("failed to decode {what} row: {err}"))
}

fn product_id(uuid: Uuid) -> ProductId {
    ProductId::new(AggregateId::from_uuid(uuid))
}

fn assignment_from_row(row: &PgRow) -> Result<ProductionAssignment, StoreError> {
    let row = AssignmentRow::from_row(row).map_err(|e| decode_error("assignment", e))?;
    row.try_into()
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            classify_sqlstate(db_err.code().as_deref(), msg)
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

/// Map a Postgres SQLSTATE onto the store's error taxonomy.
fn classify_sqlstate(code: Option<&str>, msg: String) -> StoreError {
    match code {
        Some("23505") => StoreError::Concurrency(msg),
        Some("23514") => StoreError::Rejected(DomainError::invariant(msg)),
        // numeric_value_out_of_range: a BIGINT counter would overflow
        Some("22003") => StoreError::Rejected(DomainError::invalid_quantity(msg)),
        _ => StoreError::Unavailable(msg),
    }
}

/// Check if an error is a unique violation of `constraint`.
fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint);
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct AssignmentRow {
    order_id: Uuid,
    item_id: Uuid,
    order_number: String,
    worker_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    status: String,
    assigned_by: Uuid,
    assigned_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AssignmentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AssignmentRow {
            order_id: row.try_get("order_id")?,
            item_id: row.try_get("item_id")?,
            order_number: row.try_get("order_number")?,
            worker_id: row.try_get("worker_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            status: row.try_get("status")?,
            assigned_by: row.try_get("assigned_by")?,
            assigned_at: row.try_get("assigned_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<AssignmentRow> for ProductionAssignment {
    type Error = StoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        let status: AssignmentStatus = row
            .status
            .parse()
            .map_err(|e: DomainError| StoreError::Corrupt(e.to_string()))?;
        Ok(ProductionAssignment {
            order_id: ProductionOrderId::new(AggregateId::from_uuid(row.order_id)),
            order_number: row.order_number,
            item_id: OrderItemId::new(AggregateId::from_uuid(row.item_id)),
            worker_id: UserId::from_uuid(row.worker_id),
            product_id: product_id(row.product_id),
            quantity: row.quantity,
            status,
            assigned_by: UserId::from_uuid(row.assigned_by),
            assigned_at: row.assigned_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct InventoryRow {
    product_id: Uuid,
    department_id: Option<Uuid>,
    current_stock: i64,
    min_stock_level: i64,
    max_stock_level: i64,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for InventoryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(InventoryRow {
            product_id: row.try_get("product_id")?,
            department_id: row.try_get("department_id")?,
            current_stock: row.try_get("current_stock")?,
            min_stock_level: row.try_get("min_stock_level")?,
            max_stock_level: row.try_get("max_stock_level")?,
            version: row.try_get("version")?,
        })
    }
}

#[derive(Debug)]
struct MovementRow {
    movement_type: String,
    quantity: i64,
    reference: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            movement_type: row.try_get("movement_type")?,
            quantity: row.try_get("quantity")?,
            reference: row.try_get("reference")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type: MovementType = row
            .movement_type
            .parse()
            .map_err(|e: DomainError| StoreError::Corrupt(e.to_string()))?;
        Ok(Movement {
            movement_type,
            quantity: row.quantity,
            reference: row.reference,
            created_by: UserId::from_uuid(row.created_by),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct NotificationRow {
    notification_id: Uuid,
    recipient_id: Uuid,
    event_id: String,
    event_type: String,
    title: String,
    message: String,
    order_id: Option<Uuid>,
    read: bool,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for NotificationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(NotificationRow {
            notification_id: row.try_get("notification_id")?,
            recipient_id: row.try_get("recipient_id")?,
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            order_id: row.try_get("order_id")?,
            read: row.try_get("read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.notification_id,
            recipient_id: UserId::from_uuid(row.recipient_id),
            event_id: row.event_id,
            event_type: row.event_type,
            title: row.title,
            message: row.message,
            order_id: row
                .order_id
                .map(|id| ProductionOrderId::new(AggregateId::from_uuid(id))),
            read: row.read,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_declares_the_guards_the_store_relies_on() {
        assert!(MIGRATION.contains(ORDER_NUMBER_CONSTRAINT));
        assert!(MIGRATION.contains("CHECK (current_stock >= 0)"));
        assert!(MIGRATION.contains("PRIMARY KEY (order_id, item_id)"));
        assert!(MIGRATION.contains("UNIQUE (recipient_id, event_id)"));
    }

    #[test]
    fn closed_pools_are_unavailable() {
        let err = map_sqlx_error("load_order", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn out_of_range_counters_are_rejected_not_unavailable() {
        let err = classify_sqlstate(Some("22003"), "bigint out of range".into());
        assert!(matches!(
            err,
            StoreError::Rejected(DomainError::InvalidQuantity(_))
        ));

        let err = classify_sqlstate(Some("23505"), "duplicate key".into());
        assert!(matches!(err, StoreError::Concurrency(_)));
        let err = classify_sqlstate(Some("23514"), "check violation".into());
        assert!(matches!(err, StoreError::Rejected(DomainError::InvariantViolation(_))));
        let err = classify_sqlstate(Some("08006"), "connection failure".into());
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn unknown_stored_status_is_corrupt() {
        let row = AssignmentRow {
            order_id: Uuid::now_v7(),
            item_id: Uuid::now_v7(),
            order_number: "ORD-1".into(),
            worker_id: Uuid::now_v7(),
            product_id: Uuid::now_v7(),
            quantity: 1,
            status: "paused".into(),
            assigned_by: Uuid::now_v7(),
            assigned_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let err = ProductionAssignment::try_from(row).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
