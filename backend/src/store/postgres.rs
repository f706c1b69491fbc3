//! PostgreSQL store
//!
//! Locked reads use `SELECT ... FOR UPDATE`, so two units touching the same
//! stock, sale or transfer row serialize on that row only.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{
    BranchId, MovementReason, ProductId, Sale, SaleItem, SaleReturn, SaleStatus, StockEntry,
    StockKey, StockMovement, Transfer, TransferDirection, TransferItem, TransferItemStatus,
    TransferStatus,
};

use super::{SaleFilter, Store, UnitOfWork};
use crate::error::{AppError, AppResult};

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    /// Create a new PgStore instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Apply pending migrations from `backend/migrations`
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct StockRow {
    branch_id: i64,
    product_id: i64,
    quantity: i64,
    location: Option<String>,
    variations: Option<serde_json::Value>,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for StockEntry {
    fn from(row: StockRow) -> Self {
        StockEntry {
            branch_id: row.branch_id,
            product_id: row.product_id,
            quantity: row.quantity,
            location: row.location,
            variations: row.variations,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    branch_id: i64,
    product_id: i64,
    delta: i64,
    quantity_after: i64,
    reason: String,
    reference_id: Option<Uuid>,
    actor_id: i64,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> AppResult<Self> {
        let reason = MovementReason::from_str(&row.reason)
            .ok_or_else(|| AppError::Internal(format!("Unknown movement reason '{}'", row.reason)))?;
        Ok(StockMovement {
            id: row.id,
            branch_id: row.branch_id,
            product_id: row.product_id,
            delta: row.delta,
            quantity_after: row.quantity_after,
            reason,
            reference_id: row.reference_id,
            actor_id: row.actor_id,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: Uuid,
    branch_id: i64,
    status: String,
    readied_by: i64,
    approved_by: Option<i64>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SaleItemRow {
    sale_id: Uuid,
    product_id: i64,
    quantity: i64,
}

impl SaleRow {
    fn into_sale(self, items: Vec<SaleItem>) -> AppResult<Sale> {
        let status = SaleStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown sale status '{}'", self.status)))?;
        Ok(Sale {
            id: self.id,
            branch_id: self.branch_id,
            status,
            readied_by: self.readied_by,
            approved_by: self.approved_by,
            notes: self.notes,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReturnRow {
    id: Uuid,
    sale_id: Uuid,
    product_id: i64,
    quantity: i64,
    returned_by: i64,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ReturnRow> for SaleReturn {
    fn from(row: ReturnRow) -> Self {
        SaleReturn {
            id: row.id,
            sale_id: row.sale_id,
            product_id: row.product_id,
            quantity: row.quantity,
            returned_by: row.returned_by,
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransferRow {
    id: Uuid,
    source_branch_id: i64,
    destination_branch_id: i64,
    status: String,
    readied_by: i64,
    approved_by: Option<i64>,
    received_by: Option<i64>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct TransferItemRow {
    transfer_id: Uuid,
    product_id: i64,
    quantity: i64,
    received_quantity: i64,
    item_status: String,
}

impl TryFrom<TransferItemRow> for TransferItem {
    type Error = AppError;

    fn try_from(row: TransferItemRow) -> AppResult<Self> {
        let item_status = TransferItemStatus::from_str(&row.item_status).ok_or_else(|| {
            AppError::Internal(format!("Unknown transfer item status '{}'", row.item_status))
        })?;
        Ok(TransferItem {
            product_id: row.product_id,
            quantity: row.quantity,
            received_quantity: row.received_quantity,
            item_status,
        })
    }
}

impl TransferRow {
    fn into_transfer(self, items: Vec<TransferItem>) -> AppResult<Transfer> {
        let status = TransferStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("Unknown transfer status '{}'", self.status))
        })?;
        Ok(Transfer {
            id: self.id,
            source_branch_id: self.source_branch_id,
            destination_branch_id: self.destination_branch_id,
            status,
            readied_by: self.readied_by,
            approved_by: self.approved_by,
            received_by: self.received_by,
            notes: self.notes,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const STOCK_COLUMNS: &str = "branch_id, product_id, quantity, location, variations, updated_at";
const SALE_COLUMNS: &str =
    "id, branch_id, status, readied_by, approved_by, notes, created_at, updated_at";
const TRANSFER_COLUMNS: &str = "id, source_branch_id, destination_branch_id, status, readied_by, \
                                approved_by, received_by, notes, created_at, updated_at";

// ============================================================================
// Shared queries
// ============================================================================

async fn fetch_sale_items<'e, E>(executor: E, sale_ids: &[Uuid]) -> AppResult<Vec<SaleItemRow>>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, SaleItemRow>(
        r#"
        SELECT sale_id, product_id, quantity
        FROM sale_items
        WHERE sale_id = ANY($1)
        ORDER BY sale_id, position
        "#,
    )
    .bind(sale_ids)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

async fn fetch_transfer_items<'e, E>(
    executor: E,
    transfer_ids: &[Uuid],
) -> AppResult<Vec<TransferItemRow>>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, TransferItemRow>(
        r#"
        SELECT transfer_id, product_id, quantity, received_quantity, item_status
        FROM transfer_items
        WHERE transfer_id = ANY($1)
        ORDER BY transfer_id, position
        "#,
    )
    .bind(transfer_ids)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

fn assemble_sales(rows: Vec<SaleRow>, items: Vec<SaleItemRow>) -> AppResult<Vec<Sale>> {
    let mut by_sale: HashMap<Uuid, Vec<SaleItem>> = HashMap::new();
    for item in items {
        by_sale.entry(item.sale_id).or_default().push(SaleItem {
            product_id: item.product_id,
            quantity: item.quantity,
        });
    }
    rows.into_iter()
        .map(|row| {
            let items = by_sale.remove(&row.id).unwrap_or_default();
            row.into_sale(items)
        })
        .collect()
}

fn assemble_transfers(
    rows: Vec<TransferRow>,
    items: Vec<TransferItemRow>,
) -> AppResult<Vec<Transfer>> {
    let mut by_transfer: HashMap<Uuid, Vec<TransferItem>> = HashMap::new();
    for item in items {
        let transfer_id = item.transfer_id;
        by_transfer
            .entry(transfer_id)
            .or_default()
            .push(TransferItem::try_from(item)?);
    }
    rows.into_iter()
        .map(|row| {
            let items = by_transfer.remove(&row.id).unwrap_or_default();
            row.into_transfer(items)
        })
        .collect()
}

// ============================================================================
// Unit of work
// ============================================================================

struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn lock_stock(
        &mut self,
        key: StockKey,
        create_if_missing: bool,
    ) -> AppResult<Option<StockEntry>> {
        if create_if_missing {
            sqlx::query(
                r#"
                INSERT INTO stock_entries (branch_id, product_id, quantity)
                VALUES ($1, $2, 0)
                ON CONFLICT (branch_id, product_id) DO NOTHING
                "#,
            )
            .bind(key.branch_id)
            .bind(key.product_id)
            .execute(&mut *self.tx)
            .await?;
        }

        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_entries \
             WHERE branch_id = $1 AND product_id = $2 FOR UPDATE"
        ))
        .bind(key.branch_id)
        .bind(key.product_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn save_stock(&mut self, entry: &StockEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE stock_entries
            SET quantity = $3, location = $4, variations = $5, updated_at = $6
            WHERE branch_id = $1 AND product_id = $2
            "#,
        )
        .bind(entry.branch_id)
        .bind(entry.product_id)
        .bind(entry.quantity)
        .bind(&entry.location)
        .bind(&entry.variations)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn record_movement(&mut self, movement: &StockMovement) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, branch_id, product_id, delta, quantity_after, reason,
                reference_id, actor_id, note, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(movement.id)
        .bind(movement.branch_id)
        .bind(movement.product_id)
        .bind(movement.delta)
        .bind(movement.quantity_after)
        .bind(movement.reason.as_str())
        .bind(movement.reference_id)
        .bind(movement.actor_id)
        .bind(&movement.note)
        .bind(movement.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_sale(&mut self, sale: &Sale) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales (id, branch_id, status, readied_by, approved_by, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(sale.id)
        .bind(sale.branch_id)
        .bind(sale.status.as_str())
        .bind(sale.readied_by)
        .bind(sale.approved_by)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for (position, item) in sale.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO sale_items (sale_id, product_id, quantity, position) VALUES ($1, $2, $3, $4)",
            )
            .bind(sale.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(position as i32)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn lock_sale(&mut self, sale_id: Uuid) -> AppResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = $1 FOR UPDATE"
        ))
        .bind(sale_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = fetch_sale_items(&mut *self.tx, &[sale_id]).await?;
        Ok(assemble_sales(vec![row], items)?.pop())
    }

    async fn update_sale(&mut self, sale: &Sale) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE sales
            SET status = $2, approved_by = $3, notes = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(sale.id)
        .bind(sale.status.as_str())
        .bind(sale.approved_by)
        .bind(&sale.notes)
        .bind(sale.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn returned_quantity(&mut self, sale_id: Uuid, product_id: ProductId) -> AppResult<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT
            FROM sale_returns
            WHERE sale_id = $1 AND product_id = $2
            "#,
        )
        .bind(sale_id)
        .bind(product_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(total)
    }

    async fn insert_return(&mut self, sale_return: &SaleReturn) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sale_returns (id, sale_id, product_id, quantity, returned_by, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(sale_return.id)
        .bind(sale_return.sale_id)
        .bind(sale_return.product_id)
        .bind(sale_return.quantity)
        .bind(sale_return.returned_by)
        .bind(&sale_return.reason)
        .bind(sale_return.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transfers (
                id, source_branch_id, destination_branch_id, status, readied_by,
                approved_by, received_by, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(transfer.id)
        .bind(transfer.source_branch_id)
        .bind(transfer.destination_branch_id)
        .bind(transfer.status.as_str())
        .bind(transfer.readied_by)
        .bind(transfer.approved_by)
        .bind(transfer.received_by)
        .bind(&transfer.notes)
        .bind(transfer.created_at)
        .bind(transfer.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for (position, item) in transfer.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO transfer_items (transfer_id, product_id, quantity, received_quantity, item_status, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(transfer.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.received_quantity)
            .bind(item.item_status.as_str())
            .bind(position as i32)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn lock_transfer(&mut self, transfer_id: Uuid) -> AppResult<Option<Transfer>> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1 FOR UPDATE"
        ))
        .bind(transfer_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = fetch_transfer_items(&mut *self.tx, &[transfer_id]).await?;
        Ok(assemble_transfers(vec![row], items)?.pop())
    }

    async fn update_transfer(&mut self, transfer: &Transfer) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE transfers
            SET status = $2, approved_by = $3, received_by = $4, notes = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(transfer.id)
        .bind(transfer.status.as_str())
        .bind(transfer.approved_by)
        .bind(transfer.received_by)
        .bind(&transfer.notes)
        .bind(transfer.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for item in &transfer.items {
            sqlx::query(
                r#"
                UPDATE transfer_items
                SET received_quantity = $3, item_status = $4
                WHERE transfer_id = $1 AND product_id = $2
                "#,
            )
            .bind(transfer.id)
            .bind(item.product_id)
            .bind(item.received_quantity)
            .bind(item.item_status.as_str())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgUnit { tx }))
    }

    async fn stock_entry(&self, key: StockKey) -> AppResult<Option<StockEntry>> {
        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_entries WHERE branch_id = $1 AND product_id = $2"
        ))
        .bind(key.branch_id)
        .bind(key.product_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn branch_stock(&self, branch_id: BranchId) -> AppResult<Vec<StockEntry>> {
        let rows = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_entries WHERE branch_id = $1 ORDER BY product_id"
        ))
        .bind(branch_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn movements(
        &self,
        branch_id: BranchId,
        product_id: Option<ProductId>,
    ) -> AppResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, branch_id, product_id, delta, quantity_after, reason,
                   reference_id, actor_id, note, created_at
            FROM stock_movements
            WHERE branch_id = $1 AND ($2::BIGINT IS NULL OR product_id = $2)
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(branch_id)
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockMovement::try_from).collect()
    }

    async fn sale(&self, sale_id: Uuid) -> AppResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = $1"
        ))
        .bind(sale_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = fetch_sale_items(&self.db, &[sale_id]).await?;
        Ok(assemble_sales(vec![row], items)?.pop())
    }

    async fn sales(&self, filter: SaleFilter) -> AppResult<Vec<Sale>> {
        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE ($1::BIGINT IS NULL OR branch_id = $1) AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC"
        ))
        .bind(filter.branch_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = fetch_sale_items(&self.db, &ids).await?;
        assemble_sales(rows, items)
    }

    async fn sale_returns(&self, sale_id: Uuid) -> AppResult<Vec<SaleReturn>> {
        let rows = sqlx::query_as::<_, ReturnRow>(
            r#"
            SELECT id, sale_id, product_id, quantity, returned_by, reason, created_at
            FROM sale_returns
            WHERE sale_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn transfer(&self, transfer_id: Uuid) -> AppResult<Option<Transfer>> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1"
        ))
        .bind(transfer_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let items = fetch_transfer_items(&self.db, &[transfer_id]).await?;
        Ok(assemble_transfers(vec![row], items)?.pop())
    }

    async fn transfers(
        &self,
        branch_id: BranchId,
        direction: TransferDirection,
    ) -> AppResult<Vec<Transfer>> {
        let condition = match direction {
            TransferDirection::Outgoing => "source_branch_id = $1",
            TransferDirection::Incoming => "destination_branch_id = $1",
            TransferDirection::Any => "(source_branch_id = $1 OR destination_branch_id = $1)",
        };
        let rows = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE {condition} ORDER BY created_at DESC"
        ))
        .bind(branch_id)
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = fetch_transfer_items(&self.db, &ids).await?;
        assemble_transfers(rows, items)
    }
}
