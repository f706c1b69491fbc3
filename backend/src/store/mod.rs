//! Persistence interface for the ledger
//!
//! A [`UnitOfWork`] is one store transaction spanning a single logical action
//! (sale approval, transfer initiate, ...). Reads through `lock_*` hold the
//! row until the unit commits or is dropped; dropping without `commit` rolls
//! every write back.
//!
//! Stock rows are only ever touched through `lock_stock`/`save_stock`, and only
//! the stock ledger calls those.

use async_trait::async_trait;
use uuid::Uuid;

use shared::{
    BranchId, ProductId, Sale, SaleReturn, SaleStatus, StockEntry, StockKey, StockMovement,
    Transfer, TransferDirection,
};

use crate::error::AppResult;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Filter for sale listings
#[derive(Debug, Clone, Copy, Default)]
pub struct SaleFilter {
    pub branch_id: Option<BranchId>,
    pub status: Option<SaleStatus>,
}

/// Writes and locked reads inside one transaction
#[async_trait]
pub trait UnitOfWork: Send {
    /// Lock the stock row for `key`. With `create_if_missing`, an absent row is
    /// first inserted with quantity 0 so that it can be locked.
    async fn lock_stock(
        &mut self,
        key: StockKey,
        create_if_missing: bool,
    ) -> AppResult<Option<StockEntry>>;

    async fn save_stock(&mut self, entry: &StockEntry) -> AppResult<()>;

    async fn record_movement(&mut self, movement: &StockMovement) -> AppResult<()>;

    async fn insert_sale(&mut self, sale: &Sale) -> AppResult<()>;

    async fn lock_sale(&mut self, sale_id: Uuid) -> AppResult<Option<Sale>>;

    /// Persist status, approver and notes. Items are immutable.
    async fn update_sale(&mut self, sale: &Sale) -> AppResult<()>;

    /// Sum of quantities already returned for a sale line
    async fn returned_quantity(&mut self, sale_id: Uuid, product_id: ProductId) -> AppResult<i64>;

    async fn insert_return(&mut self, sale_return: &SaleReturn) -> AppResult<()>;

    async fn insert_transfer(&mut self, transfer: &Transfer) -> AppResult<()>;

    async fn lock_transfer(&mut self, transfer_id: Uuid) -> AppResult<Option<Transfer>>;

    /// Persist status, actors and per-item receipt fields
    async fn update_transfer(&mut self, transfer: &Transfer) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Transactional store backing the ledger
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;

    async fn stock_entry(&self, key: StockKey) -> AppResult<Option<StockEntry>>;

    async fn branch_stock(&self, branch_id: BranchId) -> AppResult<Vec<StockEntry>>;

    /// Movements for a branch, newest first
    async fn movements(
        &self,
        branch_id: BranchId,
        product_id: Option<ProductId>,
    ) -> AppResult<Vec<StockMovement>>;

    async fn sale(&self, sale_id: Uuid) -> AppResult<Option<Sale>>;

    /// Sales matching the filter, newest first
    async fn sales(&self, filter: SaleFilter) -> AppResult<Vec<Sale>>;

    /// Returns recorded against a sale, oldest first
    async fn sale_returns(&self, sale_id: Uuid) -> AppResult<Vec<SaleReturn>>;

    async fn transfer(&self, transfer_id: Uuid) -> AppResult<Option<Transfer>>;

    /// Transfers touching a branch, newest first
    async fn transfers(
        &self,
        branch_id: BranchId,
        direction: TransferDirection,
    ) -> AppResult<Vec<Transfer>>;
}
