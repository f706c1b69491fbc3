//! In-process store
//!
//! Units of work are serialized behind one async mutex and operate on a copy
//! of the state, which replaces the shared state on commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use shared::{
    BranchId, ProductId, Sale, SaleReturn, StockEntry, StockKey, StockMovement, Transfer,
    TransferDirection,
};

use super::{SaleFilter, Store, UnitOfWork};
use crate::error::AppResult;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    stock: BTreeMap<StockKey, StockEntry>,
    movements: Vec<StockMovement>,
    sales: HashMap<Uuid, Sale>,
    returns: Vec<SaleReturn>,
    transfers: HashMap<Uuid, Transfer>,
}

/// Store kept entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_stock(
        &mut self,
        key: StockKey,
        create_if_missing: bool,
    ) -> AppResult<Option<StockEntry>> {
        if create_if_missing {
            let entry = self
                .working
                .stock
                .entry(key)
                .or_insert_with(|| StockEntry::empty(key.branch_id, key.product_id));
            return Ok(Some(entry.clone()));
        }
        Ok(self.working.stock.get(&key).cloned())
    }

    async fn save_stock(&mut self, entry: &StockEntry) -> AppResult<()> {
        self.working.stock.insert(entry.key(), entry.clone());
        Ok(())
    }

    async fn record_movement(&mut self, movement: &StockMovement) -> AppResult<()> {
        self.working.movements.push(movement.clone());
        Ok(())
    }

    async fn insert_sale(&mut self, sale: &Sale) -> AppResult<()> {
        self.working.sales.insert(sale.id, sale.clone());
        Ok(())
    }

    async fn lock_sale(&mut self, sale_id: Uuid) -> AppResult<Option<Sale>> {
        Ok(self.working.sales.get(&sale_id).cloned())
    }

    async fn update_sale(&mut self, sale: &Sale) -> AppResult<()> {
        if let Some(existing) = self.working.sales.get_mut(&sale.id) {
            existing.status = sale.status;
            existing.approved_by = sale.approved_by;
            existing.notes = sale.notes.clone();
            existing.updated_at = sale.updated_at;
        }
        Ok(())
    }

    async fn returned_quantity(&mut self, sale_id: Uuid, product_id: ProductId) -> AppResult<i64> {
        Ok(self
            .working
            .returns
            .iter()
            .filter(|r| r.sale_id == sale_id && r.product_id == product_id)
            .map(|r| r.quantity)
            .sum())
    }

    async fn insert_return(&mut self, sale_return: &SaleReturn) -> AppResult<()> {
        self.working.returns.push(sale_return.clone());
        Ok(())
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> AppResult<()> {
        self.working.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn lock_transfer(&mut self, transfer_id: Uuid) -> AppResult<Option<Transfer>> {
        Ok(self.working.transfers.get(&transfer_id).cloned())
    }

    async fn update_transfer(&mut self, transfer: &Transfer) -> AppResult<()> {
        self.working.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryUnit { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnit { guard, working }))
    }

    async fn stock_entry(&self, key: StockKey) -> AppResult<Option<StockEntry>> {
        Ok(self.state.lock().await.stock.get(&key).cloned())
    }

    async fn branch_stock(&self, branch_id: BranchId) -> AppResult<Vec<StockEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .stock
            .values()
            .filter(|entry| entry.branch_id == branch_id)
            .cloned()
            .collect())
    }

    async fn movements(
        &self,
        branch_id: BranchId,
        product_id: Option<ProductId>,
    ) -> AppResult<Vec<StockMovement>> {
        let state = self.state.lock().await;
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|m| m.branch_id == branch_id)
            .filter(|m| product_id.map_or(true, |p| m.product_id == p))
            .cloned()
            .collect())
    }

    async fn sale(&self, sale_id: Uuid) -> AppResult<Option<Sale>> {
        Ok(self.state.lock().await.sales.get(&sale_id).cloned())
    }

    async fn sales(&self, filter: SaleFilter) -> AppResult<Vec<Sale>> {
        let state = self.state.lock().await;
        let mut sales: Vec<Sale> = state
            .sales
            .values()
            .filter(|s| filter.branch_id.map_or(true, |b| s.branch_id == b))
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        sales.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sales)
    }

    async fn sale_returns(&self, sale_id: Uuid) -> AppResult<Vec<SaleReturn>> {
        let state = self.state.lock().await;
        Ok(state
            .returns
            .iter()
            .filter(|r| r.sale_id == sale_id)
            .cloned()
            .collect())
    }

    async fn transfer(&self, transfer_id: Uuid) -> AppResult<Option<Transfer>> {
        Ok(self.state.lock().await.transfers.get(&transfer_id).cloned())
    }

    async fn transfers(
        &self,
        branch_id: BranchId,
        direction: TransferDirection,
    ) -> AppResult<Vec<Transfer>> {
        let state = self.state.lock().await;
        let mut transfers: Vec<Transfer> = state
            .transfers
            .values()
            .filter(|t| match direction {
                TransferDirection::Outgoing => t.source_branch_id == branch_id,
                TransferDirection::Incoming => t.destination_branch_id == branch_id,
                TransferDirection::Any => {
                    t.source_branch_id == branch_id || t.destination_branch_id == branch_id
                }
            })
            .cloned()
            .collect();
        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transfers)
    }
}
