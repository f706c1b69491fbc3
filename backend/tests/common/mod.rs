//! Test fixtures shared by the ledger integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use branch_inventory::events::{EventSink, InventoryEvent};
use branch_inventory::services::{
    LedgerContext, MovementContext, ReturnLedger, SaleWorkflow, StockLedger, TransferWorkflow,
};
use branch_inventory::store::MemoryStore;
use shared::{
    capabilities, Actor, ActorId, BranchId, ItemLine, MovementReason, ProductId, ReadySaleInput,
};

/// Sink that keeps every published event for inspection
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<InventoryEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<InventoryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: InventoryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// All services wired to one in-memory store
#[derive(Clone)]
pub struct Ledger {
    pub events: Arc<RecordingSink>,
    pub stock: StockLedger,
    pub sales: SaleWorkflow,
    pub returns: ReturnLedger,
    pub transfers: TransferWorkflow,
}

pub fn ledger() -> Ledger {
    let events = Arc::new(RecordingSink::default());
    let ctx = LedgerContext::new(Arc::new(MemoryStore::new())).with_events(events.clone());
    Ledger {
        events,
        stock: StockLedger::new(ctx.clone()),
        sales: SaleWorkflow::new(ctx.clone()),
        returns: ReturnLedger::new(ctx.clone()),
        transfers: TransferWorkflow::new(ctx),
    }
}

/// Branch employee without special capabilities
pub fn clerk(id: ActorId, branch_id: BranchId) -> Actor {
    Actor::new(id, Some(branch_id))
}

/// Branch employee who may approve sales and adjust stock
pub fn manager(id: ActorId, branch_id: BranchId) -> Actor {
    Actor::new(id, Some(branch_id))
        .with_capability(capabilities::SALES_APPROVE)
        .with_capability(capabilities::STOCK_ADJUST)
}

pub fn sale_input(branch_id: BranchId, items: &[(ProductId, i64)]) -> ReadySaleInput {
    ReadySaleInput {
        branch_id,
        items: lines(items),
        notes: None,
    }
}

pub fn lines(items: &[(ProductId, i64)]) -> Vec<ItemLine> {
    items
        .iter()
        .map(|&(product_id, quantity)| ItemLine::new(product_id, quantity))
        .collect()
}

/// Put `quantity` units on the shelf at a branch
pub async fn seed(ledger: &Ledger, branch_id: BranchId, product_id: ProductId, quantity: i64) {
    ledger
        .stock
        .apply_delta(
            branch_id,
            product_id,
            quantity,
            &MovementContext::new(MovementReason::Adjustment, 0),
        )
        .await
        .unwrap();
}

pub async fn level(ledger: &Ledger, branch_id: BranchId, product_id: ProductId) -> i64 {
    ledger.stock.stock_level(branch_id, product_id).await.unwrap()
}
