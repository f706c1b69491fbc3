//! Branch inventory ledger
//!
//! Per-branch stock quantities for a retail chain, changed only through the
//! sale, return, transfer and adjustment workflows in [`services`]. Every
//! workflow step runs in one store transaction, so stock and workflow state
//! commit or roll back together.

pub mod config;
pub mod error;
pub mod events;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use events::{EventSender, EventSink, InventoryEvent, LoggingNotifier, Notifier};
pub use services::{
    LedgerContext, ReturnLedger, SaleWorkflow, StockLedger, TransferWorkflow,
};
pub use store::{MemoryStore, PgStore, Store};
