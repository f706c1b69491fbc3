//! Ledger services: the stock ledger and the workflows that drive it

use std::sync::Arc;

pub mod authorization;
pub mod sale;
pub mod sale_return;
pub mod stock_ledger;
pub mod transfer;

pub use authorization::{AuthorizationPolicy, BranchPolicy, Decision, Operation, Resource};
pub use sale::SaleWorkflow;
pub use sale_return::ReturnLedger;
pub use stock_ledger::{MovementContext, StockLedger};
pub use transfer::TransferWorkflow;

use crate::config::LedgerConfig;
use crate::events::{EventSink, NoopSink};
use crate::store::Store;

/// Collaborators shared by every service
#[derive(Clone)]
pub struct LedgerContext {
    pub store: Arc<dyn Store>,
    pub policy: Arc<dyn AuthorizationPolicy>,
    pub events: Arc<dyn EventSink>,
    pub config: LedgerConfig,
}

impl LedgerContext {
    /// Context with the branch policy, no event delivery and default settings
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            policy: Arc::new(BranchPolicy),
            events: Arc::new(NoopSink),
            config: LedgerConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AuthorizationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }
}
