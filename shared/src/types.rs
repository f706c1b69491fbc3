//! Common types used across the ledger

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Identifier of a branch, owned by the external branch catalog
pub type BranchId = i64;

/// Identifier of a product, owned by the external product catalog
pub type ProductId = i64;

/// Identifier of an authenticated user
pub type ActorId = i64;

/// Capability strings granted to actors, in `resource:action` form
pub mod capabilities {
    /// Approve readied sales (branch admin)
    pub const SALES_APPROVE: &str = "sales:approve";
    /// Restock or correct stock levels
    pub const STOCK_ADJUST: &str = "stock:adjust";
    /// Act on any branch, not only the actor's own
    pub const BRANCHES_ALL: &str = "branches:all";
}

/// The authenticated user on whose behalf an operation runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub branch_id: Option<BranchId>,
    pub capabilities: BTreeSet<String>,
}

impl Actor {
    pub fn new(id: ActorId, branch_id: Option<BranchId>) -> Self {
        Self {
            id,
            branch_id,
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.capabilities.insert(capability.to_string());
        self
    }

    /// Check if the actor holds a capability
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// True when the actor is affiliated with `branch_id` or may act on every branch
    pub fn can_act_on(&self, branch_id: BranchId) -> bool {
        self.branch_id == Some(branch_id) || self.has_capability(capabilities::BRANCHES_ALL)
    }
}

/// A requested product and quantity, used by sales and transfers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ItemLine {
    pub product_id: ProductId,
    #[validate(range(min = 1))]
    pub quantity: i64,
}

impl ItemLine {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}
