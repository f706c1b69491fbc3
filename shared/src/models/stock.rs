//! Stock ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::types::{ActorId, BranchId, ProductId};

/// Quantity of one product held at one branch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockEntry {
    pub branch_id: BranchId,
    pub product_id: ProductId,
    /// Never negative
    pub quantity: i64,
    /// Free-text shelf or storage location
    pub location: Option<String>,
    /// Structured variation attributes (size, colour, ...)
    pub variations: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl StockEntry {
    /// An empty entry, as created on first stock assignment
    pub fn empty(branch_id: BranchId, product_id: ProductId) -> Self {
        Self {
            branch_id,
            product_id,
            quantity: 0,
            location: None,
            variations: None,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.branch_id, self.product_id)
    }
}

/// Identity of a stock entry. Ordered by branch then product, which is also
/// the order rows are locked in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StockKey {
    pub branch_id: BranchId,
    pub product_id: ProductId,
}

impl StockKey {
    pub fn new(branch_id: BranchId, product_id: ProductId) -> Self {
        Self {
            branch_id,
            product_id,
        }
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "branch {} / product {}", self.branch_id, self.product_id)
    }
}

/// A signed quantity adjustment against one stock entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockDelta {
    pub key: StockKey,
    pub delta: i64,
}

impl StockDelta {
    pub fn new(branch_id: BranchId, product_id: ProductId, delta: i64) -> Self {
        Self {
            key: StockKey::new(branch_id, product_id),
            delta,
        }
    }
}

/// Why a stock movement happened
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    Sale,
    SaleReturn,
    TransferOut,
    TransferIn,
    Adjustment,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Sale => "sale",
            MovementReason::SaleReturn => "sale_return",
            MovementReason::TransferOut => "transfer_out",
            MovementReason::TransferIn => "transfer_in",
            MovementReason::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(MovementReason::Sale),
            "sale_return" => Some(MovementReason::SaleReturn),
            "transfer_out" => Some(MovementReason::TransferOut),
            "transfer_in" => Some(MovementReason::TransferIn),
            "adjustment" => Some(MovementReason::Adjustment),
            _ => None,
        }
    }
}

/// Append-only audit row written for every applied delta
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMovement {
    pub id: Uuid,
    pub branch_id: BranchId,
    pub product_id: ProductId,
    pub delta: i64,
    pub quantity_after: i64,
    pub reason: MovementReason,
    /// Sale, return or transfer that caused the movement
    pub reference_id: Option<Uuid>,
    pub actor_id: ActorId,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a manual stock adjustment (restock, count correction)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustStockInput {
    pub branch_id: BranchId,
    pub product_id: ProductId,
    pub delta: i64,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// Input for updating descriptive stock attributes
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StockDetailsInput {
    pub branch_id: BranchId,
    pub product_id: ProductId,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    pub variations: Option<serde_json::Value>,
}
