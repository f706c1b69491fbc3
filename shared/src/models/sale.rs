//! Sale and sale return models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::types::{ActorId, BranchId, ItemLine, ProductId};

/// A sale recorded at a branch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sale {
    pub id: Uuid,
    pub branch_id: BranchId,
    pub status: SaleStatus,
    pub readied_by: ActorId,
    pub approved_by: Option<ActorId>,
    pub notes: Option<String>,
    pub items: Vec<SaleItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    /// Quantity sold for a product, if the sale contains it
    pub fn item_quantity(&self, product_id: ProductId) -> Option<i64> {
        self.items
            .iter()
            .find(|item| item.product_id == product_id)
            .map(|item| item.quantity)
    }

    pub fn total_quantity(&self) -> i64 {
        self.items
            .iter()
            .fold(0i64, |total, item| total.saturating_add(item.quantity))
    }
}

/// A product line on a sale. Immutable once the sale is readied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaleItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl From<ItemLine> for SaleItem {
    fn from(line: ItemLine) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
        }
    }
}

/// Lifecycle of a sale: readied, then completed or cancelled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Readied,
    Completed,
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Readied => "readied",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "readied" => Some(SaleStatus::Readied),
            "completed" => Some(SaleStatus::Completed),
            "cancelled" => Some(SaleStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Completed | SaleStatus::Cancelled)
    }

    /// Only readied sales move, and only forward
    pub fn can_transition_to(&self, next: SaleStatus) -> bool {
        matches!(
            (self, next),
            (SaleStatus::Readied, SaleStatus::Completed) | (SaleStatus::Readied, SaleStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for readying a sale
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReadySaleInput {
    pub branch_id: BranchId,
    #[validate]
    pub items: Vec<ItemLine>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// A partial or full return against a completed sale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleReturn {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub product_id: ProductId,
    pub quantity: i64,
    pub returned_by: ActorId,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a return
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReturnInput {
    pub sale_id: Uuid,
    pub product_id: ProductId,
    #[validate(range(min = 1))]
    pub quantity: i64,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}
