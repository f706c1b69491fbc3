//! Inter-branch transfer models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::types::{ActorId, BranchId, ItemLine, ProductId};

/// Movement of stock from one branch to another
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    pub id: Uuid,
    pub source_branch_id: BranchId,
    pub destination_branch_id: BranchId,
    pub status: TransferStatus,
    pub readied_by: ActorId,
    pub approved_by: Option<ActorId>,
    pub received_by: Option<ActorId>,
    pub notes: Option<String>,
    pub items: Vec<TransferItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product line on a transfer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub received_quantity: i64,
    pub item_status: TransferItemStatus,
}

impl From<ItemLine> for TransferItem {
    fn from(line: ItemLine) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
            received_quantity: 0,
            item_status: TransferItemStatus::Pending,
        }
    }
}

/// Transfer lifecycle.
///
/// ```text
/// readied ──initiate──> outgoing ──confirm receipt──> completed
///    └─────reject─────> rejected
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Readied,
    Outgoing,
    Completed,
    Rejected,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Readied => "readied",
            TransferStatus::Outgoing => "outgoing",
            TransferStatus::Completed => "completed",
            TransferStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "readied" => Some(TransferStatus::Readied),
            "outgoing" => Some(TransferStatus::Outgoing),
            // older rows were written as "received"
            "completed" | "received" => Some(TransferStatus::Completed),
            "rejected" => Some(TransferStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Rejected)
    }

    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Readied, TransferStatus::Outgoing)
                | (TransferStatus::Readied, TransferStatus::Rejected)
                | (TransferStatus::Outgoing, TransferStatus::Completed)
        )
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receipt state of a single transfer line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferItemStatus {
    Pending,
    Received,
}

impl TransferItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferItemStatus::Pending => "pending",
            TransferItemStatus::Received => "received",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransferItemStatus::Pending),
            "received" => Some(TransferItemStatus::Received),
            _ => None,
        }
    }
}

/// Which side of a transfer a branch is on, for listings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Outgoing,
    Incoming,
    Any,
}

/// Input for creating a transfer
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTransferInput {
    pub source_branch_id: BranchId,
    pub destination_branch_id: BranchId,
    #[validate]
    pub items: Vec<ItemLine>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_transitions() {
        use TransferStatus::*;

        assert!(Readied.can_transition_to(Outgoing));
        assert!(Readied.can_transition_to(Rejected));
        assert!(Outgoing.can_transition_to(Completed));

        assert!(!Outgoing.can_transition_to(Rejected));
        assert!(!Readied.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Outgoing));
        assert!(!Rejected.can_transition_to(Readied));

        assert!(Completed.is_terminal() && Rejected.is_terminal());
        assert!(!Outgoing.is_terminal());
    }

    #[test]
    fn test_legacy_received_status_reads_as_completed() {
        assert_eq!(TransferStatus::from_str("received"), Some(TransferStatus::Completed));
        assert_eq!(TransferStatus::Completed.as_str(), "completed");
    }

    #[test]
    fn test_new_items_start_pending() {
        let item = TransferItem::from(ItemLine::new(7, 3));
        assert_eq!(item.item_status, TransferItemStatus::Pending);
        assert_eq!(item.received_quantity, 0);
    }
}
