//! Validation utilities for the branch inventory ledger

use std::collections::HashSet;

use crate::types::{BranchId, ItemLine};

/// Upper bound on lines in a single sale or transfer
pub const MAX_ITEM_LINES: usize = 200;

// ============================================================================
// Item Line Validations
// ============================================================================

/// Validate the product lines of a sale or transfer: at least one line,
/// every quantity positive, each product at most once
pub fn validate_item_lines(items: &[ItemLine]) -> Result<(), &'static str> {
    if items.is_empty() {
        return Err("At least one item is required");
    }
    if items.len() > MAX_ITEM_LINES {
        return Err("Too many item lines");
    }
    if items.iter().any(|item| item.quantity < 1) {
        return Err("Item quantity must be at least 1");
    }

    let mut seen = HashSet::with_capacity(items.len());
    if !items.iter().all(|item| seen.insert(item.product_id)) {
        return Err("Each product may appear only once");
    }
    Ok(())
}

/// Validate a stock delta (signed, but never zero)
pub fn validate_delta(delta: i64) -> Result<(), &'static str> {
    if delta == 0 {
        return Err("Delta must not be zero");
    }
    // i64::MIN has no positive counterpart
    if delta == i64::MIN {
        return Err("Delta is out of range");
    }
    Ok(())
}

/// Validate that a transfer moves stock between two different branches
pub fn validate_transfer_branches(
    source: BranchId,
    destination: BranchId,
) -> Result<(), &'static str> {
    if source == destination {
        return Err("Source and destination branch must differ");
    }
    Ok(())
}
