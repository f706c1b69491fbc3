//! Stock ledger: the only writer of stock quantities
//!
//! Every quantity change goes through [`apply_deltas`], which locks the
//! touched rows in key order, checks the whole batch, and only then writes.
//! A batch either applies completely or not at all.

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use shared::{
    validate_delta, Actor, ActorId, AdjustStockInput, BranchId, MovementReason, ProductId,
    StockDelta, StockDetailsInput, StockEntry, StockKey, StockMovement,
};

use super::authorization::{authorize, Operation, Resource};
use super::LedgerContext;
use crate::error::{AppError, AppResult};
use crate::events::InventoryEvent;
use crate::store::UnitOfWork;

/// Attribution written to the movement log alongside each delta
#[derive(Debug, Clone)]
pub struct MovementContext {
    pub reason: MovementReason,
    pub reference_id: Option<Uuid>,
    pub actor_id: ActorId,
    pub note: Option<String>,
}

impl MovementContext {
    pub fn new(reason: MovementReason, actor_id: ActorId) -> Self {
        Self {
            reason,
            reference_id: None,
            actor_id,
            note: None,
        }
    }

    pub fn referencing(mut self, reference_id: Uuid) -> Self {
        self.reference_id = Some(reference_id);
        self
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

/// Apply a batch of deltas inside an open unit of work.
///
/// Deltas against the same entry are summed. Fails with `ProductNotStocked`
/// when a decrement targets a missing entry and with `InsufficientStock` when
/// a result would go negative; nothing is written in either case. Returns the
/// updated entries in key order.
pub async fn apply_deltas(
    unit: &mut dyn UnitOfWork,
    deltas: &[StockDelta],
    movement: &MovementContext,
) -> AppResult<Vec<StockEntry>> {
    let mut net: BTreeMap<StockKey, i64> = BTreeMap::new();
    for d in deltas {
        validate_delta(d.delta).map_err(|msg| AppError::validation("delta", msg))?;
        let total = net.entry(d.key).or_insert(0);
        *total = total
            .checked_add(d.delta)
            .ok_or_else(|| AppError::validation("delta", "Delta is out of range"))?;
    }

    // Lock and check everything before the first write
    let mut pending = Vec::with_capacity(net.len());
    for (key, delta) in net {
        if delta == 0 {
            continue;
        }
        let entry = unit
            .lock_stock(key, delta > 0)
            .await?
            .ok_or(AppError::ProductNotStocked {
                branch_id: key.branch_id,
                product_id: key.product_id,
            })?;

        let quantity = entry
            .quantity
            .checked_add(delta)
            .ok_or_else(|| AppError::validation("delta", "Delta is out of range"))?;
        if quantity < 0 {
            let requested = delta
                .checked_neg()
                .ok_or_else(|| AppError::validation("delta", "Delta is out of range"))?;
            tracing::warn!(
                branch_id = key.branch_id,
                product_id = key.product_id,
                available = entry.quantity,
                requested,
                "Rejecting stock decrement"
            );
            return Err(AppError::InsufficientStock {
                branch_id: key.branch_id,
                product_id: key.product_id,
                available: entry.quantity,
                requested,
            });
        }
        pending.push((entry, delta, quantity));
    }

    let now = Utc::now();
    let mut updated = Vec::with_capacity(pending.len());
    for (mut entry, delta, quantity) in pending {
        entry.quantity = quantity;
        entry.updated_at = now;
        unit.save_stock(&entry).await?;
        unit.record_movement(&StockMovement {
            id: Uuid::new_v4(),
            branch_id: entry.branch_id,
            product_id: entry.product_id,
            delta,
            quantity_after: quantity,
            reason: movement.reason,
            reference_id: movement.reference_id,
            actor_id: movement.actor_id,
            note: movement.note.clone(),
            created_at: now,
        })
        .await?;
        updated.push(entry);
    }

    Ok(updated)
}

/// Stock ledger service
#[derive(Clone)]
pub struct StockLedger {
    ctx: LedgerContext,
}

impl StockLedger {
    /// Create a new StockLedger instance
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    /// Apply a single delta in its own unit of work
    pub async fn apply_delta(
        &self,
        branch_id: BranchId,
        product_id: ProductId,
        delta: i64,
        movement: &MovementContext,
    ) -> AppResult<StockEntry> {
        let mut entries = self
            .apply_batch(&[StockDelta::new(branch_id, product_id, delta)], movement)
            .await?;
        entries
            .pop()
            .ok_or_else(|| AppError::Internal("Ledger returned no entry".to_string()))
    }

    /// Apply a batch of deltas in one all-or-nothing unit of work
    pub async fn apply_batch(
        &self,
        deltas: &[StockDelta],
        movement: &MovementContext,
    ) -> AppResult<Vec<StockEntry>> {
        let mut unit = self.ctx.store.begin().await?;
        let entries = apply_deltas(unit.as_mut(), deltas, movement).await?;
        unit.commit().await?;
        Ok(entries)
    }

    /// Restock or correct a branch's stock by hand
    pub async fn adjust(&self, actor: &Actor, input: AdjustStockInput) -> AppResult<StockEntry> {
        input.validate()?;
        authorize(
            self.ctx.policy.as_ref(),
            actor,
            Operation::AdjustStock,
            &Resource::Branch(input.branch_id),
        )?;

        let movement =
            MovementContext::new(MovementReason::Adjustment, actor.id).with_note(input.note.clone());
        let entry = self
            .apply_delta(input.branch_id, input.product_id, input.delta, &movement)
            .await?;

        tracing::info!(
            branch_id = entry.branch_id,
            product_id = entry.product_id,
            delta = input.delta,
            quantity = entry.quantity,
            "Stock adjusted"
        );
        self.ctx.events.publish(InventoryEvent::StockAdjusted {
            branch_id: entry.branch_id,
            product_id: entry.product_id,
            delta: input.delta,
            quantity: entry.quantity,
        });

        Ok(entry)
    }

    /// Update location and variation attributes of an existing entry
    pub async fn update_details(
        &self,
        actor: &Actor,
        input: StockDetailsInput,
    ) -> AppResult<StockEntry> {
        input.validate()?;
        if let Some(variations) = &input.variations {
            if !variations.is_object() {
                return Err(AppError::validation(
                    "variations",
                    "Variations must be a JSON object",
                ));
            }
        }
        authorize(
            self.ctx.policy.as_ref(),
            actor,
            Operation::AdjustStock,
            &Resource::Branch(input.branch_id),
        )?;

        let key = StockKey::new(input.branch_id, input.product_id);
        let mut unit = self.ctx.store.begin().await?;
        let mut entry = unit
            .lock_stock(key, false)
            .await?
            .ok_or(AppError::ProductNotStocked {
                branch_id: key.branch_id,
                product_id: key.product_id,
            })?;

        entry.location = input.location;
        entry.variations = input.variations;
        entry.updated_at = Utc::now();
        unit.save_stock(&entry).await?;
        unit.commit().await?;

        Ok(entry)
    }

    /// Current quantity; zero when the product was never stocked here
    pub async fn stock_level(&self, branch_id: BranchId, product_id: ProductId) -> AppResult<i64> {
        Ok(self
            .ctx
            .store
            .stock_entry(StockKey::new(branch_id, product_id))
            .await?
            .map(|entry| entry.quantity)
            .unwrap_or(0))
    }

    pub async fn stock_entry(
        &self,
        branch_id: BranchId,
        product_id: ProductId,
    ) -> AppResult<StockEntry> {
        self.ctx
            .store
            .stock_entry(StockKey::new(branch_id, product_id))
            .await?
            .ok_or(AppError::ProductNotStocked {
                branch_id,
                product_id,
            })
    }

    pub async fn branch_stock(&self, branch_id: BranchId) -> AppResult<Vec<StockEntry>> {
        self.ctx.store.branch_stock(branch_id).await
    }

    /// Entries at or below `threshold` (the configured default when `None`)
    pub async fn low_stock(
        &self,
        branch_id: BranchId,
        threshold: Option<i64>,
    ) -> AppResult<Vec<StockEntry>> {
        let threshold = threshold.unwrap_or(self.ctx.config.low_stock_threshold);
        let mut entries: Vec<StockEntry> = self
            .ctx
            .store
            .branch_stock(branch_id)
            .await?
            .into_iter()
            .filter(|entry| entry.quantity <= threshold)
            .collect();
        entries.sort_by_key(|entry| (entry.quantity, entry.product_id));
        Ok(entries)
    }

    /// Movement history for a branch, newest first
    pub async fn movements(
        &self,
        branch_id: BranchId,
        product_id: Option<ProductId>,
    ) -> AppResult<Vec<StockMovement>> {
        self.ctx.store.movements(branch_id, product_id).await
    }
}
