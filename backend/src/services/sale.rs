//! Sale workflow: readied sales are approved (deducting stock) or cancelled

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use shared::{
    validate_item_lines, Actor, BranchId, MovementReason, ReadySaleInput, Sale, SaleItem,
    SaleStatus, StockDelta,
};

use super::authorization::{authorize, Operation, Resource};
use super::stock_ledger::{apply_deltas, MovementContext};
use super::LedgerContext;
use crate::error::{AppError, AppResult};
use crate::events::InventoryEvent;
use crate::store::SaleFilter;

/// Sale workflow service
#[derive(Clone)]
pub struct SaleWorkflow {
    ctx: LedgerContext,
}

impl SaleWorkflow {
    /// Create a new SaleWorkflow instance
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    /// Record a sale awaiting approval. Stock is not touched.
    pub async fn ready(&self, actor: &Actor, input: ReadySaleInput) -> AppResult<Sale> {
        if actor.branch_id.is_none() {
            return Err(AppError::NoBranchAssigned);
        }
        validate_item_lines(&input.items).map_err(|msg| AppError::validation("items", msg))?;
        input.validate()?;
        authorize(
            self.ctx.policy.as_ref(),
            actor,
            Operation::ReadySale,
            &Resource::Branch(input.branch_id),
        )?;

        let now = Utc::now();
        let sale = Sale {
            id: Uuid::new_v4(),
            branch_id: input.branch_id,
            status: SaleStatus::Readied,
            readied_by: actor.id,
            approved_by: None,
            notes: input.notes,
            items: input.items.into_iter().map(SaleItem::from).collect(),
            created_at: now,
            updated_at: now,
        };

        let mut unit = self.ctx.store.begin().await?;
        unit.insert_sale(&sale).await?;
        unit.commit().await?;

        tracing::info!(sale_id = %sale.id, branch_id = sale.branch_id, items = sale.items.len(), "Sale readied");
        self.ctx.events.publish(InventoryEvent::SaleReadied {
            sale_id: sale.id,
            branch_id: sale.branch_id,
        });

        Ok(sale)
    }

    /// Approve a readied sale, deducting every item from the branch's stock.
    /// On any shortfall the sale stays readied and no stock moves.
    pub async fn approve(&self, actor: &Actor, sale_id: Uuid) -> AppResult<Sale> {
        let mut unit = self.ctx.store.begin().await?;
        let mut sale = unit
            .lock_sale(sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;

        authorize(
            self.ctx.policy.as_ref(),
            actor,
            Operation::ApproveSale,
            &Resource::Sale {
                branch_id: sale.branch_id,
            },
        )?;
        ensure_transition(&sale, SaleStatus::Completed)?;

        let deltas: Vec<StockDelta> = sale
            .items
            .iter()
            .map(|item| StockDelta::new(sale.branch_id, item.product_id, -item.quantity))
            .collect();
        let movement = MovementContext::new(MovementReason::Sale, actor.id).referencing(sale.id);
        apply_deltas(unit.as_mut(), &deltas, &movement).await?;

        sale.status = SaleStatus::Completed;
        sale.approved_by = Some(actor.id);
        sale.updated_at = Utc::now();
        unit.update_sale(&sale).await?;
        unit.commit().await?;

        tracing::info!(
            sale_id = %sale.id,
            branch_id = sale.branch_id,
            approved_by = actor.id,
            quantity = sale.total_quantity(),
            "Sale completed"
        );
        self.ctx.events.publish(InventoryEvent::SaleCompleted {
            sale_id: sale.id,
            branch_id: sale.branch_id,
            approved_by: actor.id,
        });

        Ok(sale)
    }

    /// Cancel a readied sale. No ledger effect.
    pub async fn cancel(&self, actor: &Actor, sale_id: Uuid) -> AppResult<Sale> {
        let mut unit = self.ctx.store.begin().await?;
        let mut sale = unit
            .lock_sale(sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;

        authorize(
            self.ctx.policy.as_ref(),
            actor,
            Operation::CancelSale,
            &Resource::Sale {
                branch_id: sale.branch_id,
            },
        )?;
        ensure_transition(&sale, SaleStatus::Cancelled)?;

        sale.status = SaleStatus::Cancelled;
        sale.updated_at = Utc::now();
        unit.update_sale(&sale).await?;
        unit.commit().await?;

        tracing::info!(sale_id = %sale.id, branch_id = sale.branch_id, "Sale cancelled");
        self.ctx.events.publish(InventoryEvent::SaleCancelled {
            sale_id: sale.id,
            branch_id: sale.branch_id,
        });

        Ok(sale)
    }

    /// Get sale by ID
    pub async fn get(&self, sale_id: Uuid) -> AppResult<Sale> {
        self.ctx
            .store
            .sale(sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Sale".to_string()))
    }

    /// List a branch's sales, newest first
    pub async fn list(
        &self,
        branch_id: BranchId,
        status: Option<SaleStatus>,
    ) -> AppResult<Vec<Sale>> {
        self.ctx
            .store
            .sales(SaleFilter {
                branch_id: Some(branch_id),
                status,
            })
            .await
    }
}

fn ensure_transition(sale: &Sale, next: SaleStatus) -> AppResult<()> {
    if sale.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "Sale {} is {}, cannot become {}",
            sale.id, sale.status, next
        )))
    }
}
