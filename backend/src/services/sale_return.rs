//! Return ledger: partial and full returns against completed sales

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use shared::{
    Actor, CreateReturnInput, MovementReason, ProductId, SaleReturn, SaleStatus, StockDelta,
};

use super::authorization::{authorize, Operation, Resource};
use super::stock_ledger::{apply_deltas, MovementContext};
use super::LedgerContext;
use crate::error::{AppError, AppResult};
use crate::events::InventoryEvent;

/// Return ledger service
#[derive(Clone)]
pub struct ReturnLedger {
    ctx: LedgerContext,
}

impl ReturnLedger {
    /// Create a new ReturnLedger instance
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    /// Record a return and put the goods back into the sale branch's stock.
    /// The record and the stock increment commit together.
    pub async fn create_return(
        &self,
        actor: &Actor,
        input: CreateReturnInput,
    ) -> AppResult<SaleReturn> {
        input.validate()?;

        let mut unit = self.ctx.store.begin().await?;
        // Locking the sale serializes concurrent returns against it
        let sale = unit
            .lock_sale(input.sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;

        authorize(
            self.ctx.policy.as_ref(),
            actor,
            Operation::CreateReturn,
            &Resource::Sale {
                branch_id: sale.branch_id,
            },
        )?;
        if sale.status != SaleStatus::Completed {
            return Err(AppError::InvalidTransition(format!(
                "Sale {} is {}, only completed sales accept returns",
                sale.id, sale.status
            )));
        }
        let sold = sale.item_quantity(input.product_id).ok_or_else(|| {
            AppError::validation("product_id", "Product was not sold on this sale")
        })?;

        let already_returned = unit.returned_quantity(sale.id, input.product_id).await?;
        if input.quantity > sold - already_returned {
            tracing::warn!(
                sale_id = %sale.id,
                product_id = input.product_id,
                sold,
                already_returned,
                requested = input.quantity,
                "Rejecting return"
            );
            return Err(AppError::ReturnExceedsSold {
                sale_id: sale.id,
                product_id: input.product_id,
                sold,
                already_returned,
                requested: input.quantity,
            });
        }

        let sale_return = SaleReturn {
            id: Uuid::new_v4(),
            sale_id: sale.id,
            product_id: input.product_id,
            quantity: input.quantity,
            returned_by: actor.id,
            reason: input.reason,
            created_at: Utc::now(),
        };
        unit.insert_return(&sale_return).await?;

        let movement = MovementContext::new(MovementReason::SaleReturn, actor.id)
            .referencing(sale_return.id)
            .with_note(sale_return.reason.clone());
        apply_deltas(
            unit.as_mut(),
            &[StockDelta::new(sale.branch_id, input.product_id, input.quantity)],
            &movement,
        )
        .await?;
        unit.commit().await?;

        tracing::info!(
            return_id = %sale_return.id,
            sale_id = %sale.id,
            product_id = sale_return.product_id,
            quantity = sale_return.quantity,
            "Sale return recorded"
        );
        self.ctx.events.publish(InventoryEvent::ReturnRecorded {
            return_id: sale_return.id,
            sale_id: sale.id,
            branch_id: sale.branch_id,
            product_id: sale_return.product_id,
            quantity: sale_return.quantity,
        });

        Ok(sale_return)
    }

    /// Returns recorded against a sale, oldest first
    pub async fn returns_for_sale(&self, sale_id: Uuid) -> AppResult<Vec<SaleReturn>> {
        self.ctx.store.sale_returns(sale_id).await
    }

    /// Quantity of a product that can still be returned on a sale
    pub async fn returnable_quantity(&self, sale_id: Uuid, product_id: ProductId) -> AppResult<i64> {
        let sale = self
            .ctx
            .store
            .sale(sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;
        if sale.status != SaleStatus::Completed {
            return Ok(0);
        }
        let Some(sold) = sale.item_quantity(product_id) else {
            return Ok(0);
        };

        let returned: i64 = self
            .ctx
            .store
            .sale_returns(sale_id)
            .await?
            .iter()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.quantity)
            .sum();

        Ok((sold - returned).max(0))
    }
}
