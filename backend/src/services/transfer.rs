//! Transfer workflow
//!
//! Stock leaves the source branch when a transfer is initiated and arrives at
//! the destination when receipt is confirmed. While outgoing, the quantity is
//! in transit and counted at neither branch.

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use shared::{
    validate_item_lines, validate_transfer_branches, Actor, BranchId, CreateTransferInput,
    MovementReason, StockDelta, Transfer, TransferDirection, TransferItem, TransferItemStatus,
    TransferStatus,
};

use super::authorization::{authorize, Operation, Resource};
use super::stock_ledger::{apply_deltas, MovementContext};
use super::LedgerContext;
use crate::error::{AppError, AppResult};
use crate::events::InventoryEvent;

/// Transfer workflow service
#[derive(Clone)]
pub struct TransferWorkflow {
    ctx: LedgerContext,
}

impl TransferWorkflow {
    /// Create a new TransferWorkflow instance
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    /// Ready a transfer from the actor's branch. No stock moves yet.
    pub async fn create(&self, actor: &Actor, input: CreateTransferInput) -> AppResult<Transfer> {
        if actor.branch_id.is_none() {
            return Err(AppError::NoBranchAssigned);
        }
        validate_transfer_branches(input.source_branch_id, input.destination_branch_id)
            .map_err(|msg| AppError::validation("destination_branch_id", msg))?;
        validate_item_lines(&input.items).map_err(|msg| AppError::validation("items", msg))?;
        input.validate()?;
        authorize(
            self.ctx.policy.as_ref(),
            actor,
            Operation::CreateTransfer,
            &resource_of(input.source_branch_id, input.destination_branch_id),
        )?;

        let now = Utc::now();
        let transfer = Transfer {
            id: Uuid::new_v4(),
            source_branch_id: input.source_branch_id,
            destination_branch_id: input.destination_branch_id,
            status: TransferStatus::Readied,
            readied_by: actor.id,
            approved_by: None,
            received_by: None,
            notes: input.notes,
            items: input.items.into_iter().map(TransferItem::from).collect(),
            created_at: now,
            updated_at: now,
        };

        let mut unit = self.ctx.store.begin().await?;
        unit.insert_transfer(&transfer).await?;
        unit.commit().await?;

        tracing::info!(
            transfer_id = %transfer.id,
            source_branch_id = transfer.source_branch_id,
            destination_branch_id = transfer.destination_branch_id,
            "Transfer readied"
        );
        self.ctx.events.publish(InventoryEvent::TransferCreated {
            transfer_id: transfer.id,
            source_branch_id: transfer.source_branch_id,
            destination_branch_id: transfer.destination_branch_id,
        });

        Ok(transfer)
    }

    /// Send a readied transfer, deducting every item at the source branch.
    /// A shortfall on any item leaves the transfer readied and stock untouched.
    pub async fn initiate(&self, actor: &Actor, transfer_id: Uuid) -> AppResult<Transfer> {
        if actor.branch_id.is_none() {
            return Err(AppError::NoBranchAssigned);
        }
        let mut unit = self.ctx.store.begin().await?;
        let mut transfer = unit
            .lock_transfer(transfer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        authorize(
            self.ctx.policy.as_ref(),
            actor,
            Operation::InitiateTransfer,
            &resource(&transfer),
        )?;
        ensure_transition(&transfer, TransferStatus::Outgoing)?;

        let deltas: Vec<StockDelta> = transfer
            .items
            .iter()
            .map(|item| {
                StockDelta::new(transfer.source_branch_id, item.product_id, -item.quantity)
            })
            .collect();
        let movement =
            MovementContext::new(MovementReason::TransferOut, actor.id).referencing(transfer.id);
        // The source never had the product at all: report it as an empty shelf
        apply_deltas(unit.as_mut(), &deltas, &movement)
            .await
            .map_err(|err| match err {
                AppError::ProductNotStocked {
                    branch_id,
                    product_id,
                } => AppError::InsufficientStock {
                    branch_id,
                    product_id,
                    available: 0,
                    requested: transfer
                        .items
                        .iter()
                        .find(|item| item.product_id == product_id)
                        .map_or(0, |item| item.quantity),
                },
                other => other,
            })?;

        transfer.status = TransferStatus::Outgoing;
        transfer.approved_by = Some(actor.id);
        transfer.updated_at = Utc::now();
        unit.update_transfer(&transfer).await?;
        unit.commit().await?;

        tracing::info!(
            transfer_id = %transfer.id,
            source_branch_id = transfer.source_branch_id,
            approved_by = actor.id,
            "Transfer outgoing"
        );
        self.ctx.events.publish(InventoryEvent::TransferInitiated {
            transfer_id: transfer.id,
            source_branch_id: transfer.source_branch_id,
            destination_branch_id: transfer.destination_branch_id,
        });

        Ok(transfer)
    }

    /// Reject a readied transfer. No ledger effect.
    pub async fn reject(&self, actor: &Actor, transfer_id: Uuid) -> AppResult<Transfer> {
        if actor.branch_id.is_none() {
            return Err(AppError::NoBranchAssigned);
        }
        let mut unit = self.ctx.store.begin().await?;
        let mut transfer = unit
            .lock_transfer(transfer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        authorize(
            self.ctx.policy.as_ref(),
            actor,
            Operation::RejectTransfer,
            &resource(&transfer),
        )?;
        ensure_transition(&transfer, TransferStatus::Rejected)?;

        transfer.status = TransferStatus::Rejected;
        transfer.updated_at = Utc::now();
        unit.update_transfer(&transfer).await?;
        unit.commit().await?;

        tracing::info!(transfer_id = %transfer.id, "Transfer rejected");
        self.ctx.events.publish(InventoryEvent::TransferRejected {
            transfer_id: transfer.id,
            source_branch_id: transfer.source_branch_id,
        });

        Ok(transfer)
    }

    /// Confirm full receipt at the destination branch, crediting every item there
    pub async fn confirm_receipt(&self, actor: &Actor, transfer_id: Uuid) -> AppResult<Transfer> {
        if actor.branch_id.is_none() {
            return Err(AppError::NoBranchAssigned);
        }
        let mut unit = self.ctx.store.begin().await?;
        let mut transfer = unit
            .lock_transfer(transfer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        authorize(
            self.ctx.policy.as_ref(),
            actor,
            Operation::ConfirmReceipt,
            &resource(&transfer),
        )?;
        ensure_transition(&transfer, TransferStatus::Completed)?;

        let deltas: Vec<StockDelta> = transfer
            .items
            .iter()
            .map(|item| {
                StockDelta::new(transfer.destination_branch_id, item.product_id, item.quantity)
            })
            .collect();
        let movement =
            MovementContext::new(MovementReason::TransferIn, actor.id).referencing(transfer.id);
        apply_deltas(unit.as_mut(), &deltas, &movement).await?;

        for item in transfer.items.iter_mut() {
            item.received_quantity = item.quantity;
            item.item_status = TransferItemStatus::Received;
        }
        transfer.status = TransferStatus::Completed;
        transfer.received_by = Some(actor.id);
        transfer.updated_at = Utc::now();
        unit.update_transfer(&transfer).await?;
        unit.commit().await?;

        tracing::info!(
            transfer_id = %transfer.id,
            destination_branch_id = transfer.destination_branch_id,
            received_by = actor.id,
            "Transfer received"
        );
        self.ctx.events.publish(InventoryEvent::TransferReceived {
            transfer_id: transfer.id,
            destination_branch_id: transfer.destination_branch_id,
            received_by: actor.id,
        });

        Ok(transfer)
    }

    /// Get transfer by ID
    pub async fn get(&self, transfer_id: Uuid) -> AppResult<Transfer> {
        self.ctx
            .store
            .transfer(transfer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))
    }

    /// List transfers touching a branch, newest first
    pub async fn list(
        &self,
        branch_id: BranchId,
        direction: TransferDirection,
    ) -> AppResult<Vec<Transfer>> {
        self.ctx.store.transfers(branch_id, direction).await
    }
}

fn resource_of(source_branch_id: BranchId, destination_branch_id: BranchId) -> Resource {
    Resource::Transfer {
        source_branch_id,
        destination_branch_id,
    }
}

fn resource(transfer: &Transfer) -> Resource {
    resource_of(transfer.source_branch_id, transfer.destination_branch_id)
}

fn ensure_transition(transfer: &Transfer, next: TransferStatus) -> AppResult<()> {
    if transfer.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "Transfer {} is {}, cannot become {}",
            transfer.id, transfer.status, next
        )))
    }
}
