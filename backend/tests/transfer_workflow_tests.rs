//! Transfer workflow tests
//!
//! Tests for readied -> outgoing -> completed (or rejected) including:
//! - Source deduction on initiate, destination credit on receipt
//! - Conservation of the chain-wide quantity once a transfer completes
//! - Only the owning branch may drive each leg

mod common;

use common::*;
use proptest::prelude::*;

use branch_inventory::AppError;
use shared::{
    Actor, CreateTransferInput, MovementReason, Transfer, TransferDirection, TransferItemStatus,
    TransferStatus,
};

fn transfer_input(source: i64, destination: i64, items: &[(i64, i64)]) -> CreateTransferInput {
    CreateTransferInput {
        source_branch_id: source,
        destination_branch_id: destination,
        items: lines(items),
        notes: None,
    }
}

async fn readied(l: &Ledger, items: &[(i64, i64)]) -> Transfer {
    l.transfers
        .create(&clerk(5, 1), transfer_input(1, 2, items))
        .await
        .unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Initiate moves stock out of the source, receipt brings it in
    #[tokio::test]
    async fn test_full_transfer_lifecycle() {
        let l = ledger();
        seed(&l, 1, 7, 4).await;
        let transfer = readied(&l, &[(7, 3)]).await;
        assert_eq!(transfer.status, TransferStatus::Readied);
        assert_eq!(level(&l, 1, 7).await, 4);

        let outgoing = l.transfers.initiate(&clerk(5, 1), transfer.id).await.unwrap();
        assert_eq!(outgoing.status, TransferStatus::Outgoing);
        assert_eq!(outgoing.approved_by, Some(5));
        assert_eq!(level(&l, 1, 7).await, 1);
        assert_eq!(level(&l, 2, 7).await, 0);

        let completed = l
            .transfers
            .confirm_receipt(&clerk(8, 2), transfer.id)
            .await
            .unwrap();
        assert_eq!(completed.status, TransferStatus::Completed);
        assert_eq!(completed.received_by, Some(8));
        assert_eq!(completed.items[0].received_quantity, 3);
        assert_eq!(completed.items[0].item_status, TransferItemStatus::Received);
        assert_eq!(level(&l, 1, 7).await, 1);
        assert_eq!(level(&l, 2, 7).await, 3);

        assert_eq!(
            l.events.names(),
            vec!["transfer_created", "transfer_initiated", "transfer_received"]
        );
    }

    #[tokio::test]
    async fn test_movements_reference_transfer() {
        let l = ledger();
        seed(&l, 1, 7, 4).await;
        let transfer = readied(&l, &[(7, 3)]).await;
        l.transfers.initiate(&clerk(5, 1), transfer.id).await.unwrap();
        l.transfers.confirm_receipt(&clerk(8, 2), transfer.id).await.unwrap();

        let out = l.stock.movements(1, Some(7)).await.unwrap();
        assert_eq!(out[0].reason, MovementReason::TransferOut);
        assert_eq!(out[0].reference_id, Some(transfer.id));

        let incoming = l.stock.movements(2, Some(7)).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].reason, MovementReason::TransferIn);
        assert_eq!(incoming[0].delta, 3);
    }

    /// Rejecting an outgoing transfer is not allowed and changes nothing
    #[tokio::test]
    async fn test_reject_outgoing_fails() {
        let l = ledger();
        seed(&l, 1, 7, 4).await;
        let transfer = readied(&l, &[(7, 3)]).await;
        l.transfers.initiate(&clerk(5, 1), transfer.id).await.unwrap();

        let err = l.transfers.reject(&clerk(5, 1), transfer.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert_eq!(
            l.transfers.get(transfer.id).await.unwrap().status,
            TransferStatus::Outgoing
        );
        assert_eq!(level(&l, 1, 7).await, 1);
    }

    #[tokio::test]
    async fn test_reject_readied_transfer() {
        let l = ledger();
        seed(&l, 1, 7, 4).await;
        let transfer = readied(&l, &[(7, 3)]).await;

        let rejected = l.transfers.reject(&clerk(5, 1), transfer.id).await.unwrap();
        assert_eq!(rejected.status, TransferStatus::Rejected);
        assert_eq!(level(&l, 1, 7).await, 4);

        let err = l.transfers.initiate(&clerk(5, 1), transfer.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    /// One short line keeps the transfer readied and every shelf untouched
    #[tokio::test]
    async fn test_initiate_is_all_or_nothing() {
        let l = ledger();
        seed(&l, 1, 7, 4).await;
        seed(&l, 1, 8, 1).await;
        let transfer = readied(&l, &[(7, 3), (8, 2)]).await;

        let err = l.transfers.initiate(&clerk(5, 1), transfer.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientStock {
                product_id: 8,
                available: 1,
                requested: 2,
                ..
            }
        ));
        assert_eq!(level(&l, 1, 7).await, 4);
        assert_eq!(level(&l, 1, 8).await, 1);
        assert_eq!(
            l.transfers.get(transfer.id).await.unwrap().status,
            TransferStatus::Readied
        );
    }

    /// A product the source never stocked reads as an empty shelf
    #[tokio::test]
    async fn test_initiate_unstocked_product() {
        let l = ledger();
        let transfer = readied(&l, &[(7, 3)]).await;

        let err = l.transfers.initiate(&clerk(5, 1), transfer.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientStock {
                available: 0,
                requested: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_destination_cannot_initiate() {
        let l = ledger();
        seed(&l, 1, 7, 4).await;
        let transfer = readied(&l, &[(7, 3)]).await;

        let err = l.transfers.initiate(&clerk(8, 2), transfer.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert_eq!(level(&l, 1, 7).await, 4);
    }

    #[tokio::test]
    async fn test_source_cannot_confirm_receipt() {
        let l = ledger();
        seed(&l, 1, 7, 4).await;
        let transfer = readied(&l, &[(7, 3)]).await;
        l.transfers.initiate(&clerk(5, 1), transfer.id).await.unwrap();

        let err = l
            .transfers
            .confirm_receipt(&clerk(5, 1), transfer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert_eq!(level(&l, 2, 7).await, 0);
    }

    #[tokio::test]
    async fn test_confirm_receipt_before_initiate_fails() {
        let l = ledger();
        seed(&l, 1, 7, 4).await;
        let transfer = readied(&l, &[(7, 3)]).await;

        let err = l
            .transfers
            .confirm_receipt(&clerk(8, 2), transfer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_same_branch() {
        let l = ledger();
        let err = l
            .transfers
            .create(&clerk(5, 1), transfer_input(1, 1, &[(7, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_create_from_other_branch_denied() {
        let l = ledger();
        let err = l
            .transfers
            .create(&clerk(8, 2), transfer_input(1, 2, &[(7, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_create_without_branch() {
        let l = ledger();
        let err = l
            .transfers
            .create(&Actor::new(5, None), transfer_input(1, 2, &[(7, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoBranchAssigned));
    }

    /// Every transfer leg needs an actor with a branch
    #[tokio::test]
    async fn test_legs_without_branch() {
        let l = ledger();
        seed(&l, 1, 7, 4).await;
        let transfer = readied(&l, &[(7, 3)]).await;
        let nobody = Actor::new(5, None);

        let reject = l.transfers.reject(&nobody, transfer.id).await.unwrap_err();
        assert!(matches!(reject, AppError::NoBranchAssigned));
        let initiate = l.transfers.initiate(&nobody, transfer.id).await.unwrap_err();
        assert!(matches!(initiate, AppError::NoBranchAssigned));
        let receipt = l
            .transfers
            .confirm_receipt(&nobody, transfer.id)
            .await
            .unwrap_err();
        assert!(matches!(receipt, AppError::NoBranchAssigned));

        assert_eq!(
            l.transfers.get(transfer.id).await.unwrap().status,
            TransferStatus::Readied
        );
    }

    #[tokio::test]
    async fn test_list_by_direction() {
        let l = ledger();
        readied(&l, &[(7, 1)]).await;
        l.transfers
            .create(&clerk(8, 2), transfer_input(2, 1, &[(7, 1)]))
            .await
            .unwrap();
        l.transfers
            .create(&clerk(8, 2), transfer_input(2, 3, &[(7, 1)]))
            .await
            .unwrap();

        assert_eq!(l.transfers.list(1, TransferDirection::Outgoing).await.unwrap().len(), 1);
        assert_eq!(l.transfers.list(1, TransferDirection::Incoming).await.unwrap().len(), 1);
        assert_eq!(l.transfers.list(1, TransferDirection::Any).await.unwrap().len(), 2);
        assert_eq!(l.transfers.list(2, TransferDirection::Outgoing).await.unwrap().len(), 2);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Completed transfers conserve the total across branches
        #[test]
        fn prop_completed_transfers_conserve_stock(
            initial in 1i64..60,
            quantities in prop::collection::vec(1i64..15, 1..8)
        ) {
            let l = ledger();

            let (source, destination) = tokio_test::block_on(async {
                seed(&l, 1, 7, initial).await;
                for quantity in &quantities {
                    let transfer = readied(&l, &[(7, *quantity)]).await;
                    if l.transfers.initiate(&clerk(5, 1), transfer.id).await.is_ok() {
                        l.transfers
                            .confirm_receipt(&clerk(8, 2), transfer.id)
                            .await
                            .unwrap();
                    }
                }
                (level(&l, 1, 7).await, level(&l, 2, 7).await)
            });

            prop_assert!(source >= 0);
            prop_assert_eq!(source + destination, initial);
        }

        /// While outgoing, the quantity is counted at neither branch
        #[test]
        fn prop_in_transit_quantity_counted_nowhere(
            initial in 1i64..60,
            quantity in 1i64..60
        ) {
            prop_assume!(quantity <= initial);
            let l = ledger();

            let (source, destination) = tokio_test::block_on(async {
                seed(&l, 1, 7, initial).await;
                let transfer = readied(&l, &[(7, quantity)]).await;
                l.transfers.initiate(&clerk(5, 1), transfer.id).await.unwrap();
                (level(&l, 1, 7).await, level(&l, 2, 7).await)
            });

            prop_assert_eq!(source, initial - quantity);
            prop_assert_eq!(destination, 0);
        }
    }
}
