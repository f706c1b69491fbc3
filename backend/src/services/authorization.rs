//! Authorization policy consulted by every mutating operation

use shared::{capabilities, Actor, BranchId};

use crate::error::{AppError, AppResult};

/// Operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ReadySale,
    ApproveSale,
    CancelSale,
    CreateReturn,
    CreateTransfer,
    InitiateTransfer,
    RejectTransfer,
    ConfirmReceipt,
    AdjustStock,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ReadySale => "ready_sale",
            Operation::ApproveSale => "approve_sale",
            Operation::CancelSale => "cancel_sale",
            Operation::CreateReturn => "create_return",
            Operation::CreateTransfer => "create_transfer",
            Operation::InitiateTransfer => "initiate_transfer",
            Operation::RejectTransfer => "reject_transfer",
            Operation::ConfirmReceipt => "confirm_receipt",
            Operation::AdjustStock => "adjust_stock",
        }
    }
}

/// What the operation acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Branch(BranchId),
    Sale {
        branch_id: BranchId,
    },
    Transfer {
        source_branch_id: BranchId,
        destination_branch_id: BranchId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    fn deny(reason: impl Into<String>) -> Self {
        Decision::Deny(reason.into())
    }

    fn require(allowed: bool, reason: &str) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::deny(reason)
        }
    }
}

/// Decides whether an actor may perform an operation on a resource
pub trait AuthorizationPolicy: Send + Sync {
    fn authorize(&self, actor: &Actor, operation: Operation, resource: &Resource) -> Decision;
}

/// Default policy: employees act on their own branch; approving sales and
/// adjusting stock need the matching capability; transfer legs belong to
/// the branch on that side of the transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchPolicy;

impl AuthorizationPolicy for BranchPolicy {
    fn authorize(&self, actor: &Actor, operation: Operation, resource: &Resource) -> Decision {
        match (operation, resource) {
            (Operation::ReadySale, Resource::Branch(branch_id))
            | (Operation::CancelSale, Resource::Sale { branch_id })
            | (Operation::CreateReturn, Resource::Sale { branch_id }) => Decision::require(
                actor.can_act_on(*branch_id),
                "actor does not belong to the sale's branch",
            ),
            (Operation::ApproveSale, Resource::Sale { branch_id }) => {
                if !actor.has_capability(capabilities::SALES_APPROVE) {
                    Decision::deny("actor cannot approve sales")
                } else {
                    Decision::require(
                        actor.can_act_on(*branch_id),
                        "actor cannot approve sales for this branch",
                    )
                }
            }
            (
                Operation::CreateTransfer | Operation::InitiateTransfer | Operation::RejectTransfer,
                Resource::Transfer {
                    source_branch_id, ..
                },
            ) => Decision::require(
                actor.branch_id == Some(*source_branch_id),
                "only the source branch may act on this transfer",
            ),
            (
                Operation::ConfirmReceipt,
                Resource::Transfer {
                    destination_branch_id,
                    ..
                },
            ) => Decision::require(
                actor.branch_id == Some(*destination_branch_id),
                "only the destination branch may confirm receipt",
            ),
            (Operation::AdjustStock, Resource::Branch(branch_id)) => {
                if !actor.has_capability(capabilities::STOCK_ADJUST) {
                    Decision::deny("actor cannot adjust stock")
                } else {
                    Decision::require(
                        actor.can_act_on(*branch_id),
                        "actor cannot adjust stock for this branch",
                    )
                }
            }
            _ => Decision::deny("resource does not match operation"),
        }
    }
}

/// Ask `policy` and turn a denial into `InvalidTransition`
pub fn authorize(
    policy: &dyn AuthorizationPolicy,
    actor: &Actor,
    operation: Operation,
    resource: &Resource,
) -> AppResult<()> {
    match policy.authorize(actor, operation, resource) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::warn!(
                actor_id = actor.id,
                operation = operation.as_str(),
                "Authorization denied: {}",
                reason
            );
            Err(AppError::InvalidTransition(format!(
                "{} not permitted: {}",
                operation.as_str(),
                reason
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(source: BranchId, destination: BranchId) -> Resource {
        Resource::Transfer {
            source_branch_id: source,
            destination_branch_id: destination,
        }
    }

    #[test]
    fn test_approve_requires_capability() {
        let clerk = Actor::new(1, Some(1));
        let admin = Actor::new(2, Some(1)).with_capability(capabilities::SALES_APPROVE);
        let sale = Resource::Sale { branch_id: 1 };

        assert!(matches!(
            BranchPolicy.authorize(&clerk, Operation::ApproveSale, &sale),
            Decision::Deny(_)
        ));
        assert_eq!(
            BranchPolicy.authorize(&admin, Operation::ApproveSale, &sale),
            Decision::Allow
        );
    }

    #[test]
    fn test_approver_of_other_branch_denied() {
        let admin = Actor::new(2, Some(2)).with_capability(capabilities::SALES_APPROVE);
        let sale = Resource::Sale { branch_id: 1 };
        assert!(matches!(
            BranchPolicy.authorize(&admin, Operation::ApproveSale, &sale),
            Decision::Deny(_)
        ));

        let head_office = admin.with_capability(capabilities::BRANCHES_ALL);
        assert_eq!(
            BranchPolicy.authorize(&head_office, Operation::ApproveSale, &sale),
            Decision::Allow
        );
    }

    #[test]
    fn test_transfer_legs_belong_to_their_branch() {
        let source = Actor::new(1, Some(1));
        let destination = Actor::new(2, Some(2));
        let resource = transfer(1, 2);

        assert_eq!(
            BranchPolicy.authorize(&source, Operation::InitiateTransfer, &resource),
            Decision::Allow
        );
        assert!(matches!(
            BranchPolicy.authorize(&destination, Operation::InitiateTransfer, &resource),
            Decision::Deny(_)
        ));
        assert_eq!(
            BranchPolicy.authorize(&destination, Operation::ConfirmReceipt, &resource),
            Decision::Allow
        );
        assert!(matches!(
            BranchPolicy.authorize(&source, Operation::ConfirmReceipt, &resource),
            Decision::Deny(_)
        ));
    }

    #[test]
    fn test_mismatched_resource_denied() {
        let actor = Actor::new(1, Some(1)).with_capability(capabilities::SALES_APPROVE);
        assert!(matches!(
            BranchPolicy.authorize(&actor, Operation::ApproveSale, &transfer(1, 2)),
            Decision::Deny(_)
        ));
    }

    #[test]
    fn test_denial_maps_to_invalid_transition() {
        let actor = Actor::new(1, Some(1));
        let err = authorize(
            &BranchPolicy,
            &actor,
            Operation::AdjustStock,
            &Resource::Branch(1),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }
}
