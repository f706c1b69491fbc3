//! Domain events published after a ledger operation commits
//!
//! Workflows hand events to an [`EventSink`] and never wait on delivery. The
//! default sink is a bounded channel drained by a notifier task, so a slow or
//! failing notifier cannot affect committed stock or workflow state.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use shared::{ActorId, BranchId, ProductId};

/// Events emitted by the ledger workflows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryEvent {
    SaleReadied {
        sale_id: Uuid,
        branch_id: BranchId,
    },
    SaleCompleted {
        sale_id: Uuid,
        branch_id: BranchId,
        approved_by: ActorId,
    },
    SaleCancelled {
        sale_id: Uuid,
        branch_id: BranchId,
    },
    ReturnRecorded {
        return_id: Uuid,
        sale_id: Uuid,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    },
    TransferCreated {
        transfer_id: Uuid,
        source_branch_id: BranchId,
        destination_branch_id: BranchId,
    },
    TransferInitiated {
        transfer_id: Uuid,
        source_branch_id: BranchId,
        destination_branch_id: BranchId,
    },
    TransferRejected {
        transfer_id: Uuid,
        source_branch_id: BranchId,
    },
    TransferReceived {
        transfer_id: Uuid,
        destination_branch_id: BranchId,
        received_by: ActorId,
    },
    StockAdjusted {
        branch_id: BranchId,
        product_id: ProductId,
        delta: i64,
        quantity: i64,
    },
}

impl InventoryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InventoryEvent::SaleReadied { .. } => "sale_readied",
            InventoryEvent::SaleCompleted { .. } => "sale_completed",
            InventoryEvent::SaleCancelled { .. } => "sale_cancelled",
            InventoryEvent::ReturnRecorded { .. } => "return_recorded",
            InventoryEvent::TransferCreated { .. } => "transfer_created",
            InventoryEvent::TransferInitiated { .. } => "transfer_initiated",
            InventoryEvent::TransferRejected { .. } => "transfer_rejected",
            InventoryEvent::TransferReceived { .. } => "transfer_received",
            InventoryEvent::StockAdjusted { .. } => "stock_adjusted",
        }
    }
}

/// Outbound side of the notification queue. Must not block or fail the caller.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: InventoryEvent);
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: InventoryEvent) {}
}

/// Bounded channel sink. A full or closed queue drops the event with a warning.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<InventoryEvent>,
}

impl EventSender {
    /// Creates a sender and the receiver a notifier should drain
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<InventoryEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl EventSink for EventSender {
    fn publish(&self, event: InventoryEvent) {
        if let Err(e) = self.sender.try_send(event) {
            let dropped = match &e {
                mpsc::error::TrySendError::Full(event) => event.name(),
                mpsc::error::TrySendError::Closed(event) => event.name(),
            };
            tracing::warn!(event = dropped, "Dropping inventory event: {}", e);
        }
    }
}

/// Consumer of published events (push notifications, webhooks, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &InventoryEvent) -> anyhow::Result<()>;
}

/// Notifier that only writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, event: &InventoryEvent) -> anyhow::Result<()> {
        tracing::info!(event = event.name(), "{:?}", event);
        Ok(())
    }
}

/// Drain `receiver` into `notifier` until every sender is dropped. Delivery
/// failures are logged and skipped.
pub fn spawn_notifier(
    mut receiver: mpsc::Receiver<InventoryEvent>,
    notifier: Arc<dyn Notifier>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            if let Err(e) = notifier.notify(&event).await {
                tracing::error!(event = event.name(), "Failed to deliver notification: {:#}", e);
            }
        }
        tracing::debug!("Inventory event channel closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyNotifier {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn notify(&self, event: &InventoryEvent) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(event.name());
            if matches!(event, InventoryEvent::SaleReadied { .. }) {
                anyhow::bail!("push gateway unavailable");
            }
            Ok(())
        }
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (sender, mut receiver) = EventSender::channel(1);
        let event = InventoryEvent::SaleCancelled {
            sale_id: Uuid::new_v4(),
            branch_id: 1,
        };
        sender.publish(event.clone());
        sender.publish(event.clone());

        assert_eq!(receiver.try_recv().unwrap(), event);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (sender, receiver) = EventSender::channel(4);
        drop(receiver);
        sender.publish(InventoryEvent::SaleReadied {
            sale_id: Uuid::new_v4(),
            branch_id: 1,
        });
    }

    #[tokio::test]
    async fn test_logging_notifier_drains_queue() {
        let (sender, receiver) = EventSender::channel(4);
        let handle = spawn_notifier(receiver, Arc::new(LoggingNotifier));
        sender.publish(InventoryEvent::StockAdjusted {
            branch_id: 1,
            product_id: 7,
            delta: 5,
            quantity: 5,
        });
        drop(sender);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_notifier_failures_do_not_stop_the_loop() {
        let (sender, receiver) = EventSender::channel(8);
        let notifier = Arc::new(FlakyNotifier {
            seen: Mutex::new(Vec::new()),
        });
        let handle = spawn_notifier(receiver, notifier.clone());

        sender.publish(InventoryEvent::SaleReadied {
            sale_id: Uuid::new_v4(),
            branch_id: 1,
        });
        sender.publish(InventoryEvent::SaleCancelled {
            sale_id: Uuid::new_v4(),
            branch_id: 1,
        });
        drop(sender);
        handle.await.unwrap();

        assert_eq!(
            *notifier.seen.lock().unwrap(),
            vec!["sale_readied", "sale_cancelled"]
        );
    }
}
