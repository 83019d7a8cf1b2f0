//! Publication channel for completed engine runs.
//!
//! Each message carries the full replacement set, never a delta. Delivery is
//! best-effort: a receiver that lags behind loses the oldest snapshots.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::types::OpportunitySnapshot;

/// Snapshots buffered per receiver before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct Publisher {
    tx: broadcast::Sender<Arc<OpportunitySnapshot>>,
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Publisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<OpportunitySnapshot>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Broadcast a snapshot. Returns the number of receivers reached.
    pub fn publish(&self, snapshot: OpportunitySnapshot) -> usize {
        let run_id = snapshot.run_id.clone();
        match self.tx.send(Arc::new(snapshot)) {
            Ok(receivers) => {
                debug!(run_id = %run_id, receivers, "Opportunity snapshot published");
                receivers
            }
            Err(_) => {
                debug!(run_id = %run_id, "No subscribers for opportunity snapshot");
                0
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(run_id: &str) -> OpportunitySnapshot {
        OpportunitySnapshot {
            run_id: run_id.to_string(),
            computed_at: Utc::now(),
            opportunities: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let publisher = Publisher::default();
        assert_eq!(publisher.publish(snapshot("a")), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_full_snapshot() {
        let publisher = Publisher::new(4);
        let mut rx1 = publisher.subscribe();
        let mut rx2 = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 2);

        assert_eq!(publisher.publish(snapshot("run-1")), 2);
        assert_eq!(rx1.recv().await.unwrap().run_id, "run-1");
        assert_eq!(rx2.recv().await.unwrap().run_id, "run-1");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_loses_oldest() {
        let publisher = Publisher::new(1);
        let mut rx = publisher.subscribe();
        publisher.publish(snapshot("old"));
        publisher.publish(snapshot("new"));

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().run_id, "new");
    }
}
