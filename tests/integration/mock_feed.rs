//! Mock market feed for integration testing.
//!
//! Returns queued order batches in order, then empty batches. Can be told
//! to fail every fetch.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use alchemy_arb::market::MarketFeed;
use alchemy_arb::types::{ArbError, OrderSide, RawOrder};

pub struct MockFeed {
    batches: Arc<Mutex<VecDeque<Vec<RawOrder>>>>,
    /// If set, every fetch returns this error message.
    force_error: Arc<Mutex<Option<String>>>,
    fetches: Arc<Mutex<usize>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(VecDeque::new())),
            force_error: Arc::new(Mutex::new(None)),
            fetches: Arc::new(Mutex::new(0)),
        }
    }

    pub fn push_batch(&self, orders: Vec<RawOrder>) {
        self.batches.lock().unwrap().push_back(orders);
    }

    pub fn set_error(&self, message: Option<&str>) {
        *self.force_error.lock().unwrap() = message.map(String::from);
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl MarketFeed for MockFeed {
    async fn fetch_orders(&self) -> Result<Vec<RawOrder>, ArbError> {
        *self.fetches.lock().unwrap() += 1;
        if let Some(message) = self.force_error.lock().unwrap().clone() {
            return Err(ArbError::Feed {
                feed: self.name().to_string(),
                message,
            });
        }
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "mock-feed"
    }
}

pub fn ask(item: &str, location: &str, price: i64) -> RawOrder {
    RawOrder::new(item, location, OrderSide::Ask, price)
}

pub fn bid(item: &str, location: &str, price: i64) -> RawOrder {
    RawOrder::new(item, location, OrderSide::Bid, price)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mock_feed_drains_batches() {
    let feed = MockFeed::new();
    feed.push_batch(vec![ask("T5_ALCHEMY_RARE_PANTHER", "2004", 150)]);
    assert_eq!(feed.fetch_orders().await.unwrap().len(), 1);
    assert!(feed.fetch_orders().await.unwrap().is_empty());
    assert_eq!(feed.fetch_count(), 2);
}

#[tokio::test]
async fn test_mock_feed_forced_error() {
    let feed = MockFeed::new();
    feed.set_error(Some("connection reset"));
    let err = feed.fetch_orders().await.unwrap_err();
    assert!(err.to_string().contains("connection reset"));
    feed.set_error(None);
    assert!(feed.fetch_orders().await.is_ok());
}
