//! Market-data feeds.
//!
//! A feed yields batches of raw orders which the ingestor reduces into
//! quotes. `albion` polls the public Albion Online Data REST API.

pub mod albion;

use async_trait::async_trait;

use crate::types::{ArbError, RawOrder};

pub use albion::AlbionDataClient;

/// Source of raw market order batches.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Fetch the next batch. An empty batch is not an error.
    async fn fetch_orders(&self) -> Result<Vec<RawOrder>, ArbError>;

    /// Feed name for logging and identification.
    fn name(&self) -> &str;
}
