//! Persistence layer.
//!
//! `PriceStore` is the durable source of truth for reference data, quotes,
//! price history and the current opportunity set. `SqliteStore` implements
//! it over a pooled SQLite database.

pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    ArbError, City, Item, Opportunity, OpportunityFilter, PriceHistoryPoint, Quote, WeeklyAverage,
};

pub use sqlite::SqliteStore;

/// Abstraction over the durable store.
///
/// Every method is potentially blocking I/O; an `Err` means the store is
/// unavailable and the enclosing unit of work must abort.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// All items, ordered by id.
    async fn items(&self) -> Result<Vec<Item>, ArbError>;

    /// All cities, ordered by id.
    async fn cities(&self) -> Result<Vec<City>, ArbError>;

    /// Default-quality quote for one (item, city), if any.
    async fn quote(&self, item_id: i64, city_id: i64) -> Result<Option<Quote>, ArbError>;

    /// Every stored quote, ordered by (item, city, quality).
    async fn quotes(&self) -> Result<Vec<Quote>, ArbError>;

    /// Insert or supersede the quote for its (item, city, quality) key.
    async fn upsert_quote(&self, quote: &Quote) -> Result<(), ArbError>;

    async fn append_history(&self, point: &PriceHistoryPoint) -> Result<(), ArbError>;

    /// History points for one (item, city), oldest first.
    async fn price_history(
        &self,
        item_id: i64,
        city_id: i64,
    ) -> Result<Vec<PriceHistoryPoint>, ArbError>;

    /// Snapshot every current quote into history. Returns rows written.
    async fn rollover_history(&self, at: DateTime<Utc>) -> Result<u64, ArbError>;

    /// Mean buy/sell per (item, city) over history recorded at or after `since`.
    async fn weekly_averages(&self, since: DateTime<Utc>) -> Result<Vec<WeeklyAverage>, ArbError>;

    /// Atomically delete the current opportunity set and insert `opportunities`.
    ///
    /// On error nothing changes: readers keep seeing the previous set.
    async fn replace_opportunities(&self, opportunities: &[Opportunity]) -> Result<(), ArbError>;

    /// The committed set in insertion order.
    async fn opportunities(&self) -> Result<Vec<Opportunity>, ArbError>;

    /// Highest net profit first.
    async fn top_opportunities(&self, limit: u32) -> Result<Vec<Opportunity>, ArbError>;

    /// Rows matching `filter`, highest net profit first.
    async fn filtered_opportunities(
        &self,
        filter: &OpportunityFilter,
    ) -> Result<Vec<Opportunity>, ArbError>;
}
