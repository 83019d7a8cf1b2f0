//! Short-TTL in-process cache for hot quote lookups, the last published
//! opportunity set and the weekly averages.
//!
//! The cache is an accelerator only. Every reader has a store fallback.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{Opportunity, Quote, WeeklyAverage};

/// A value with an absolute expiry.
#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn live(&self, now: Instant) -> Option<T> {
        (now < self.expires_at).then(|| self.value.clone())
    }
}

/// Shared, non-authoritative cache. Keyed by (item id, city id).
#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: RwLock<HashMap<(i64, i64), Expiring<Quote>>>,
    opportunities: RwLock<Option<Expiring<Vec<Opportunity>>>>,
    weekly_averages: RwLock<Option<Expiring<Vec<WeeklyAverage>>>>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Quotes ----------------------------------------------------------

    pub async fn get_quote(&self, item_id: i64, city_id: i64) -> Option<Quote> {
        let quotes = self.quotes.read().await;
        quotes
            .get(&(item_id, city_id))
            .and_then(|entry| entry.live(Instant::now()))
    }

    pub async fn put_quote(&self, quote: Quote, ttl: Duration) {
        let key = (quote.item_id, quote.city_id);
        self.quotes.write().await.insert(key, Expiring::new(quote, ttl));
    }

    /// Drop expired quote entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut quotes = self.quotes.write().await;
        let before = quotes.len();
        quotes.retain(|_, entry| now < entry.expires_at);
        let removed = before - quotes.len();
        if removed > 0 {
            debug!(removed, "Expired quote cache entries purged");
        }
        removed
    }

    pub async fn quote_count(&self) -> usize {
        self.quotes.read().await.len()
    }

    // -- Opportunity set -------------------------------------------------

    pub async fn get_opportunities(&self) -> Option<Vec<Opportunity>> {
        self.opportunities
            .read()
            .await
            .as_ref()
            .and_then(|entry| entry.live(Instant::now()))
    }

    /// Replace the cached set wholesale.
    pub async fn put_opportunities(&self, opportunities: Vec<Opportunity>, ttl: Duration) {
        *self.opportunities.write().await = Some(Expiring::new(opportunities, ttl));
    }

    // -- Weekly averages -------------------------------------------------

    pub async fn get_weekly_averages(&self) -> Option<Vec<WeeklyAverage>> {
        self.weekly_averages
            .read()
            .await
            .as_ref()
            .and_then(|entry| entry.live(Instant::now()))
    }

    pub async fn put_weekly_averages(&self, averages: Vec<WeeklyAverage>, ttl: Duration) {
        *self.weekly_averages.write().await = Some(Expiring::new(averages, ttl));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
