//! Quote resolution: cache first, durable store second.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::QuoteCache;
use crate::catalog::Catalog;
use crate::storage::PriceStore;
use crate::types::{ArbError, Quote};

/// Source of the current quote for an (item, city).
#[async_trait]
pub trait QuoteResolver: Send + Sync {
    async fn resolve(&self, item_id: i64, city_id: i64) -> Result<Option<Quote>, ArbError>;

    /// Resolve many keys at once. Absent keys are omitted from the result.
    async fn resolve_many(
        &self,
        keys: &[(i64, i64)],
    ) -> Result<HashMap<(i64, i64), Quote>, ArbError> {
        let mut found = HashMap::with_capacity(keys.len());
        for &(item_id, city_id) in keys {
            if let Some(quote) = self.resolve(item_id, city_id).await? {
                found.insert((item_id, city_id), quote);
            }
        }
        Ok(found)
    }
}

/// Resolver backed by the shared cache with the store as fallback.
///
/// A store hit populates the cache.
pub struct CachedResolver {
    store: Arc<dyn PriceStore>,
    cache: Arc<QuoteCache>,
    ttl: Duration,
}

impl CachedResolver {
    pub fn new(store: Arc<dyn PriceStore>, cache: Arc<QuoteCache>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }
}

#[async_trait]
impl QuoteResolver for CachedResolver {
    async fn resolve(&self, item_id: i64, city_id: i64) -> Result<Option<Quote>, ArbError> {
        if let Some(quote) = self.cache.get_quote(item_id, city_id).await {
            return Ok(Some(quote));
        }
        let quote = self.store.quote(item_id, city_id).await?;
        if let Some(q) = &quote {
            self.cache.put_quote(q.clone(), self.ttl).await;
        }
        Ok(quote)
    }

    /// Cache hits are served directly; all misses share one store read.
    async fn resolve_many(
        &self,
        keys: &[(i64, i64)],
    ) -> Result<HashMap<(i64, i64), Quote>, ArbError> {
        let mut found = HashMap::with_capacity(keys.len());
        let mut misses = Vec::new();
        for &key in keys {
            match self.cache.get_quote(key.0, key.1).await {
                Some(quote) => {
                    found.insert(key, quote);
                }
                None => misses.push(key),
            }
        }
        if misses.is_empty() {
            return Ok(found);
        }

        debug!(hits = found.len(), misses = misses.len(), "Resolving quotes from store");
        let mut stored: HashMap<(i64, i64), Quote> = HashMap::new();
        for quote in self.store.quotes().await? {
            if quote.quality == crate::types::DEFAULT_QUALITY {
                stored.insert((quote.item_id, quote.city_id), quote);
            }
        }
        for key in misses {
            if let Some(quote) = stored.remove(&key) {
                self.cache.put_quote(quote.clone(), self.ttl).await;
                found.insert(key, quote);
            }
        }
        Ok(found)
    }
}

/// Quotes resolved for every catalog item at every city, used by one run.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    quotes: HashMap<(i64, i64), Quote>,
}

impl PriceBook {
    pub async fn resolve(resolver: &dyn QuoteResolver, catalog: &Catalog) -> Result<Self, ArbError> {
        let keys: Vec<(i64, i64)> = catalog
            .items()
            .iter()
            .flat_map(|item| catalog.cities().iter().map(move |city| (item.id, city.id)))
            .collect();
        let quotes = resolver.resolve_many(&keys).await?;
        Ok(Self { quotes })
    }

    pub fn from_quotes(quotes: impl IntoIterator<Item = Quote>) -> Self {
        Self {
            quotes: quotes
                .into_iter()
                .map(|q| ((q.item_id, q.city_id), q))
                .collect(),
        }
    }

    pub fn get(&self, item_id: i64, city_id: i64) -> Option<&Quote> {
        self.quotes.get(&(item_id, city_id))
    }

    /// Cheapest ask, zero when absent.
    pub fn ask_min(&self, item_id: i64, city_id: i64) -> i64 {
        self.get(item_id, city_id).map_or(0, |q| q.ask_min)
    }

    /// Best bid, zero when absent.
    pub fn bid_max(&self, item_id: i64, city_id: i64) -> i64 {
        self.get(item_id, city_id).map_or(0, |q| q.bid_max)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
