//! Core domain types shared across the engine, storage and query surface.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// Conversion tier. Only these three tiers take part in conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    T3,
    T5,
    T7,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::T3, Tier::T5, Tier::T7];

    pub fn number(self) -> u8 {
        match self {
            Tier::T3 => 3,
            Tier::T5 => 5,
            Tier::T7 => 7,
        }
    }

    /// Quality prefix used in display names.
    pub fn prefix(self) -> &'static str {
        match self {
            Tier::T3 => "Rugged",
            Tier::T5 => "Fine",
            Tier::T7 => "Excellent",
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = ArbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Tier::T3),
            5 => Ok(Tier::T5),
            7 => Ok(Tier::T7),
            other => Err(ArbError::Decode(format!("unsupported tier {other}"))),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.number()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.number())
    }
}

/// A tradeable good. `family` and `tier` are assigned at seed time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    /// Feed identifier, e.g. `T5_ALCHEMY_RARE_PANTHER`.
    pub code: String,
    pub name: String,
    /// Family key linking the convertible tiers, e.g. `PANTHER`.
    pub family: String,
    pub tier: Tier,
    pub rarity: String,
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.family, self.tier)
    }
}

/// A trading location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    /// Location code used by the market-data feed.
    pub code: String,
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.code)
    }
}

// ---------------------------------------------------------------------------
// Quotes & raw orders
// ---------------------------------------------------------------------------

/// Quality grade used by the order feed (normal quality).
pub const DEFAULT_QUALITY: i64 = 1;

/// Current best prices for one (item, city, quality). Zero means "unknown".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub item_id: i64,
    pub city_id: i64,
    pub quality: i64,
    /// Cheapest standing sell offer (what an acquirer pays).
    pub ask_min: i64,
    /// Most expensive standing sell offer.
    pub ask_max: i64,
    /// Best standing buy request (what a seller receives).
    pub bid_max: i64,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "item={} city={} q{} ask={}..{} bid={}",
            self.item_id, self.city_id, self.quality, self.ask_min, self.ask_max, self.bid_max,
        )
    }
}

/// Order side as reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Standing buy request.
    #[serde(alias = "request")]
    Bid,
    /// Standing sell offer.
    #[serde(alias = "offer")]
    Ask,
}

/// One raw market order record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    #[serde(alias = "ItemTypeId")]
    pub item_id: String,
    /// Four-digit location code. Numeric codes from the push feed are
    /// zero-padded on the way in.
    #[serde(alias = "LocationId", deserialize_with = "location_code")]
    pub location_id: String,
    #[serde(alias = "AuctionType")]
    pub side: OrderSide,
    #[serde(alias = "UnitPriceSilver")]
    pub unit_price: i64,
    #[serde(default, alias = "Amount")]
    pub quantity: u32,
    #[serde(default, alias = "Expires")]
    pub expiry: Option<DateTime<Utc>>,
}

fn location_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Text(String),
        Number(u32),
    }

    Ok(match Code::deserialize(deserializer)? {
        Code::Text(code) => code,
        Code::Number(n) => format!("{n:04}"),
    })
}

impl RawOrder {
    pub fn new(item_id: &str, location_id: &str, side: OrderSide, unit_price: i64) -> Self {
        Self {
            item_id: item_id.to_string(),
            location_id: location_id.to_string(),
            side,
            unit_price,
            quantity: 1,
            expiry: None,
        }
    }
}

/// Outcome counters for one ingested batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub records_seen: usize,
    /// Records whose item is outside the monitored catalog.
    pub records_discarded: usize,
    pub groups_written: usize,
    pub groups_unknown_city: usize,
    pub groups_unknown_item: usize,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seen={} discarded={} written={} unknown_city={} unknown_item={}",
            self.records_seen,
            self.records_discarded,
            self.groups_written,
            self.groups_unknown_city,
            self.groups_unknown_item,
        )
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Why a history point was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Ingest,
    Rollover,
}

impl HistoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryKind::Ingest => "ingest",
            HistoryKind::Rollover => "rollover",
        }
    }
}

impl std::str::FromStr for HistoryKind {
    type Err = ArbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingest" => Ok(HistoryKind::Ingest),
            "rollover" => Ok(HistoryKind::Rollover),
            other => Err(ArbError::Decode(format!("unknown history kind {other}"))),
        }
    }
}

/// Append-only snapshot of a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistoryPoint {
    pub item_id: i64,
    pub city_id: i64,
    pub quality: i64,
    /// Recorded price: the quote's `ask_min`.
    pub ask_price: i64,
    pub bid_price: i64,
    pub kind: HistoryKind,
    pub recorded_at: DateTime<Utc>,
}

impl PriceHistoryPoint {
    pub fn from_quote(quote: &Quote, kind: HistoryKind, recorded_at: DateTime<Utc>) -> Self {
        Self {
            item_id: quote.item_id,
            city_id: quote.city_id,
            quality: quote.quality,
            ask_price: quote.ask_min,
            bid_price: quote.bid_max,
            kind,
            recorded_at,
        }
    }
}

/// Trailing-week mean prices for one (item, city).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAverage {
    pub item_id: i64,
    pub item_name: String,
    pub city_id: i64,
    pub city_name: String,
    pub city_code: String,
    /// Mean of non-zero bid observations.
    pub weekly_avg_buy: Option<f64>,
    /// Mean of non-zero ask observations.
    pub weekly_avg_sell: Option<f64>,
    pub samples: i64,
}

// ---------------------------------------------------------------------------
// Opportunities
// ---------------------------------------------------------------------------

/// One (path, buy city, sell city) candidate from an engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub source_item_id: i64,
    pub target_item_id: i64,
    pub buy_city_id: i64,
    pub sell_city_id: i64,
    /// Unit cost of the source item at the buy city.
    pub buy_price: i64,
    /// Unit bid for the target item at the sell city.
    pub sell_price: i64,
    pub quantity_multiplier: u32,
    /// Gross revenue minus cost, before tax.
    pub gross_profit: i64,
    pub net_profit: Decimal,
    /// Net profit as a percentage of cost.
    pub profit_margin: Decimal,
    pub computed_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn is_profitable(&self) -> bool {
        self.net_profit > Decimal::ZERO
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "item {} @city {} ({}) -> {}x item {} @city {} ({}) | net={} margin={}%",
            self.source_item_id,
            self.buy_city_id,
            self.buy_price,
            self.quantity_multiplier,
            self.target_item_id,
            self.sell_city_id,
            self.sell_price,
            self.net_profit,
            self.profit_margin.round_dp(2),
        )
    }
}

/// An opportunity joined with its item and city names for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityView {
    #[serde(flatten)]
    pub opportunity: Opportunity,
    pub source_item_name: Option<String>,
    pub source_tier: Option<Tier>,
    pub target_item_name: Option<String>,
    pub target_tier: Option<Tier>,
    pub buy_city_name: Option<String>,
    pub sell_city_name: Option<String>,
}

/// Message broadcast after every completed run: the full replacement set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunitySnapshot {
    pub run_id: String,
    pub computed_at: DateTime<Utc>,
    pub opportunities: Vec<Opportunity>,
}

/// Closed set of filters accepted by `filtered_opportunities`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpportunityFilter {
    /// Keep rows with `net_profit >= min_profit`.
    pub min_profit: Option<Decimal>,
    /// Keep rows with `profit_margin >= min_margin`.
    pub min_margin: Option<Decimal>,
    /// Keep rows whose source item is this id.
    pub source_item: Option<i64>,
    /// Maximum rows returned; defaults to `DEFAULT_FILTER_LIMIT`.
    pub limit: Option<u32>,
}

pub const DEFAULT_FILTER_LIMIT: u32 = 100;

impl OpportunityFilter {
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_FILTER_LIMIT)
    }

    /// In-memory counterpart of the SQL filter.
    pub fn matches(&self, opp: &Opportunity) -> bool {
        self.min_profit.map_or(true, |min| opp.net_profit >= min)
            && self.min_margin.map_or(true, |min| opp.profit_margin >= min)
            && self.source_item.map_or(true, |id| opp.source_item_id == id)
    }
}

// ---------------------------------------------------------------------------
// Manual simulation
// ---------------------------------------------------------------------------

/// One conversion path evaluated for a single city pair on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualScenario {
    /// e.g. `T5_ALCHEMY_RARE_PANTHER → 2x T3_ALCHEMY_RARE_PANTHER`
    pub conversion: String,
    pub source_item: Item,
    pub target_item: Item,
    pub buy_city: String,
    pub sell_city: String,
    pub buy_price: i64,
    pub buy_qty: u32,
    pub unit_sell_price: i64,
    pub sell_qty: u32,
    pub total_sell_price: i64,
    pub net_revenue: Decimal,
    pub net_profit: Decimal,
    pub profit_margin: Decimal,
}

/// Scenarios for one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyScenarios {
    pub family: String,
    pub scenarios: Vec<ManualScenario>,
}

/// Result shape: grouped by family, or flat when a family was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationResult {
    Grouped(Vec<FamilyScenarios>),
    Scenarios(Vec<ManualScenario>),
}

impl SimulationResult {
    pub fn scenario_count(&self) -> usize {
        match self {
            SimulationResult::Grouped(groups) => groups.iter().map(|g| g.scenarios.len()).sum(),
            SimulationResult::Scenarios(s) => s.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine run outcome
// ---------------------------------------------------------------------------

/// Result of one scheduled engine attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { run_id: String, opportunities: usize },
    /// Another run held the guard; nothing was written.
    Skipped,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum ArbError {
    #[error("Unknown city: {0}")]
    UnknownCity(String),

    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Store unavailable: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Market feed error ({feed}): {message}")]
    Feed { feed: String, message: String },

    #[error("Corrupt stored value: {0}")]
    Decode(String),
}

impl ArbError {
    /// Whether the error comes from the durable store (aborts a batch or run).
    pub fn is_store(&self) -> bool {
        matches!(self, ArbError::Store(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
