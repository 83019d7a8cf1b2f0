//! API route handlers.
//!
//! Handlers are thin: parse parameters, call `OpportunityQueries`, map the
//! result to JSON. State is shared via `Arc<ApiContext>`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, warn};

use crate::engine::OpportunityQueries;
use crate::publisher::Publisher;
use crate::types::{
    ArbError, City, Item, Opportunity, OpportunityFilter, OpportunityView, Quote, SimulationResult,
    WeeklyAverage,
};

/// Rows returned by `/api/arbitrage/top` without an explicit limit.
pub const DEFAULT_TOP_LIMIT: u32 = 200;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiContext {
    pub queries: Arc<OpportunityQueries>,
    pub publisher: Publisher,
}

pub type AppState = Arc<ApiContext>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error rendered as `{"error": "..."}` with a matching status code.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(ArbError),
}

impl From<ArbError> for ApiError {
    fn from(e: ArbError) -> Self {
        match e {
            ArbError::UnknownCity(_) | ArbError::UnknownItem(_) => ApiError::NotFound(e.to_string()),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(e) => {
                error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct TopParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    #[serde(alias = "minProfit")]
    pub min_profit: Option<f64>,
    #[serde(alias = "minMargin")]
    pub min_margin: Option<f64>,
    #[serde(alias = "sourceItem", alias = "sourceIngredientId")]
    pub source_item: Option<i64>,
    pub limit: Option<u32>,
}

impl FilterParams {
    fn into_filter(self) -> Result<OpportunityFilter, ApiError> {
        Ok(OpportunityFilter {
            min_profit: self.min_profit.map(|v| to_decimal("min_profit", v)).transpose()?,
            min_margin: self.min_margin.map(|v| to_decimal("min_margin", v)).transpose()?,
            source_item: self.source_item,
            limit: self.limit,
        })
    }
}

fn to_decimal(name: &str, value: f64) -> Result<Decimal, ApiError> {
    Decimal::from_f64(value).ok_or_else(|| ApiError::BadRequest(format!("{name} is not a finite number")))
}

#[derive(Debug, Default, Deserialize)]
pub struct SimulateParams {
    pub buy_city: Option<String>,
    pub sell_city: Option<String>,
    #[serde(alias = "item_base")]
    pub family: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceParams {
    #[serde(alias = "ingredient")]
    pub item: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpportunitiesResponse {
    pub opportunities: Vec<OpportunityView>,
}

impl OpportunitiesResponse {
    fn named(state: &ApiContext, opportunities: Vec<Opportunity>) -> Self {
        let catalog = state.queries.catalog();
        Self {
            opportunities: opportunities.into_iter().map(|o| catalog.describe(o)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceResponse {
    pub price: Option<Quote>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<WeeklyAverage>,
}

// ---------------------------------------------------------------------------
// Arbitrage routes
// ---------------------------------------------------------------------------

/// GET /api/arbitrage/top
pub async fn get_top(
    State(state): State<AppState>,
    Query(params): Query<TopParams>,
) -> ApiResult<OpportunitiesResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    let opportunities = state.queries.top_opportunities(limit).await?;
    Ok(Json(OpportunitiesResponse::named(&state, opportunities)))
}

/// GET /api/arbitrage/filtered
pub async fn get_filtered(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<OpportunitiesResponse> {
    let filter = params.into_filter()?;
    let opportunities = state.queries.filtered_opportunities(&filter).await?;
    Ok(Json(OpportunitiesResponse::named(&state, opportunities)))
}

/// GET /api/arbitrage/manual-simulate
pub async fn get_manual_simulate(
    State(state): State<AppState>,
    Query(params): Query<SimulateParams>,
) -> ApiResult<SimulationResult> {
    let (Some(buy), Some(sell)) = (params.buy_city.as_deref(), params.sell_city.as_deref()) else {
        return Err(ApiError::BadRequest("buy_city and sell_city are required".into()));
    };
    let result = state
        .queries
        .manual_simulate(buy, sell, params.family.as_deref())
        .await
        .map_err(|e| match e {
            ArbError::UnknownCity(_) => ApiError::BadRequest(e.to_string()),
            other => other.into(),
        })?;
    Ok(Json(result))
}

/// GET /api/arbitrage/stream
///
/// Relays every published snapshot as an `opportunities` event.
pub async fn get_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.publisher.subscribe();
    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(snapshot) => match Event::default().event("opportunities").json_data(snapshot.as_ref()) {
                    Ok(event) => return Some((Ok(event), rx)),
                    Err(e) => warn!(error = %e, "Failed to encode snapshot event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Stream subscriber lagged, dropping old snapshots");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// Market routes
// ---------------------------------------------------------------------------

/// GET /api/market/weekly
pub async fn get_weekly(State(state): State<AppState>) -> ApiResult<Vec<WeeklyAverage>> {
    Ok(Json(state.queries.weekly_averages().await?))
}

/// GET /api/market/history?item=&city=
///
/// Weekly averages narrowed to one (item, city).
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<PriceParams>,
) -> ApiResult<HistoryResponse> {
    let (Some(item), Some(city)) = (params.item.as_deref(), params.city.as_deref()) else {
        return Err(ApiError::BadRequest("item and city are required".into()));
    };
    let catalog = state.queries.catalog();
    let item = catalog
        .item_by_code(item)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown item: {item}")))?;
    let city = catalog
        .city_by_code(city)
        .or_else(|| catalog.city_by_name(city))
        .ok_or_else(|| ApiError::NotFound(format!("Unknown city: {city}")))?;

    let history = state
        .queries
        .weekly_averages()
        .await?
        .into_iter()
        .filter(|w| w.item_id == item.id && w.city_id == city.id)
        .collect();
    Ok(Json(HistoryResponse { history }))
}

/// GET /api/market/items
pub async fn get_items(State(state): State<AppState>) -> Json<Vec<Item>> {
    Json(state.queries.items().to_vec())
}

/// GET /api/market/cities
pub async fn get_cities(State(state): State<AppState>) -> Json<Vec<City>> {
    Json(state.queries.cities().to_vec())
}

/// GET /api/market/prices
///
/// With `item` and `city`, the single current quote; with neither, every
/// stored quote.
pub async fn get_prices(
    State(state): State<AppState>,
    Query(params): Query<PriceParams>,
) -> Result<Response, ApiError> {
    match (params.item.as_deref(), params.city.as_deref()) {
        (None, None) => Ok(Json(state.queries.quotes().await?).into_response()),
        (Some(item), Some(city)) => {
            let price = state.queries.quote(item, city).await?;
            Ok(Json(PriceResponse { price }).into_response())
        }
        _ => Err(ApiError::BadRequest(
            "item and city are required for a specific price".into(),
        )),
    }
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
