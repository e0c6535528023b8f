use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::order::OrderSide;

/// Errors from the venue edge. Transient transport problems are retried
/// inside the client; what surfaces here is already post-retry.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("request failed after {0} attempts")]
    Exhausted(u32),

    #[error("no bid available for {0}")]
    MissingBid(String),
}

/// Full book snapshot from `GET /book`.
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    pub token_id: String,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    pub hash: String,
}

/// Top-of-book quote from `GET /price`.
#[derive(Debug, Clone, Copy)]
pub struct PriceQuote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
}

/// Order-posting metadata from the market endpoint.
#[derive(Debug, Clone)]
pub struct MarketInfo {
    pub minimum_tick_size: Decimal,
    pub neg_risk: bool,
}

/// A GTC limit order as the venue's order endpoint expects it.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub tick_size: Decimal,
    pub neg_risk: bool,
    pub funder: String,
}

#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub order_id: String,
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone)]
pub struct TradeFill {
    pub trade_id: String,
    pub order_id: String,
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub fee: Decimal,
    pub timestamp: Option<DateTime<Utc>>,
}

/// The slice of the venue the execution engine consumes.
///
/// The live implementation is the REST client; tests drive the executor
/// with a scripted venue behind the same trait.
#[async_trait]
pub trait VenueApi: Send + Sync {
    async fn get_book(&self, token_id: &str) -> Result<BookSnapshot, VenueError>;
    async fn get_price(&self, token_id: &str) -> Result<PriceQuote, VenueError>;
    async fn get_market_info(&self, condition_id: &str) -> Result<MarketInfo, VenueError>;
    async fn post_order(&self, request: &OrderRequest) -> Result<OrderAck, VenueError>;
    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError>;
    async fn cancel_all(&self) -> Result<(), VenueError>;
    async fn open_orders(&self, market: Option<&str>) -> Result<Vec<OpenOrder>, VenueError>;
    async fn recent_trades(&self, limit: usize) -> Result<Vec<TradeFill>, VenueError>;
}
