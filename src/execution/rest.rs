use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::config::ConnectionConfig;
use crate::execution::auth::{with_headers, AuthManager};
use crate::execution::venue::{
    BookSnapshot, MarketInfo, OpenOrder, OrderAck, OrderRequest, PriceQuote, TradeFill, VenueApi,
    VenueError,
};
use crate::models::order::OrderSide;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Token buckets partitioning the REST surface. Sustained rates match the
/// documented windows (150, 350, 900 requests per 10 s); bursts allow the
/// full window up front. `until_ready` queues callers fairly.
struct RateLimits {
    book: DirectLimiter,
    orders: DirectLimiter,
    general: DirectLimiter,
}

impl RateLimits {
    fn new() -> Self {
        let per_10s = |n: u32| {
            Quota::per_second(NonZeroU32::new(n / 10).expect("rate > 0"))
                .allow_burst(NonZeroU32::new(n).expect("burst > 0"))
        };
        Self {
            book: RateLimiter::direct(per_10s(150)),
            orders: RateLimiter::direct(per_10s(350)),
            general: RateLimiter::direct(per_10s(900)),
        }
    }
}

/// REST client for the CLOB. Handles book reads, order mutation, and the
/// fill/orders feeds the executor reconciles against. Retries transient
/// failures with exponential backoff; everything it returns is typed.
pub struct ClobClient {
    http: reqwest::Client,
    base_url: String,
    gamma_url: String,
    auth: RwLock<AuthManager>,
    max_retries: u32,
    backoff_base: f64,
    limits: RateLimits,
}

impl ClobClient {
    pub fn new(connection: &ConnectionConfig, auth: AuthManager) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(Duration::from_secs(connection.rest_timeout_seconds))
            .build()
            .expect("reqwest client");

        Self {
            http,
            base_url: connection.clob_rest_url.trim_end_matches('/').to_string(),
            gamma_url: connection.gamma_api_url.trim_end_matches('/').to_string(),
            auth: RwLock::new(auth),
            max_retries: connection.max_retries,
            backoff_base: connection.retry_backoff_base,
            limits: RateLimits::new(),
        }
    }

    /// Derive L2 credentials when the config did not supply them.
    pub async fn init_auth(&self) -> anyhow::Result<()> {
        let mut auth = self.auth.write().await;
        if auth.is_l2_ready() {
            return Ok(());
        }
        auth.bootstrap_credentials(&self.http, &self.base_url)
            .await?;
        Ok(())
    }

    pub async fn wallet_address(&self) -> String {
        format!("{:?}", self.auth.read().await.address())
    }

    async fn request(
        &self,
        method: Method,
        base: &str,
        path: &str,
        authed: bool,
        body: Option<String>,
        limiter: &DirectLimiter,
    ) -> Result<String, VenueError> {
        let url = format!("{base}{path}");
        let body_str = body.as_deref().unwrap_or("");

        for attempt in 0..self.max_retries {
            limiter.until_ready().await;

            let mut builder = self.http.request(method.clone(), &url);
            if authed {
                let auth = self.auth.read().await;
                let headers = auth
                    .request_headers(method.as_str(), path, body_str)
                    .map_err(|e| VenueError::Auth(e.to_string()))?;
                builder = with_headers(builder, &headers);
            }
            if let Some(b) = &body {
                builder = builder
                    .header("Content-Type", "application/json")
                    .body(b.clone());
            }

            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.as_u16() == 429 {
                        let wait = self.backoff_base.powi(attempt as i32);
                        warn!("rate limited on {path}, backing off {wait:.1}s");
                        tokio::time::sleep(Duration::from_secs_f64(wait)).await;
                        continue;
                    }
                    let text = resp.text().await.unwrap_or_default();
                    if !status.is_success() {
                        return Err(VenueError::Http {
                            status: status.as_u16(),
                            body: text,
                        });
                    }
                    return Ok(text);
                }
                Err(e) => {
                    if attempt + 1 >= self.max_retries {
                        error!("request to {path} failed after retries: {e}");
                        return Err(VenueError::Transport(e));
                    }
                    let wait = self.backoff_base.powi(attempt as i32);
                    debug!("transport error on {path} ({e}), retrying in {wait:.1}s");
                    tokio::time::sleep(Duration::from_secs_f64(wait)).await;
                }
            }
        }

        Err(VenueError::Exhausted(self.max_retries))
    }

    fn parse(text: &str) -> Result<Value, VenueError> {
        serde_json::from_str(text).map_err(|e| VenueError::Decode(e.to_string()))
    }
}

fn value_decimal(v: &Value) -> Decimal {
    match v {
        Value::String(s) => s.parse().unwrap_or_default(),
        Value::Number(n) => n.to_string().parse().unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

fn field_decimal(obj: &Value, key: &str) -> Decimal {
    obj.get(key).map(value_decimal).unwrap_or_default()
}

fn field_str(obj: &Value, key: &str) -> String {
    obj.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn field_side(obj: &Value, key: &str) -> OrderSide {
    if field_str(obj, key).eq_ignore_ascii_case("SELL") {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    }
}

fn parse_levels(obj: &Value, key: &str) -> Vec<(Decimal, Decimal)> {
    obj.get(key)
        .and_then(|v| v.as_array())
        .map(|levels| {
            levels
                .iter()
                .map(|l| (field_decimal(l, "price"), field_decimal(l, "size")))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl VenueApi for ClobClient {
    async fn get_book(&self, token_id: &str) -> Result<BookSnapshot, VenueError> {
        let path = format!("/book?token_id={token_id}");
        let text = self
            .request(Method::GET, &self.base_url, &path, false, None, &self.limits.book)
            .await?;
        let v = Self::parse(&text)?;
        Ok(BookSnapshot {
            token_id: token_id.to_string(),
            bids: parse_levels(&v, "bids"),
            asks: parse_levels(&v, "asks"),
            hash: field_str(&v, "hash"),
        })
    }

    async fn get_price(&self, token_id: &str) -> Result<PriceQuote, VenueError> {
        let path = format!("/price?token_id={token_id}");
        let text = self
            .request(Method::GET, &self.base_url, &path, false, None, &self.limits.book)
            .await?;
        let v = Self::parse(&text)?;
        Ok(PriceQuote {
            bid: field_decimal(&v, "bid"),
            ask: field_decimal(&v, "ask"),
            mid: field_decimal(&v, "mid"),
        })
    }

    async fn get_market_info(&self, condition_id: &str) -> Result<MarketInfo, VenueError> {
        let path = format!("/markets/{condition_id}");
        let text = self
            .request(
                Method::GET,
                &self.gamma_url,
                &path,
                false,
                None,
                &self.limits.general,
            )
            .await?;
        let v = Self::parse(&text)?;
        let tick = v
            .get("minimum_tick_size")
            .map(value_decimal)
            .filter(|t| *t > Decimal::ZERO)
            .unwrap_or_else(|| "0.01".parse().expect("tick"));
        let neg_risk = v.get("neg_risk").and_then(|n| n.as_bool()).unwrap_or(false);
        Ok(MarketInfo {
            minimum_tick_size: tick,
            neg_risk,
        })
    }

    async fn post_order(&self, request: &OrderRequest) -> Result<OrderAck, VenueError> {
        let body = json!({
            "tokenID": request.token_id,
            "side": request.side.as_str(),
            "price": request.price.to_string(),
            "size": request.size.to_string(),
            "orderType": "GTC",
            "tickSize": request.tick_size.to_string(),
            "negRisk": request.neg_risk,
            "funder": request.funder,
        })
        .to_string();

        let text = self
            .request(
                Method::POST,
                &self.base_url,
                "/order",
                true,
                Some(body),
                &self.limits.orders,
            )
            .await?;
        let v = Self::parse(&text)?;

        let order_id = field_str(&v, "orderID");
        if order_id.is_empty() {
            let err = field_str(&v, "error");
            let err_msg = field_str(&v, "errorMsg");
            let reason = if !err.is_empty() { err } else { err_msg };
            return Err(VenueError::Rejected(if reason.is_empty() {
                text
            } else {
                reason
            }));
        }

        Ok(OrderAck {
            order_id,
            status: field_str(&v, "status"),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        let body = json!({ "orderID": order_id }).to_string();
        self.request(
            Method::DELETE,
            &self.base_url,
            "/order",
            true,
            Some(body),
            &self.limits.orders,
        )
        .await?;
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), VenueError> {
        self.request(
            Method::DELETE,
            &self.base_url,
            "/cancel-all",
            true,
            None,
            &self.limits.orders,
        )
        .await?;
        Ok(())
    }

    async fn open_orders(&self, market: Option<&str>) -> Result<Vec<OpenOrder>, VenueError> {
        let path = match market {
            Some(m) => format!("/orders?market={m}"),
            None => "/orders".to_string(),
        };
        let text = self
            .request(Method::GET, &self.base_url, &path, true, None, &self.limits.general)
            .await?;
        let v = Self::parse(&text)?;
        let orders = v
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|o| OpenOrder {
                        order_id: field_str(o, "id"),
                        token_id: field_str(o, "asset_id"),
                        side: field_side(o, "side"),
                        price: field_decimal(o, "price"),
                        size: field_decimal(o, "original_size"),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(orders)
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<TradeFill>, VenueError> {
        let path = format!("/trades?limit={limit}");
        let text = self
            .request(Method::GET, &self.base_url, &path, true, None, &self.limits.general)
            .await?;
        let v = Self::parse(&text)?;
        let trades = v
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|t| TradeFill {
                        trade_id: field_str(t, "id"),
                        order_id: field_str(t, "order_id"),
                        token_id: field_str(t, "asset_id"),
                        side: field_side(t, "side"),
                        price: field_decimal(t, "price"),
                        size: field_decimal(t, "size"),
                        fee: field_decimal(t, "fee"),
                        timestamp: t
                            .get("match_time")
                            .and_then(|m| match m {
                                Value::String(s) => s.parse::<i64>().ok(),
                                Value::Number(n) => n.as_i64(),
                                _ => None,
                            })
                            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0)),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimal_fields_accept_strings_and_numbers() {
        let v: Value = serde_json::from_str(r#"{"a": "0.48", "b": 0.5, "c": null}"#).unwrap();
        assert_eq!(field_decimal(&v, "a"), dec!(0.48));
        assert_eq!(field_decimal(&v, "b"), dec!(0.5));
        assert_eq!(field_decimal(&v, "c"), Decimal::ZERO);
        assert_eq!(field_decimal(&v, "missing"), Decimal::ZERO);
    }

    #[test]
    fn level_parsing() {
        let v: Value = serde_json::from_str(
            r#"{"bids": [{"price": "0.46", "size": "50"}], "asks": [{"price": "0.48", "size": "100"}]}"#,
        )
        .unwrap();
        assert_eq!(parse_levels(&v, "bids"), vec![(dec!(0.46), dec!(50))]);
        assert_eq!(parse_levels(&v, "asks"), vec![(dec!(0.48), dec!(100))]);
        assert!(parse_levels(&v, "nope").is_empty());
    }

    #[test]
    fn side_parsing_defaults_to_buy() {
        let v: Value = serde_json::from_str(r#"{"s": "sell", "b": "BUY"}"#).unwrap();
        assert_eq!(field_side(&v, "s"), OrderSide::Sell);
        assert_eq!(field_side(&v, "b"), OrderSide::Buy);
        assert_eq!(field_side(&v, "missing"), OrderSide::Buy);
    }
}
