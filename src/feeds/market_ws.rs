use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::execution::auth::ApiCredentials;
use crate::models::order::OrderSide;
use crate::orderbook::BookStore;
use crate::risk::risk_manager::RiskManager;
use crate::telemetry::metrics::MetricsCollector;

/// One price-level change from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelChange {
    pub asset_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
}

/// Inbound market-channel events, decoded at the transport boundary.
/// Everything downstream consumes typed values only.
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    Book {
        asset_id: String,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
        hash: String,
    },
    PriceChange(Vec<LevelChange>),
    BestBidAsk {
        asset_id: String,
        best_bid: Decimal,
        best_ask: Decimal,
    },
}

/// Market-data WebSocket feed.
///
/// Subscribes to the market channel for every tracked token, applies
/// snapshots and deltas into the book store, and reconnects with a fixed
/// delay (drop and resubscribe) whenever the stream breaks.
pub struct MarketStream {
    ws_url: String,
    reconnect_delay: Duration,
    ping_interval: Duration,
    creds: Option<ApiCredentials>,
}

impl MarketStream {
    pub fn new(
        ws_url: String,
        reconnect_delay: Duration,
        ping_interval: Duration,
        creds: Option<ApiCredentials>,
    ) -> Self {
        Self {
            ws_url,
            reconnect_delay,
            ping_interval,
            creds,
        }
    }

    pub fn start(
        &self,
        store: Arc<BookStore>,
        risk: Arc<RiskManager>,
        metrics: Arc<MetricsCollector>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let ws_url = self.ws_url.clone();
        let reconnect_delay = self.reconnect_delay;
        let ping_interval = self.ping_interval;
        let creds = self.creds.clone();

        tokio::spawn(async move {
            loop {
                info!("connecting market stream: {ws_url}");
                let conn = tokio::select! {
                    r = connect_async(&ws_url) => r,
                    _ = shutdown.recv() => return,
                };

                match conn {
                    Ok((ws, _)) => {
                        info!("market stream connected");
                        risk.update_ws_status(true, Some(Utc::now())).await;
                        let (mut write, mut read) = ws.split();

                        let assets = store.token_ids();
                        let mut sub = json!({
                            "type": "MARKET",
                            "assets_ids": assets,
                            "custom_feature_enabled": true,
                        });
                        if let Some(c) = &creds {
                            sub["auth"] = json!({
                                "apiKey": c.api_key,
                                "secret": c.api_secret,
                                "passphrase": c.api_passphrase,
                            });
                        }
                        if write.send(Message::Text(sub.to_string())).await.is_err() {
                            warn!("subscribe send failed");
                        } else {
                            info!("subscribed to {} token books", store.token_ids().len());
                        }

                        let mut ping = tokio::time::interval_at(
                            tokio::time::Instant::now() + ping_interval,
                            ping_interval,
                        );

                        loop {
                            tokio::select! {
                                msg = read.next() => match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        risk.update_ws_status(true, Some(Utc::now())).await;
                                        for event in decode_events(&text) {
                                            apply_event(&store, event);
                                        }
                                    }
                                    Some(Ok(Message::Ping(payload))) => {
                                        let _ = write.send(Message::Pong(payload)).await;
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(e)) => {
                                        warn!("market stream error: {e}");
                                        metrics.record_api_error();
                                        break;
                                    }
                                    None => {
                                        warn!("market stream ended");
                                        break;
                                    }
                                },
                                _ = ping.tick() => {
                                    let _ = write.send(Message::Ping(Vec::new())).await;
                                }
                                _ = shutdown.recv() => return,
                            }
                        }
                    }
                    Err(e) => {
                        error!("market stream connect failed: {e}");
                    }
                }

                risk.update_ws_status(false, None).await;
                metrics.record_ws_reconnect();
                warn!("market stream reconnecting in {}s", reconnect_delay.as_secs());
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = shutdown.recv() => return,
                }
            }
        });
    }
}

fn apply_event(store: &BookStore, event: WsEvent) {
    match event {
        WsEvent::Book {
            asset_id,
            bids,
            asks,
            hash,
        } => {
            debug!(
                "book snapshot: {} ({} bids / {} asks)",
                asset_id,
                bids.len(),
                asks.len()
            );
            store.apply_snapshot(&asset_id, &bids, &asks, &hash);
        }
        WsEvent::PriceChange(changes) => {
            for c in changes {
                store.apply_delta(&c.asset_id, c.side, c.price, c.size);
            }
        }
        WsEvent::BestBidAsk {
            asset_id,
            best_bid,
            best_ask,
        } => {
            store.apply_best(&asset_id, best_bid, best_ask);
        }
    }
}

/// Decode one inbound frame. Frames arrive as a single event object or an
/// array of them; anything unrecognized (acks, heartbeats) is skipped.
pub fn decode_events(text: &str) -> Vec<WsEvent> {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };
    match value {
        Value::Array(items) => items.iter().filter_map(decode_event).collect(),
        obj => decode_event(&obj).into_iter().collect(),
    }
}

fn decode_event(v: &Value) -> Option<WsEvent> {
    let event_type = v.get("event_type").and_then(|t| t.as_str())?;
    match event_type {
        "book" => Some(WsEvent::Book {
            asset_id: str_field(v, "asset_id")?,
            bids: levels(v, "bids"),
            asks: levels(v, "asks"),
            hash: str_field(v, "hash").unwrap_or_default(),
        }),
        "price_change" => {
            let changes = v
                .get("price_changes")
                .and_then(|c| c.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|c| {
                            Some(LevelChange {
                                asset_id: str_field(c, "asset_id")?,
                                side: side_field(c),
                                price: dec_field(c, "price"),
                                size: dec_field(c, "size"),
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            Some(WsEvent::PriceChange(changes))
        }
        "best_bid_ask" => Some(WsEvent::BestBidAsk {
            asset_id: str_field(v, "asset_id")?,
            best_bid: dec_field(v, "best_bid"),
            best_ask: dec_field(v, "best_ask"),
        }),
        _ => None,
    }
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|s| s.as_str()).map(str::to_string)
}

fn dec_field(v: &Value, key: &str) -> Decimal {
    v.get(key)
        .map(|f| match f {
            Value::String(s) => s.parse().unwrap_or_default(),
            Value::Number(n) => n.to_string().parse().unwrap_or_default(),
            _ => Decimal::ZERO,
        })
        .unwrap_or_default()
}

fn side_field(v: &Value) -> OrderSide {
    match v.get("side").and_then(|s| s.as_str()) {
        Some(s) if s.eq_ignore_ascii_case("SELL") => OrderSide::Sell,
        _ => OrderSide::Buy,
    }
}

fn levels(v: &Value, key: &str) -> Vec<(Decimal, Decimal)> {
    v.get(key)
        .and_then(|l| l.as_array())
        .map(|arr| {
            arr.iter()
                .map(|level| (dec_field(level, "price"), dec_field(level, "size")))
                .collect()
        })
        .unwrap_or_default()
}
