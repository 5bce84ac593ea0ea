//! WebSocket market-data feed.
//!
//! Delivers a full `OrderBook` snapshot per subscribed market whenever the
//! venue publishes one. The connection task owns the socket: it replays
//! subscriptions after a reconnect, echoes heartbeats, and pushes parsed
//! snapshots onto an mpsc channel. Ordering is per-market FIFO; duplicate
//! and no-op snapshots are forwarded and tolerated downstream.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::types::OrderBook;

/// Topic prefix for order-book subscriptions.
const ORDERBOOK_TOPIC_PREFIX: &str = "predictOrderbook/";

/// Errors from the feed connection.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection attempt timed out")]
    Timeout,

    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The consumer dropped the update receiver; the feed is done.
    #[error("update channel closed")]
    Closed,
}

/// One parsed book snapshot from the wire.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    pub market_id: String,
    pub book: OrderBook,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug)]
enum FeedCommand {
    Subscribe(String),
    Unsubscribe(String),
}

/// Handle to the feed connection task.
pub struct MarketFeed {
    updates: mpsc::Receiver<BookUpdate>,
    commands: mpsc::UnboundedSender<FeedCommand>,
    shutdown: broadcast::Sender<()>,
}

impl MarketFeed {
    /// Spawns the connection task. The socket is established lazily with
    /// reconnect-and-resubscribe on every failure.
    pub fn connect(config: FeedConfig) -> Self {
        let (update_tx, update_rx) = mpsc::channel(config.buffer_size);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(4);

        tokio::spawn(run_connection(config, command_rx, update_tx, shutdown_rx));

        Self {
            updates: update_rx,
            commands: command_tx,
            shutdown: shutdown_tx,
        }
    }

    /// Subscribes to a market's order book. Safe to call before the
    /// connection is up; the subscription is replayed on (re)connect.
    pub fn subscribe(&self, market_id: impl Into<String>) {
        let _ = self
            .commands
            .send(FeedCommand::Subscribe(market_id.into()));
    }

    pub fn unsubscribe(&self, market_id: impl Into<String>) {
        let _ = self
            .commands
            .send(FeedCommand::Unsubscribe(market_id.into()));
    }

    /// Next book update, in arrival order. `None` after shutdown.
    pub async fn next_update(&mut self) -> Option<BookUpdate> {
        self.updates.recv().await
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct SessionState {
    subscriptions: HashSet<String>,
    next_request_id: u64,
}

impl SessionState {
    fn request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }
}

async fn run_connection(
    config: FeedConfig,
    mut commands: mpsc::UnboundedReceiver<FeedCommand>,
    updates: mpsc::Sender<BookUpdate>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut state = SessionState {
        subscriptions: HashSet::new(),
        next_request_id: 0,
    };
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        if shutdown.try_recv().is_ok() {
            info!("feed: shutdown signal received");
            return;
        }

        match run_session(
            &config,
            &mut commands,
            &updates,
            &mut shutdown,
            &mut state,
        )
        .await
        {
            Ok(()) => {
                info!("feed: clean shutdown");
                return;
            }
            Err(FeedError::Closed) => {
                debug!("feed: consumer gone, stopping");
                return;
            }
            Err(e) => {
                warn!(error = %e, delay = ?reconnect_delay, "feed: connection lost, reconnecting");
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = shutdown.recv() => {
                        info!("feed: shutdown during reconnect");
                        return;
                    }
                }
                reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
            }
        }
    }
}

async fn run_session(
    config: &FeedConfig,
    commands: &mut mpsc::UnboundedReceiver<FeedCommand>,
    updates: &mpsc::Sender<BookUpdate>,
    shutdown: &mut broadcast::Receiver<()>,
    state: &mut SessionState,
) -> Result<(), FeedError> {
    let url = match &config.api_key {
        Some(key) => format!("{}?apiKey={}", config.url, key),
        None => config.url.clone(),
    };
    info!(url = %config.url, "feed: connecting");

    let connected = tokio::time::timeout(config.connect_timeout, connect_async(url.as_str())).await;
    let (ws, _) = match connected {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => return Err(FeedError::Connection(e.to_string())),
        Err(_) => return Err(FeedError::Timeout),
    };
    info!("feed: connected");

    let (mut write, mut read) = ws.split();

    // Replay all subscriptions on every (re)connect.
    let markets: Vec<String> = state.subscriptions.iter().cloned().collect();
    for market_id in markets {
        send_subscribe(&mut write, state, &market_id).await?;
    }

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            maybe_command = commands.recv() => match maybe_command {
                Some(FeedCommand::Subscribe(market_id)) => {
                    state.subscriptions.insert(market_id.clone());
                    send_subscribe(&mut write, state, &market_id).await?;
                }
                Some(FeedCommand::Unsubscribe(market_id)) => {
                    state.subscriptions.remove(&market_id);
                    send_unsubscribe(&mut write, state, &market_id).await?;
                }
                // Feed handle dropped: treat as shutdown.
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            },
            maybe_message = read.next() => match maybe_message {
                Some(Ok(Message::Text(text))) => {
                    handle_message(&text, &mut write, updates).await?;
                }
                Some(Ok(Message::Ping(data))) => {
                    write
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| FeedError::WebSocket(e.to_string()))?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(FeedError::Connection("server closed the stream".to_string()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(FeedError::WebSocket(e.to_string())),
            },
        }
    }
}

async fn send_subscribe(
    write: &mut futures_util::stream::SplitSink<WsStream, Message>,
    state: &mut SessionState,
    market_id: &str,
) -> Result<(), FeedError> {
    let request_id = state.request_id();
    let message = serde_json::json!({
        "method": "subscribe",
        "requestId": request_id,
        "params": [format!("{ORDERBOOK_TOPIC_PREFIX}{market_id}")],
    });
    debug!(market = %market_id, request_id, "feed: subscribing");
    write
        .send(Message::Text(message.to_string()))
        .await
        .map_err(|e| FeedError::WebSocket(e.to_string()))
}

async fn send_unsubscribe(
    write: &mut futures_util::stream::SplitSink<WsStream, Message>,
    state: &mut SessionState,
    market_id: &str,
) -> Result<(), FeedError> {
    let message = serde_json::json!({
        "method": "unsubscribe",
        "requestId": state.request_id(),
        "params": [format!("{ORDERBOOK_TOPIC_PREFIX}{market_id}")],
    });
    debug!(market = %market_id, "feed: unsubscribing");
    write
        .send(Message::Text(message.to_string()))
        .await
        .map_err(|e| FeedError::WebSocket(e.to_string()))
}

/// Incoming frame envelope. `M` carries topic data, `R` acknowledges a
/// request.
#[derive(Debug, Deserialize)]
struct WsMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(rename = "requestId", default)]
    request_id: Option<u64>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<WsErrorBody>,
}

#[derive(Debug, Deserialize)]
struct WsErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Raw order-book payload: arrays of [price, size] pairs.
#[derive(Debug, Deserialize)]
struct RawBook {
    #[serde(default)]
    bids: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    asks: Vec<(Decimal, Decimal)>,
}

async fn handle_message(
    text: &str,
    write: &mut futures_util::stream::SplitSink<WsStream, Message>,
    updates: &mpsc::Sender<BookUpdate>,
) -> Result<(), FeedError> {
    let message: WsMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "feed: unparseable frame");
            return Ok(());
        }
    };

    match message.kind.as_str() {
        "R" => {
            if message.success.unwrap_or(false) {
                debug!(request_id = ?message.request_id, "feed: request acknowledged");
            } else {
                let reason = message
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "unknown error".to_string());
                warn!(request_id = ?message.request_id, %reason, "feed: request rejected");
            }
            Ok(())
        }
        "M" => match message.topic.as_deref() {
            Some("heartbeat") => {
                // The venue expects its heartbeat echoed back.
                let reply = serde_json::json!({
                    "method": "heartbeat",
                    "data": message.data,
                });
                write
                    .send(Message::Text(reply.to_string()))
                    .await
                    .map_err(|e| FeedError::WebSocket(e.to_string()))
            }
            Some(topic) if topic.starts_with(ORDERBOOK_TOPIC_PREFIX) => {
                let market_id = &topic[ORDERBOOK_TOPIC_PREFIX.len()..];
                let raw: RawBook = match serde_json::from_value(message.data) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(market = %market_id, error = %e, "feed: bad book payload");
                        return Ok(());
                    }
                };
                if raw.bids.is_empty() && raw.asks.is_empty() {
                    return Ok(());
                }

                let update = BookUpdate {
                    market_id: market_id.to_string(),
                    book: OrderBook::from_levels(market_id, raw.bids, raw.asks),
                    received_at: Utc::now(),
                };
                updates.send(update).await.map_err(|_| FeedError::Closed)
            }
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_book_frame() {
        let frame = r#"{
            "type": "M",
            "topic": "predictOrderbook/market-7",
            "data": {
                "bids": [[0.50, 100], ["0.49", "25.5"]],
                "asks": [[0.52, 10]]
            }
        }"#;

        let message: WsMessage = serde_json::from_str(frame).unwrap();
        assert_eq!(message.kind, "M");
        assert_eq!(message.topic.as_deref(), Some("predictOrderbook/market-7"));

        let raw: RawBook = serde_json::from_value(message.data).unwrap();
        assert_eq!(raw.bids.len(), 2);
        // Both numeric and string-encoded decimals parse.
        assert_eq!(raw.bids[0], (dec!(0.50), dec!(100)));
        assert_eq!(raw.bids[1], (dec!(0.49), dec!(25.5)));
        assert_eq!(raw.asks[0], (dec!(0.52), dec!(10)));
    }

    #[test]
    fn test_parse_ack_frame() {
        let frame = r#"{"type": "R", "requestId": 3, "success": false, "error": {"message": "bad topic"}}"#;
        let message: WsMessage = serde_json::from_str(frame).unwrap();
        assert_eq!(message.kind, "R");
        assert_eq!(message.request_id, Some(3));
        assert_eq!(message.success, Some(false));
        assert_eq!(
            message.error.unwrap().message.as_deref(),
            Some("bad topic")
        );
    }

    #[test]
    fn test_parse_heartbeat_frame() {
        let frame = r#"{"type": "M", "topic": "heartbeat", "data": 1736900000}"#;
        let message: WsMessage = serde_json::from_str(frame).unwrap();
        assert_eq!(message.topic.as_deref(), Some("heartbeat"));
        assert_eq!(message.data, serde_json::json!(1736900000));
    }
}
