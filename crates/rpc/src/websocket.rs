//! `eth_subscribe` / `eth_unsubscribe` over WebSocket (§4.10): `newHeads`,
//! `newPendingTransactions`, `logs`. Connection caps, per-client message
//! rate, idle timeout and heartbeat all live here rather than in the
//! generic JSON-RPC handler since a subscription is a long-lived session,
//! not a single request/response.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use rand::RngCore;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use coc_blockchain::ChainEvent;
use coc_common::{Address, H256};
use coc_storage::LogFilter;

use crate::context::RpcApiContext;
use crate::encoding::{block_to_json, log_to_json, parse_address, parse_h256};

/// A connection with no inbound client message for this long is dropped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Subscriptions held by a single connection (§4.10 `MAX_SUBSCRIPTIONS_PER_CLIENT`).
const MAX_SUBSCRIPTIONS_PER_CLIENT: usize = 10;
const MAX_TOPIC_POSITIONS: usize = 4;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

enum Subscription {
    NewHeads,
    NewPendingTransactions,
    Logs(LogFilter),
}

fn new_subscription_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

pub async fn ws_handler(
    State(ctx): State<RpcApiContext>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(guard) = ctx.ws_connections.try_acquire(peer_addr.ip()) else {
        return (axum::http::StatusCode::SERVICE_UNAVAILABLE, "too many websocket connections").into_response();
    };
    ws.max_message_size(1024 * 1024)
        .on_upgrade(move |socket| async move {
            let _guard = guard;
            handle_socket(socket, ctx).await;
        })
}

async fn handle_socket(socket: WebSocket, ctx: RpcApiContext) {
    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut stream) = socket.split();
    let mut events = ctx.chain.subscribe();
    let mut subscriptions: HashMap<String, Subscription> = HashMap::new();
    let mut last_pending_seq = ctx.pending_tx_log.latest_seq();

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending_poll = interval(Duration::from_millis(500));
    pending_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        if !ctx.ws_message_limiter.allow(conn_id) {
                            let _ = sink.send(Message::Text(err_text(Value::Null, "rate limit exceeded").into())).await;
                            continue;
                        }
                        let response = handle_client_message(&text, &ctx, &mut subscriptions, &mut last_pending_seq);
                        if sink.send(Message::Text(response.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        last_activity = Instant::now();
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket receive error");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(ChainEvent::NewBlock(block, _receipts)) => {
                        for (sub_id, sub) in subscriptions.iter() {
                            if matches!(sub, Subscription::NewHeads) {
                                let note = subscription_notification(sub_id, block_to_json(&block, false));
                                if sink.send(Message::Text(note.into())).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Ok(ChainEvent::Log(log)) => {
                        for (sub_id, sub) in subscriptions.iter() {
                            if let Subscription::Logs(filter) = sub {
                                if log_matches(filter, &log) {
                                    let note = subscription_notification(sub_id, log_to_json(&log));
                                    if sink.send(Message::Text(note.into())).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = pending_poll.tick() => {
                if subscriptions.values().any(|s| matches!(s, Subscription::NewPendingTransactions)) {
                    let (hashes, newest) = ctx.pending_tx_log.since(last_pending_seq);
                    last_pending_seq = newest;
                    for hash in hashes {
                        for (sub_id, sub) in subscriptions.iter() {
                            if matches!(sub, Subscription::NewPendingTransactions) {
                                let note = subscription_notification(sub_id, json!(format!("0x{}", hex::encode(hash.as_bytes()))));
                                if sink.send(Message::Text(note.into())).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > IDLE_TIMEOUT {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                if sink.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn handle_client_message(
    text: &str,
    ctx: &RpcApiContext,
    subscriptions: &mut HashMap<String, Subscription>,
    last_pending_seq: &mut u64,
) -> String {
    let req: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return err_text(Value::Null, &format!("parse error: {e}")),
    };
    let id = req.get("id").cloned().unwrap_or(Value::Null);
    let method = req.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = req.get("params").and_then(Value::as_array).cloned().unwrap_or_default();

    match method {
        "eth_subscribe" => match subscribe(ctx, &params, subscriptions, last_pending_seq) {
            Ok(sub_id) => ok_text(id, json!(sub_id)),
            Err(e) => err_text(id, &e),
        },
        "eth_unsubscribe" => {
            let Some(sub_id) = params.first().and_then(Value::as_str) else {
                return err_text(id, "missing subscription id");
            };
            let removed = subscriptions.remove(sub_id).is_some();
            ok_text(id, json!(removed))
        }
        other => err_text(id, &format!("unsupported method over websocket: {other}")),
    }
}

fn subscribe(
    ctx: &RpcApiContext,
    params: &[Value],
    subscriptions: &mut HashMap<String, Subscription>,
    last_pending_seq: &mut u64,
) -> Result<String, String> {
    if subscriptions.len() >= MAX_SUBSCRIPTIONS_PER_CLIENT {
        return Err("too many subscriptions on this connection".into());
    }
    let kind = params.first().and_then(Value::as_str).ok_or("missing subscription type")?;
    let subscription = match kind {
        "newHeads" => Subscription::NewHeads,
        "newPendingTransactions" => {
            *last_pending_seq = ctx.pending_tx_log.latest_seq();
            Subscription::NewPendingTransactions
        }
        "logs" => Subscription::Logs(parse_log_filter_params(params.get(1))?),
        other => return Err(format!("unknown subscription type: {other}")),
    };
    let sub_id = new_subscription_id();
    subscriptions.insert(sub_id.clone(), subscription);
    Ok(sub_id)
}

fn parse_log_filter_params(v: Option<&Value>) -> Result<LogFilter, String> {
    let empty = json!({});
    let params = v.unwrap_or(&empty);
    let addresses = match params.get("address") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(vec![validate_address(s)?]),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|item| item.as_str().ok_or_else(|| "address must be a hex string".to_string()).and_then(validate_address))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => return Err("invalid address filter".into()),
    };
    let topics = match params.get("topics") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            if items.len() > MAX_TOPIC_POSITIONS {
                return Err(format!("too many topic positions: max {MAX_TOPIC_POSITIONS}"));
            }
            items.iter().map(parse_topic_position).collect::<Result<Vec<_>, _>>()?
        }
        _ => return Err("topics must be an array".into()),
    };
    Ok(LogFilter {
        from_block: 0,
        to_block: u64::MAX,
        addresses,
        topics,
    })
}

fn validate_address(s: &str) -> Result<Address, String> {
    parse_address(&json!(s)).map_err(|e| e.to_string())
}

fn parse_topic_position(v: &Value) -> Result<Option<Vec<H256>>, String> {
    match v {
        Value::Null => Ok(None),
        Value::String(_) => Ok(Some(vec![parse_h256(v).map_err(|e| e.to_string())?])),
        Value::Array(items) => {
            if items.is_empty() {
                return Ok(None);
            }
            Ok(Some(
                items
                    .iter()
                    .map(|item| parse_h256(item).map_err(|e| e.to_string()))
                    .collect::<Result<_, _>>()?,
            ))
        }
        _ => Err("invalid topics entry".into()),
    }
}

fn log_matches(filter: &LogFilter, log: &coc_common::Log) -> bool {
    if let Some(addresses) = &filter.addresses {
        if !addresses.contains(&log.address) {
            return false;
        }
    }
    for (i, position) in filter.topics.iter().enumerate() {
        if let Some(allowed) = position {
            match log.topics.get(i) {
                Some(topic) if allowed.contains(topic) => {}
                _ => return false,
            }
        }
    }
    true
}

fn subscription_notification(sub_id: &str, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "eth_subscription",
        "params": {
            "subscription": sub_id,
            "result": result,
        }
    })
    .to_string()
}

fn ok_text(id: Value, result: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string()
}

fn err_text(id: Value, message: &str) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32000, "message": message } }).to_string()
}
