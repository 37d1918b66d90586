//! PoSe HTTP/JSON endpoints (§4.11): `POST /pose/challenge`, `POST
//! /pose/receipt`, `GET /pose/status`, each guarded by the per-IP PoSe rate
//! limit (60 req/min, `ctx.pose_rate_limiter`) and the same body-size cap as
//! the JSON-RPC endpoint.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use coc_common::{Address, ChallengeMessage, ReceiptMessage, H256};

use crate::context::RpcApiContext;

/// How long after `issuedAtMs` a receipt's `responseAtMs` may land (§4.11
/// "within the configured latency window"); no config key names this, so it
/// lives here the way `MAX_CLOCK_SKEW_MS` lives in `coc_pose::http_auth`.
const RECEIPT_LATENCY_WINDOW_MS: u64 = 30_000;

fn err_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn node_address_from_pubkey(pubkey: &[u8]) -> Address {
    let hash = coc_common::keccak256(pubkey);
    Address::from_slice(&hash.as_bytes()[12..])
}

async fn apply_auth(
    ctx: &RpcApiContext,
    path: &str,
    body: &mut Value,
) -> Result<Option<Address>, Response> {
    ctx.pose_http_auth
        .authenticate(path, body, ctx.now_ms())
        .await
        .map_err(|e| err_response(StatusCode::UNAUTHORIZED, e.to_string()))
}

pub async fn challenge_handler(
    State(ctx): State<RpcApiContext>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    Json(mut body): Json<Value>,
) -> Response {
    if !ctx.pose_rate_limiter.allow(peer_addr.ip()) {
        return err_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }
    if let Err(resp) = apply_auth(&ctx, "/pose/challenge", &mut body).await {
        return resp;
    }

    let Some(identity) = &ctx.challenger_identity else {
        return err_response(StatusCode::NOT_IMPLEMENTED, "this node is not configured as a challenger");
    };

    let node_id_hex = match body.get("nodeId").and_then(Value::as_str) {
        Some(s) => s,
        None => return err_response(StatusCode::BAD_REQUEST, "missing nodeId"),
    };
    let node_id_bytes = match hex::decode(node_id_hex.trim_start_matches("0x")) {
        Ok(b) if b.len() == 32 => b,
        _ => return err_response(StatusCode::BAD_REQUEST, "nodeId must be 32 bytes"),
    };
    let node_id = H256::from_slice(&node_id_bytes);

    let epoch_id = ctx.current_epoch();
    let nonce: u64 = rand::random();
    let challenge = match ctx.challenge_issuer.issue(
        node_id,
        epoch_id,
        ctx.now_ms(),
        nonce,
        &identity.pubkey,
        &identity.secret_key,
    ) {
        Ok(c) => c,
        Err(coc_pose::PoseError::QuotaExceeded) => {
            return err_response(StatusCode::TOO_MANY_REQUESTS, "challenge quota exhausted for this epoch");
        }
        Err(e) => return err_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    Json(json!({
        "challengeId": format!("0x{}", hex::encode(challenge.challenge_id.as_bytes())),
        "nodeId": format!("0x{}", hex::encode(challenge.node_id.as_bytes())),
        "epochId": challenge.epoch_id.to_string(),
        "issuedAtMs": challenge.issued_at_ms,
        "challengerSig": format!("0x{}", hex::encode(&challenge.challenger_sig)),
    }))
    .into_response()
}

pub async fn receipt_handler(
    State(ctx): State<RpcApiContext>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    Json(mut body): Json<Value>,
) -> Response {
    if !ctx.pose_rate_limiter.allow(peer_addr.ip()) {
        return err_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }
    if let Err(resp) = apply_auth(&ctx, "/pose/receipt", &mut body).await {
        return resp;
    }

    let Some(receipt_json) = body.get("receipt") else {
        return err_response(StatusCode::BAD_REQUEST, "missing receipt");
    };
    let receipt = match parse_receipt(receipt_json) {
        Ok(r) => r,
        Err(msg) => return err_response(StatusCode::BAD_REQUEST, msg),
    };
    let challenge = body.get("challenge").and_then(|v| parse_challenge(v).ok());

    let Some(node_record) = ctx.settlement.get_node(receipt.node_id) else {
        return err_response(StatusCode::BAD_REQUEST, "unknown nodeId");
    };
    let expected_signer = node_address_from_pubkey(&node_record.pubkey);

    match coc_pose::accept_receipt(
        &ctx.challenge_issuer,
        &ctx.replay_registry,
        challenge.as_ref(),
        &receipt,
        expected_signer,
        RECEIPT_LATENCY_WINDOW_MS,
    ) {
        Ok(()) => {
            let key = ReceiptMessage::replay_key(receipt.challenge_id);
            if let Err(e) = ctx.replay_registry.persist(key, receipt.response_at_ms).await {
                return err_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
            // The challenge carries the epoch it was issued for; fall back to the
            // current epoch if the caller didn't echo it back (§4.11 treats the
            // challenge as optional when a prior `accept_receipt` already bound it).
            let epoch_id = challenge.as_ref().map(|c| c.epoch_id).unwrap_or_else(|| ctx.current_epoch());
            if let Err(e) = ctx.accepted_receipts.record(epoch_id, receipt.clone()).await {
                return err_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
            Json(json!({ "accepted": true })).into_response()
        }
        Err(e) => err_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn parse_challenge(v: &Value) -> Result<ChallengeMessage, String> {
    serde_json::from_value(v.clone()).map_err(|e| format!("invalid challenge: {e}"))
}

fn parse_receipt(v: &Value) -> Result<ReceiptMessage, String> {
    serde_json::from_value(v.clone()).map_err(|e| format!("invalid receipt: {e}"))
}

pub async fn status_handler(State(ctx): State<RpcApiContext>) -> Response {
    Json(json!({
        "epochId": ctx.current_epoch().to_string(),
        "ts": ctx.now_ms(),
    }))
    .into_response()
}
