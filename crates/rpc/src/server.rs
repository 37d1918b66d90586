//! The JSON-RPC HTTP server (§4.10): `POST /` accepts a single request or a
//! batch, enforces body-size/rate-limit/auth before any method runs, and
//! dispatches into the namespace modules. PoSe's HTTP/JSON surface and the
//! WebSocket subscription server are mounted alongside it on the same axum
//! router.

use std::net::{IpAddr, SocketAddr};

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::context::RpcApiContext;
use crate::error::RpcErr;
use crate::types::{rpc_response, RpcNamespace, RpcRequest, RpcRequestId, RpcRequestWrapper};

/// Request bodies above this size are rejected with HTTP 413 before JSON
/// parsing even runs (§4.10).
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

async fn dispatch(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    match req.namespace()? {
        RpcNamespace::Eth => crate::eth::map_eth_requests(req, ctx.clone()).await,
        RpcNamespace::Net => crate::net::map_net_requests(req, ctx),
        RpcNamespace::Web3 => crate::web3::map_web3_requests(req, ctx),
        RpcNamespace::Txpool => crate::txpool::map_txpool_requests(req, ctx),
        RpcNamespace::Debug => crate::debug::map_debug_requests(req, ctx).await,
        RpcNamespace::Trace => crate::trace::map_trace_requests(req, ctx).await,
        RpcNamespace::Admin => {
            if !ctx.enable_admin_rpc {
                return Err(RpcErr::MethodNotFound(req.method.clone()));
            }
            crate::admin::map_admin_requests(req, ctx).await
        }
        RpcNamespace::Coc => crate::coc::map_coc_requests(req, ctx).await,
    }
}

async fn handle_single(req: RpcRequest, ctx: &RpcApiContext) -> Value {
    let id = req.id.clone();
    let result = dispatch(&req, ctx).await;
    if let Err(e) = &result {
        warn!(method = %req.method, error = %e, "rpc call failed");
    }
    rpc_response(id, result)
}

fn client_ip(headers: &HeaderMap, connect_info: IpAddr) -> IpAddr {
    // Trust a reverse-proxy-set header only when present; otherwise fall
    // back to the observed TCP peer address.
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(connect_info)
}

fn check_auth(ctx: &RpcApiContext, bearer: Option<&TypedHeader<Authorization<Bearer>>>) -> bool {
    ctx.check_bearer_token(bearer.map(|header| header.token()))
}

async fn rpc_handler(
    State(ctx): State<RpcApiContext>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    body: Bytes,
) -> Response {
    if body.len() > MAX_BODY_BYTES {
        return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
    }

    let ip = client_ip(&headers, peer_addr.ip());
    if !ctx.http_rate_limiter.allow(ip) {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }
    if !check_auth(&ctx, bearer.as_ref()) {
        return (StatusCode::UNAUTHORIZED, "authentication failed").into_response();
    }

    let wrapper: RpcRequestWrapper = match serde_json::from_slice(&body) {
        Ok(w) => w,
        Err(e) => {
            let err = rpc_response(RpcRequestId::Null, Err(RpcErr::ParseError(e.to_string())));
            return Json(err).into_response();
        }
    };

    match wrapper {
        RpcRequestWrapper::Single(req) => Json(handle_single(req, &ctx).await).into_response(),
        RpcRequestWrapper::Multiple(reqs) => {
            let mut results = Vec::with_capacity(reqs.len());
            for req in reqs {
                results.push(handle_single(req, &ctx).await);
            }
            Json(results).into_response()
        }
    }
}

/// Builds the full axum router: the JSON-RPC endpoint, the PoSe HTTP
/// surface, and the WebSocket subscription endpoint, all sharing one
/// [`RpcApiContext`].
pub fn build_router(ctx: RpcApiContext) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .route("/pose/challenge", post(crate::pose_routes::challenge_handler))
        .route("/pose/receipt", post(crate::pose_routes::receipt_handler))
        .route("/pose/status", get(crate::pose_routes::status_handler))
        .route("/ws", get(crate::websocket::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serves the router on `addr` until the process is signaled to stop, the
/// way the teacher's `initializers.rs` spawns its own axum server.
pub async fn serve(addr: SocketAddr, ctx: RpcApiContext) -> std::io::Result<()> {
    let app = build_router(ctx);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
}
