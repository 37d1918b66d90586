//! `admin_nodeInfo` / `admin_addPeer` (§4.10), gated on `enableAdminRpc` by
//! the caller before dispatch reaches this module (see `server::handle_single`).

use std::net::SocketAddr;

use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::enc_u64;
use crate::error::RpcErr;
use crate::types::RpcRequest;

pub async fn map_admin_requests(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    match req.method.as_str() {
        "admin_nodeInfo" => Ok(json!({
            "id": format!("0x{}", hex::encode(ctx.chain.self_node_id().as_bytes())),
            "name": concat!("coc-node/v", env!("CARGO_PKG_VERSION")),
            "chainId": enc_u64(ctx.chain_id),
            "listenAddr": ctx.p2p.is_some(),
            "peers": enc_u64(ctx.p2p.as_ref().map(|p| p.connected_peer_count() as u64).unwrap_or(0)),
        })),
        "admin_addPeer" => {
            let Some(p2p) = ctx.p2p.clone() else {
                return Err(RpcErr::InvalidParams("p2p fabric is disabled on this node".into()));
            };
            let addr_str = req
                .required_param(0, "enodeOrAddr")?
                .as_str()
                .ok_or_else(|| RpcErr::InvalidParams("expected a socket address string".into()))?;
            let addr: SocketAddr = addr_str
                .parse()
                .map_err(|_| RpcErr::InvalidParams(format!("invalid peer address: {addr_str}")))?;
            coc_p2p::dial(p2p, addr)
                .await
                .map_err(|e| RpcErr::Internal(format!("dial failed: {e}")))?;
            Ok(json!(true))
        }
        other => Err(RpcErr::MethodNotFound(other.to_string())),
    }
}
