//! `net_version` / `net_listening` / `net_peerCount` (§4.10).

use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::enc_u64;
use crate::error::RpcErr;
use crate::types::RpcRequest;

pub fn map_net_requests(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    match req.method.as_str() {
        "net_version" => Ok(json!(ctx.chain_id.to_string())),
        "net_listening" => Ok(json!(ctx.p2p.is_some())),
        "net_peerCount" => Ok(enc_u64(
            ctx.p2p.as_ref().map(|p| p.connected_peer_count() as u64).unwrap_or(0),
        )),
        other => Err(RpcErr::MethodNotFound(other.to_string())),
    }
}
