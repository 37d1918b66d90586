//! `txpool_status` / `txpool_content` (§4.10): a window onto the mempool for
//! operators, grouped by sender the way every Ethereum client's txpool
//! namespace does.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::{enc_address, enc_u64, tx_to_json};
use crate::error::RpcErr;
use crate::types::RpcRequest;

pub fn map_txpool_requests(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    match req.method.as_str() {
        "txpool_status" => {
            let stats = ctx.mempool.stats();
            Ok(json!({
                "pending": enc_u64(stats.pending_count as u64),
                "queued": enc_u64(0),
            }))
        }
        "txpool_content" => {
            let mut pending: HashMap<String, HashMap<String, Value>> = HashMap::new();
            for entry in ctx.mempool.get_all() {
                let sender = enc_address(entry.from).as_str().unwrap().to_string();
                pending
                    .entry(sender)
                    .or_default()
                    .insert(entry.nonce.to_string(), tx_to_json(&entry.raw_tx, None, None));
            }
            Ok(json!({ "pending": pending, "queued": HashMap::<String, Value>::new() }))
        }
        other => Err(RpcErr::MethodNotFound(other.to_string())),
    }
}
