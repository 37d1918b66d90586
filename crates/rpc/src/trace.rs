//! `trace_transaction` (§4.10): the Parity-style tracing namespace's single
//! method this node answers, built from the same receipt-shaped summary as
//! `debug_traceTransaction` (see `crate::debug`).

use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::{enc_address, enc_u64, parse_h256};
use crate::error::RpcErr;
use crate::types::RpcRequest;

pub async fn map_trace_requests(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    match req.method.as_str() {
        "trace_transaction" => {
            let hash = parse_h256(req.required_param(0, "transactionHash")?)?;
            match ctx.index.get_tx(hash).await? {
                Some(record) => Ok(json!([{
                    "action": {
                        "from": enc_address(record.raw_tx.from),
                        "to": record.raw_tx.to.map(enc_address),
                        "gas": enc_u64(record.raw_tx.gas_limit),
                    },
                    "result": {
                        "gasUsed": enc_u64(record.receipt.gas_used),
                    },
                    "type": "call",
                }])),
                None => Ok(json!([])),
            }
        }
        other => Err(RpcErr::MethodNotFound(other.to_string())),
    }
}
