//! `debug_traceTransaction` / `debug_traceBlockByNumber` (§4.10).
//!
//! The execution engine (C6) is a thin `revm` wrapper with no opcode-level
//! step tracer attached (§4.6 lists `create/prefund/execute/call/estimateGas`
//! as its surface, not tracing); these endpoints report the
//! `callTracer`-shaped summary the stored receipt already carries — status,
//! gas used, logs — rather than fabricating per-opcode structLogs no
//! component here ever produced.

use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::{enc_bytes, enc_h256, enc_u64, log_to_json, parse_block_tag, parse_h256};
use crate::error::RpcErr;
use crate::types::RpcRequest;

fn receipt_trace(receipt: &coc_common::Receipt) -> Value {
    json!({
        "gas": enc_u64(receipt.gas_used),
        "failed": !receipt.status,
        "returnValue": enc_bytes(&[]),
        "structLogs": Value::Array(vec![]),
        "logs": receipt.logs.iter().map(log_to_json).collect::<Vec<_>>(),
    })
}

pub async fn trace_transaction(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let hash = parse_h256(req.required_param(0, "transactionHash")?)?;
    match ctx.index.get_tx(hash).await? {
        Some(record) => Ok(receipt_trace(&record.receipt)),
        None => Ok(Value::Null),
    }
}

pub async fn trace_block_by_number(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let number = parse_block_tag(req.param(0), ctx.chain.height())?;
    let Some(block) = ctx.index.get_block(number).await? else {
        return Ok(Value::Null);
    };
    let mut out = Vec::with_capacity(block.txs.len());
    for tx in &block.txs {
        if let Some(record) = ctx.index.get_tx(tx.hash).await? {
            out.push(json!({
                "txHash": enc_h256(tx.hash),
                "result": receipt_trace(&record.receipt),
            }));
        }
    }
    Ok(json!(out))
}

pub async fn map_debug_requests(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    match req.method.as_str() {
        "debug_traceTransaction" => trace_transaction(req, ctx).await,
        "debug_traceBlockByNumber" => trace_block_by_number(req, ctx).await,
        other => Err(RpcErr::MethodNotFound(other.to_string())),
    }
}
