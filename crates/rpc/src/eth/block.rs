//! `eth_getBlockByNumber` / `eth_getBlockByHash` / `eth_getBlockReceipts` and
//! their transaction-count counterparts.
//!
//! Open question resolution: an unknown block number/hash returns JSON
//! `null` (matching `eth_getBlockByNumber`'s standard behavior), while a
//! known, empty block returns `[]` for its receipt/transaction list — the
//! two are distinguishable by the outer `null` vs. `[]`.

use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::{block_to_json, enc_u64, parse_block_tag, parse_h256, receipt_to_json};
use crate::error::RpcErr;
use crate::types::RpcRequest;

fn full_txs_flag(req: &RpcRequest, index: usize) -> bool {
    req.param(index).and_then(Value::as_bool).unwrap_or(false)
}

pub async fn get_block_by_number(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let number = parse_block_tag(req.param(0), ctx.chain.height())?;
    let full_txs = full_txs_flag(req, 1);
    match ctx.index.get_block(number).await? {
        Some(block) => Ok(block_to_json(&block, full_txs)),
        None => Ok(Value::Null),
    }
}

pub async fn get_block_by_hash(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let hash = parse_h256(req.required_param(0, "blockHash")?)?;
    let full_txs = full_txs_flag(req, 1);
    match ctx.index.get_block_by_hash(hash).await? {
        Some(block) => Ok(block_to_json(&block, full_txs)),
        None => Ok(Value::Null),
    }
}

pub async fn get_block_receipts(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let number = parse_block_tag(req.param(0), ctx.chain.height())?;
    let Some(block) = ctx.index.get_block(number).await? else {
        return Ok(Value::Null);
    };
    let mut receipts = Vec::with_capacity(block.txs.len());
    for (tx_index, tx) in block.txs.iter().enumerate() {
        if let Some(record) = ctx.index.get_tx(tx.hash).await? {
            receipts.push(receipt_to_json(&record.receipt, tx, tx_index as u32));
        }
    }
    Ok(json!(receipts))
}

pub async fn get_block_tx_count_by_number(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let number = parse_block_tag(req.param(0), ctx.chain.height())?;
    match ctx.index.get_block(number).await? {
        Some(block) => Ok(enc_u64(block.txs.len() as u64)),
        None => Ok(Value::Null),
    }
}

pub async fn get_block_tx_count_by_hash(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let hash = parse_h256(req.required_param(0, "blockHash")?)?;
    match ctx.index.get_block_by_hash(hash).await? {
        Some(block) => Ok(enc_u64(block.txs.len() as u64)),
        None => Ok(Value::Null),
    }
}
