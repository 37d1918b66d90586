//! `eth_getBalance` / `eth_getTransactionCount` / `eth_getCode` / `eth_getStorageAt`.
//! All four read straight from the execution engine's live state (§5: "RPC
//! read methods must call the engine, never the KV store directly").

use serde_json::Value;

use crate::context::RpcApiContext;
use crate::encoding::{enc_bytes, enc_h256, enc_u256, enc_u64, parse_address, parse_h256};
use crate::error::RpcErr;
use crate::types::RpcRequest;

pub fn get_balance(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let address = parse_address(req.required_param(0, "address")?)?;
    Ok(enc_u256(ctx.evm.get_balance(address)))
}

pub fn get_transaction_count(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let address = parse_address(req.required_param(0, "address")?)?;
    Ok(enc_u64(ctx.evm.get_nonce(address)))
}

pub fn get_code(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let address = parse_address(req.required_param(0, "address")?)?;
    Ok(enc_bytes(&ctx.evm.get_code(address)))
}

pub fn get_storage_at(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let address = parse_address(req.required_param(0, "address")?)?;
    let slot = parse_h256(req.required_param(1, "slot")?)?;
    Ok(enc_h256(ctx.evm.get_storage_at(address, slot)))
}
