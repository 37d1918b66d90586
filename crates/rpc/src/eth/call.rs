//! `eth_call` / `eth_estimateGas` / `eth_createAccessList` (§4.10, §4.6
//! `callRaw`). All three are read-only: they never touch the mempool or
//! commit state, they only ask the execution engine to run a transaction
//! against its current view and report the result.

use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::{enc_bytes, enc_u256, parse_address, parse_bytes, parse_u256, parse_u64};
use crate::error::RpcErr;
use crate::types::RpcRequest;
use coc_vm::CallParams;

fn parse_call_params(v: &Value) -> Result<CallParams, RpcErr> {
    Ok(CallParams {
        from: v.get("from").map(parse_address).transpose()?,
        to: v.get("to").map(parse_address).transpose()?,
        data: match v.get("data").or_else(|| v.get("input")) {
            None | Some(Value::Null) => None,
            Some(d) => Some(parse_bytes(d)?),
        },
        value: v.get("value").map(parse_u256).transpose()?,
        gas: v.get("gas").map(parse_u64).transpose()?,
    })
}

pub fn call(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let params = parse_call_params(req.required_param(0, "transaction")?)?;
    let result = ctx.evm.call_raw(&params)?;
    Ok(enc_bytes(&result.return_value))
}

pub fn estimate_gas(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let params = parse_call_params(req.required_param(0, "transaction")?)?;
    let gas = ctx.evm.estimate_gas(&params)?;
    Ok(enc_u256(gas))
}

/// This node tracks no per-call storage-access list, so `eth_createAccessList`
/// runs the same read-only call and reports an empty access list alongside
/// the measured gas, rather than fabricating per-slot entries it never saw.
pub fn create_access_list(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let params = parse_call_params(req.required_param(0, "transaction")?)?;
    let result = ctx.evm.call_raw(&params)?;
    Ok(json!({
        "accessList": [],
        "gasUsed": enc_u256(coc_common::U256::from(result.gas_used)),
    }))
}
