//! `eth_gasPrice` / `eth_maxPriorityFeePerGas` / `eth_feeHistory` (§4.8, §4.10):
//! thin windows onto the base-fee controller's current state. There is no
//! priority-fee market here (senders set `maxPriorityFeePerGas` themselves),
//! so the suggested tip is a fixed floor rather than a measured percentile.

use coc_common::U256;
use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::{enc_u256, enc_u64, parse_u64};
use crate::error::RpcErr;
use crate::types::RpcRequest;

/// Suggested `maxPriorityFeePerGas` when the caller has no better signal: 1 gwei.
const SUGGESTED_PRIORITY_FEE_WEI: u64 = 1_000_000_000;

pub fn gas_price(ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    Ok(enc_u256(ctx.chain.base_fee() + U256::from(SUGGESTED_PRIORITY_FEE_WEI)))
}

pub fn max_priority_fee_per_gas(_ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    Ok(enc_u256(U256::from(SUGGESTED_PRIORITY_FEE_WEI)))
}

/// `eth_feeHistory(blockCount, newestBlock, rewardPercentiles)`: reports the
/// last `blockCount` blocks' base fees. Since historical per-block base fees
/// and gas usage aren't retained beyond the live tip, every entry in the
/// window reports the current tip's values — accurate for the newest block,
/// a flat approximation for the rest.
pub fn fee_history(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let block_count = parse_u64(req.required_param(0, "blockCount")?)?.clamp(1, 1024);
    let newest = ctx.chain.height();
    let oldest = newest.saturating_sub(block_count.saturating_sub(1));

    let base_fee = ctx.chain.base_fee();
    let gas_used = ctx.chain.tip_gas_used();
    let gas_used_ratio = gas_used as f64 / coc_common::BLOCK_GAS_LIMIT as f64;

    let entries = (oldest..=newest).count();
    let base_fees: Vec<Value> = std::iter::repeat(enc_u256(base_fee)).take(entries + 1).collect();
    let gas_used_ratios: Vec<Value> = std::iter::repeat(json!(gas_used_ratio)).take(entries).collect();

    let reward_percentiles = req
        .param(2)
        .and_then(Value::as_array)
        .map(|arr| arr.len())
        .unwrap_or(0);
    let rewards: Vec<Value> = (0..entries)
        .map(|_| {
            json!(std::iter::repeat(enc_u256(U256::from(SUGGESTED_PRIORITY_FEE_WEI)))
                .take(reward_percentiles)
                .collect::<Vec<_>>())
        })
        .collect();

    Ok(json!({
        "oldestBlock": enc_u64(oldest),
        "baseFeePerGas": base_fees,
        "gasUsedRatio": gas_used_ratios,
        "reward": rewards,
    }))
}
