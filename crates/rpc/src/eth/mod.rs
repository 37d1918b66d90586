//! `eth_*` namespace (§4.10): the bulk of the JSON-RPC surface.

pub mod account;
pub mod block;
pub mod call;
pub mod fee;
pub mod filter;
pub mod logs;
pub mod sign;
pub mod transaction;

use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::enc_u64;
use crate::error::RpcErr;
use crate::types::RpcRequest;

/// The Ethereum protocol version this node reports, matching the wire
/// protocol's handshake chain-id/version scheme in spirit (it has no
/// consensus-split eth/N wire number of its own, so this is a fixed string).
const PROTOCOL_VERSION: &str = "0x41";

pub async fn map_eth_requests(req: &RpcRequest, ctx: RpcApiContext) -> Result<Value, RpcErr> {
    match req.method.as_str() {
        "eth_chainId" => Ok(enc_u64(ctx.chain_id)),
        "eth_blockNumber" => Ok(enc_u64(ctx.chain.height())),
        "eth_protocolVersion" => Ok(json!(PROTOCOL_VERSION)),
        "eth_syncing" => Ok(json!(false)),
        "eth_accounts" => Ok(sign::accounts(&ctx)),
        "eth_sign" => sign::sign(req, &ctx),
        "eth_signTypedData_v4" => sign::sign_typed_data_v4(req, &ctx),
        "eth_getBalance" => account::get_balance(req, &ctx),
        "eth_getTransactionCount" => account::get_transaction_count(req, &ctx),
        "eth_getCode" => account::get_code(req, &ctx),
        "eth_getStorageAt" => account::get_storage_at(req, &ctx),
        "eth_getBlockByNumber" => block::get_block_by_number(req, &ctx).await,
        "eth_getBlockByHash" => block::get_block_by_hash(req, &ctx).await,
        "eth_getBlockReceipts" => block::get_block_receipts(req, &ctx).await,
        "eth_getBlockTransactionCountByNumber" => block::get_block_tx_count_by_number(req, &ctx).await,
        "eth_getBlockTransactionCountByHash" => block::get_block_tx_count_by_hash(req, &ctx).await,
        "eth_getTransactionByHash" => transaction::get_transaction_by_hash(req, &ctx).await,
        "eth_getTransactionReceipt" => transaction::get_transaction_receipt(req, &ctx).await,
        "eth_sendRawTransaction" => transaction::send_raw_transaction(req, &ctx),
        "eth_sendTransaction" => transaction::send_transaction(req, &ctx),
        "eth_call" => call::call(req, &ctx),
        "eth_estimateGas" => call::estimate_gas(req, &ctx),
        "eth_createAccessList" => call::create_access_list(req, &ctx),
        "eth_gasPrice" => fee::gas_price(&ctx),
        "eth_maxPriorityFeePerGas" => fee::max_priority_fee_per_gas(&ctx),
        "eth_feeHistory" => fee::fee_history(req, &ctx),
        "eth_getLogs" => logs::get_logs(req, &ctx).await,
        "eth_newFilter" => filter::new_filter(req, ctx.clone()).await,
        "eth_newBlockFilter" => filter::new_block_filter(ctx.clone()),
        "eth_newPendingTransactionFilter" => filter::new_pending_transaction_filter(ctx.clone()),
        "eth_getFilterChanges" => filter::get_filter_changes(req, ctx.clone()).await,
        "eth_getFilterLogs" => filter::get_filter_logs(req, ctx.clone()).await,
        "eth_uninstallFilter" => filter::uninstall_filter(req, ctx.clone()),
        other => Err(RpcErr::MethodNotFound(other.to_string())),
    }
}
