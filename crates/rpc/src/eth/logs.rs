//! `eth_getLogs` (§4.4, §4.10): delegates straight to the block index, which
//! already enforces the range/topic-count caps (`IndexError::RangeTooLarge`,
//! `IndexError::TooManyTopics`) this method is documented to reject with.

use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::{log_to_json, parse_block_tag};
use crate::error::RpcErr;
use crate::eth::filter::parse_topic_filter_array;
use crate::types::RpcRequest;
use coc_storage::LogFilter;

pub async fn get_logs(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let params = req.required_param(0, "filter")?;
    let from_block = parse_block_tag(params.get("fromBlock"), ctx.chain.height())?;
    let to_block = parse_block_tag(params.get("toBlock"), ctx.chain.height())?;
    let addresses = params
        .get("address")
        .map(crate::eth::filter::parse_address_list)
        .transpose()?;
    let topics = params
        .get("topics")
        .and_then(Value::as_array)
        .map(|arr| parse_topic_filter_array(arr))
        .transpose()?
        .unwrap_or_default();

    let filter = LogFilter { from_block, to_block, addresses, topics };
    let logs = ctx.index.get_logs(&filter).await.map_err(RpcErr::from)?;
    Ok(json!(logs.iter().map(log_to_json).collect::<Vec<_>>()))
}
