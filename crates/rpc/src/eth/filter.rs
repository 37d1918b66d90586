//! `eth_newFilter` / `eth_newBlockFilter` / `eth_newPendingTransactionFilter`
//! and their `getFilterChanges` / `getFilterLogs` / `uninstallFilter`
//! counterparts (§4.10). Filter ids are random 32-byte handles, not
//! sequential, so a caller can't enumerate another caller's filters.

use std::time::{Duration, Instant};

use coc_common::H256;
use coc_storage::LogFilter;
use rand::RngCore;
use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::{enc_h256, log_to_json, parse_block_tag};
use crate::error::RpcErr;
use crate::types::RpcRequest;

/// Filters idle longer than this are pruned by the periodic sweep, mirroring
/// the teacher's filter-cleanup task shape (grounded on `server.rs`'s
/// `FILTER_DURATION` sweep).
pub const FILTER_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub enum FilterKind {
    Block,
    PendingTransaction,
    Log(LogFilter),
}

pub struct FilterState {
    pub kind: FilterKind,
    pub last_seen_block: u64,
    pub last_seen_tx_seq: u64,
    pub last_touched: Instant,
}

fn new_filter_id() -> H256 {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    H256::from(bytes)
}

pub async fn new_filter(req: &RpcRequest, ctx: RpcApiContext) -> Result<Value, RpcErr> {
    let params = req.required_param(0, "filter")?;
    let from_block = parse_block_tag(params.get("fromBlock"), ctx.chain.height())?;
    let to_block = parse_block_tag(params.get("toBlock"), ctx.chain.height())?;
    let addresses = params
        .get("address")
        .map(parse_address_list)
        .transpose()?;
    let topics = params
        .get("topics")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(parse_topic_position).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();

    let filter = LogFilter { from_block, to_block, addresses, topics };
    let id = new_filter_id();
    ctx.active_filters.lock().insert(
        id,
        FilterState {
            kind: FilterKind::Log(filter),
            last_seen_block: from_block.saturating_sub(1),
            last_seen_tx_seq: 0,
            last_touched: Instant::now(),
        },
    );
    Ok(enc_h256(id))
}

pub fn new_block_filter(ctx: RpcApiContext) -> Result<Value, RpcErr> {
    let id = new_filter_id();
    ctx.active_filters.lock().insert(
        id,
        FilterState {
            kind: FilterKind::Block,
            last_seen_block: ctx.chain.height(),
            last_seen_tx_seq: 0,
            last_touched: Instant::now(),
        },
    );
    Ok(enc_h256(id))
}

pub fn new_pending_transaction_filter(ctx: RpcApiContext) -> Result<Value, RpcErr> {
    let id = new_filter_id();
    ctx.active_filters.lock().insert(
        id,
        FilterState {
            kind: FilterKind::PendingTransaction,
            last_seen_block: 0,
            last_seen_tx_seq: ctx.pending_tx_log.latest_seq(),
            last_touched: Instant::now(),
        },
    );
    Ok(enc_h256(id))
}

pub fn uninstall_filter(req: &RpcRequest, ctx: RpcApiContext) -> Result<Value, RpcErr> {
    let id = crate::encoding::parse_h256(req.required_param(0, "filterId")?)?;
    let removed = ctx.active_filters.lock().remove(&id).is_some();
    Ok(json!(removed))
}

pub async fn get_filter_changes(req: &RpcRequest, ctx: RpcApiContext) -> Result<Value, RpcErr> {
    let id = crate::encoding::parse_h256(req.required_param(0, "filterId")?)?;

    // Snapshot what we need, then drop the lock before awaiting storage so a
    // slow index read can't hold up every other caller touching the map.
    enum Pending {
        Block { from: u64, to: u64 },
        PendingTx(Vec<H256>),
        Log(LogFilter),
    }
    let pending = {
        let mut filters = ctx.active_filters.lock();
        let state = filters.get_mut(&id).ok_or(RpcErr::NotFound)?;
        state.last_touched = Instant::now();
        match &state.kind {
            FilterKind::Block => {
                let current = ctx.chain.height();
                let from = state.last_seen_block + 1;
                state.last_seen_block = current;
                Pending::Block { from, to: current }
            }
            FilterKind::PendingTransaction => {
                let (hashes, newest) = ctx.pending_tx_log.since(state.last_seen_tx_seq);
                state.last_seen_tx_seq = newest;
                Pending::PendingTx(hashes)
            }
            FilterKind::Log(filter) => {
                let current = ctx.chain.height();
                if state.last_seen_block >= current {
                    return Ok(json!([]));
                }
                let mut scoped = filter.clone();
                scoped.from_block = state.last_seen_block + 1;
                scoped.to_block = current.min(filter.to_block);
                state.last_seen_block = current;
                Pending::Log(scoped)
            }
        }
    };

    match pending {
        Pending::Block { from, to } => {
            let mut hashes = Vec::new();
            for n in from..=to {
                if let Ok(Some(b)) = ctx.index.get_block(n).await {
                    hashes.push(enc_h256(b.hash));
                }
            }
            Ok(json!(hashes))
        }
        Pending::PendingTx(hashes) => Ok(json!(hashes.into_iter().map(enc_h256).collect::<Vec<_>>())),
        Pending::Log(scoped) => {
            let logs = ctx.index.get_logs(&scoped).await.map_err(RpcErr::from)?;
            Ok(json!(logs.iter().map(log_to_json).collect::<Vec<_>>()))
        }
    }
}

pub async fn get_filter_logs(req: &RpcRequest, ctx: RpcApiContext) -> Result<Value, RpcErr> {
    let id = crate::encoding::parse_h256(req.required_param(0, "filterId")?)?;
    let filter = {
        let filters = ctx.active_filters.lock();
        let state = filters.get(&id).ok_or(RpcErr::NotFound)?;
        match &state.kind {
            FilterKind::Log(filter) => filter.clone(),
            _ => return Err(RpcErr::InvalidParams("filter is not a log filter".into())),
        }
    };
    let logs = ctx.index.get_logs(&filter).await.map_err(RpcErr::from)?;
    Ok(json!(logs.iter().map(log_to_json).collect::<Vec<_>>()))
}

/// Drops filters nobody has polled in `FILTER_IDLE_TIMEOUT`, mirroring the
/// teacher's periodic filter-cleanup task.
pub fn sweep_idle_filters(ctx: &RpcApiContext) {
    let mut filters = ctx.active_filters.lock();
    filters.retain(|_, state| state.last_touched.elapsed() < FILTER_IDLE_TIMEOUT);
}

pub(crate) fn parse_address_list(v: &Value) -> Result<Vec<coc_common::Address>, RpcErr> {
    match v {
        Value::String(_) => Ok(vec![crate::encoding::parse_address(v)?]),
        Value::Array(items) => items.iter().map(crate::encoding::parse_address).collect(),
        _ => Err(RpcErr::InvalidParams("address must be a hex string or array".into())),
    }
}

/// Parses a `topics` array (`eth_getLogs`/`eth_newFilter` share this shape)
/// into one wildcard-or-OR-set per position.
pub(crate) fn parse_topic_filter_array(items: &[Value]) -> Result<Vec<Option<Vec<H256>>>, RpcErr> {
    items.iter().map(parse_topic_position).collect()
}

fn parse_topic_position(v: &Value) -> Result<Option<Vec<H256>>, RpcErr> {
    match v {
        Value::Null => Ok(None),
        Value::String(_) => Ok(Some(vec![crate::encoding::parse_h256(v)?])),
        Value::Array(items) => {
            if items.is_empty() {
                return Ok(None);
            }
            Ok(Some(items.iter().map(crate::encoding::parse_h256).collect::<Result<_, _>>()?))
        }
        _ => Err(RpcErr::InvalidParams("invalid topics entry".into())),
    }
}
