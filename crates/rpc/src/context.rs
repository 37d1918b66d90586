//! Shared server state handed to every RPC/PoSe HTTP handler and every
//! WebSocket connection (§5 "RPC read methods must call the engine, never
//! the KV store directly").

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coc_blockchain::{ChainEngine, Mempool};
use coc_common::H256;
use coc_health::{SlidingWindowLimiter, TokenBucketLimiter};
use coc_p2p::P2pNode;
use coc_pose::{AcceptedReceiptLog, ChallengeIssuer, PoseHttpAuthenticator, ReplayRegistry};
use coc_settlement::SettlementState;
use coc_storage::BlockIndex;
use coc_vm::ExecutionEngine;
use parking_lot::Mutex;
use secp256k1::SecretKey;
use std::net::IpAddr;

use crate::eth::filter::FilterState;

/// An optional local key the node can use to answer `eth_accounts`,
/// `eth_sign`, `eth_signTypedData_v4` and `eth_sendTransaction` — a
/// developer convenience, not a wallet. Disabled (`None`) by default.
pub struct DevSigner {
    pub secret_key: SecretKey,
    pub address: coc_common::Address,
}

/// The keypair this node signs issued PoSe challenges with when it acts as a
/// challenger (§4.11 `issueChallenge`). A node that never challenges others
/// leaves this `None`, and `/pose/challenge` answers 501.
pub struct ChallengerIdentity {
    pub secret_key: SecretKey,
    pub pubkey: Vec<u8>,
}

/// Monotonically numbered log of every transaction hash admitted to the
/// mempool via this node's RPC surface, read by `eth_newPendingTransactionFilter`.
#[derive(Default)]
pub struct PendingTxLog {
    next_seq: AtomicU64,
    entries: Mutex<VecDeque<(u64, H256)>>,
}

const PENDING_TX_LOG_CAPACITY: usize = 10_000;

impl PendingTxLog {
    pub fn record(&self, hash: H256) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock();
        entries.push_back((seq, hash));
        if entries.len() > PENDING_TX_LOG_CAPACITY {
            entries.pop_front();
        }
        seq
    }

    pub fn since(&self, last_seq: u64) -> (Vec<H256>, u64) {
        let entries = self.entries.lock();
        let matched: Vec<H256> = entries.iter().filter(|(seq, _)| *seq > last_seq).map(|(_, h)| *h).collect();
        let newest = entries.back().map(|(seq, _)| *seq).unwrap_or(last_seq);
        (matched, newest)
    }

    pub fn latest_seq(&self) -> u64 {
        self.entries.lock().back().map(|(seq, _)| *seq).unwrap_or(0)
    }
}

/// Tracks live WebSocket connections against the global and per-IP caps
/// (§4.10 `MAX_CONNECTIONS=100`, per-IP=10). A dropped [`WsConnectionGuard`]
/// releases both counters.
#[derive(Default)]
pub struct WsConnectionTracker {
    total: AtomicU64,
    per_ip: Mutex<HashMap<IpAddr, u32>>,
}

pub const WS_MAX_CONNECTIONS: u64 = 100;
pub const WS_MAX_CONNECTIONS_PER_IP: u32 = 10;

impl WsConnectionTracker {
    pub fn try_acquire(self: &Arc<Self>, ip: IpAddr) -> Option<WsConnectionGuard> {
        if self.total.load(Ordering::SeqCst) >= WS_MAX_CONNECTIONS {
            return None;
        }
        {
            let mut per_ip = self.per_ip.lock();
            let count = per_ip.entry(ip).or_insert(0);
            if *count >= WS_MAX_CONNECTIONS_PER_IP {
                return None;
            }
            *count += 1;
        }
        self.total.fetch_add(1, Ordering::SeqCst);
        Some(WsConnectionGuard {
            tracker: self.clone(),
            ip,
        })
    }
}

pub struct WsConnectionGuard {
    tracker: Arc<WsConnectionTracker>,
    ip: IpAddr,
}

impl Drop for WsConnectionGuard {
    fn drop(&mut self) {
        self.tracker.total.fetch_sub(1, Ordering::SeqCst);
        let mut per_ip = self.tracker.per_ip.lock();
        if let Some(count) = per_ip.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                per_ip.remove(&self.ip);
            }
        }
    }
}

#[derive(Clone)]
pub struct RpcApiContext {
    pub chain: Arc<ChainEngine>,
    pub mempool: Arc<Mempool>,
    pub evm: Arc<ExecutionEngine>,
    pub index: Arc<BlockIndex>,
    pub p2p: Option<Arc<P2pNode>>,
    pub settlement: Arc<SettlementState>,
    pub challenge_issuer: Arc<ChallengeIssuer>,
    pub replay_registry: Arc<ReplayRegistry>,
    pub accepted_receipts: Arc<AcceptedReceiptLog>,
    pub pose_http_auth: Arc<PoseHttpAuthenticator>,
    pub chain_id: u64,
    pub enable_admin_rpc: bool,
    pub rpc_auth_token: Option<Arc<str>>,
    pub dev_signer: Option<Arc<DevSigner>>,
    pub challenger_identity: Option<Arc<ChallengerIdentity>>,
    pub active_filters: Arc<Mutex<HashMap<H256, FilterState>>>,
    pub pending_tx_log: Arc<PendingTxLog>,
    pub http_rate_limiter: Arc<SlidingWindowLimiter<IpAddr>>,
    pub pose_rate_limiter: Arc<SlidingWindowLimiter<IpAddr>>,
    pub ws_message_limiter: Arc<TokenBucketLimiter<u64>>,
    pub ws_connections: Arc<WsConnectionTracker>,
    pub now_fn: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl RpcApiContext {
    pub fn now_ms(&self) -> u64 {
        (self.now_fn)()
    }

    pub fn current_epoch(&self) -> coc_common::EpochId {
        coc_common::current_epoch(self.now_ms() / 1000)
    }

    /// Constant-time bearer-token comparison (§4.10): equal-length XOR fold
    /// so a timing side-channel can't leak how many leading bytes matched.
    pub fn check_bearer_token(&self, provided: Option<&str>) -> bool {
        let Some(expected) = &self.rpc_auth_token else {
            return true;
        };
        let Some(provided) = provided else { return false };
        let expected = expected.as_bytes();
        let provided = provided.as_bytes();
        if expected.len() != provided.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in expected.iter().zip(provided.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}
