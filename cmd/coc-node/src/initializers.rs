//! Process wiring (§6, §11): turns a validated `NodeConfig` and the CLI's
//! local-state options into the full set of components `main` drives.
//! Split out of `main.rs` the way the teacher separates `cli.rs` (flags)
//! from `initializers.rs` (what the flags build).

use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use secp256k1::SecretKey;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use coc_blockchain::{ChainEngine, Mempool, SignatureMode};
use coc_common::{Address, H256, U256};
use coc_config::{EnforcementMode, NodeConfig};
use coc_health::{SlidingWindowLimiter, TokenBucketLimiter};
use coc_p2p::{InboundAuthMode, P2pConfig, P2pNode};
use coc_pose::{AcceptedReceiptLog, ChallengeIssuer, PoseHttpAuthenticator, ReplayRegistry, StaticAllowlist};
use coc_rpc::context::{ChallengerIdentity, DevSigner, PendingTxLog, RpcApiContext, WsConnectionTracker};
use coc_settlement::SettlementState;
use coc_storage::backend::{libmdbx::LibmdbxStore, memory::InMemoryStore};
use coc_storage::{BlockIndex, KvStore};
use coc_vm::ExecutionEngine;

use crate::cli::Options;

pub fn init_tracing(opts: &Options) {
    let filter = EnvFilter::builder()
        .with_default_directive(opts.log_level.parse().unwrap_or(tracing::Level::INFO.into()))
        .from_env_lossy();
    fmt().with_env_filter(filter).init();
}

fn system_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Opens the persistent KV store, or the in-memory one when `datadir` is the
/// literal string `memory` — mirroring `open_store`'s `datadir.ends_with("memory")`
/// sentinel in the teacher's `initializers.rs`.
pub fn open_store(datadir: &str) -> Result<Arc<dyn KvStore>, coc_storage::StoreError> {
    if datadir == "memory" {
        info!("using the in-memory store; state will not survive a restart");
        return Ok(Arc::new(InMemoryStore::new()));
    }
    fs::create_dir_all(datadir).map_err(|e| coc_storage::StoreError::Corrupted(e.to_string()))?;
    let store = LibmdbxStore::open(Path::new(datadir))?;
    Ok(Arc::new(store))
}

/// Loads this node's signing key from `<datadir>/node.key`, generating and
/// persisting a new one on first run — same recovery-on-restart shape as
/// the teacher's `get_signer`. An in-memory datadir always gets a fresh key.
pub fn load_or_create_signer(datadir: &str) -> SecretKey {
    if datadir == "memory" {
        return SecretKey::new(&mut OsRng);
    }
    let key_path = Path::new(datadir).join("node.key");
    match fs::read(&key_path) {
        Ok(bytes) => SecretKey::from_slice(&bytes).expect("stored signer key is invalid"),
        Err(_) => {
            info!(path = %key_path.display(), "no signer key found, generating one");
            let secret_key = SecretKey::new(&mut OsRng);
            if let Some(parent) = key_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            fs::write(&key_path, secret_key.secret_bytes()).expect("failed to persist signer key");
            secret_key
        }
    }
}

fn parse_node_id(s: &str) -> H256 {
    let bytes = hex::decode(s.trim_start_matches("0x")).expect("validated hex node id");
    H256::from_slice(&bytes)
}

pub struct NodeHandles {
    pub chain: Arc<ChainEngine>,
    pub mempool: Arc<Mempool>,
    pub evm: Arc<ExecutionEngine>,
    pub index: Arc<BlockIndex>,
    pub p2p: Option<Arc<P2pNode>>,
    pub settlement: Arc<SettlementState>,
    pub accepted_receipts: Arc<AcceptedReceiptLog>,
    pub replay_registry: Arc<ReplayRegistry>,
    pub rpc_ctx: RpcApiContext,
    pub self_node_id: H256,
    pub block_time_ms: u64,
    pub max_tx_per_block: usize,
    pub rpc_addr: SocketAddr,
}

/// Builds every long-lived component from a validated config, ready for
/// `main` to spawn the proposer loop, the P2P server (if enabled), and the
/// RPC server against. The only fallible step is opening the store; every
/// other failure here (a malformed persisted signer key, an unparsable
/// listen address) reflects a config this process already validated, so it
/// panics the same way the teacher's `initializers.rs` does on its
/// can't-happen-after-validation paths.
pub async fn build_node(config: &NodeConfig, opts: &Options) -> Result<NodeHandles, coc_storage::StoreError> {
    let store = open_store(&opts.datadir)?;
    let index = Arc::new(BlockIndex::new(store.clone()));

    let signer = load_or_create_signer(&opts.datadir);
    let self_node_id = coc_crypto::node_id_from_secret_key(&signer);
    let self_address = coc_crypto::address_from_secret_key(&signer);
    info!(node_id = %format!("0x{}", hex::encode(self_node_id.as_bytes())), address = %format!("0x{}", hex::encode(self_address.as_bytes())), "node identity");

    let evm = Arc::new(ExecutionEngine::create(config.chain_id as u64));
    let mempool = Arc::new(Mempool::new(config.chain_id as u64, U256::from(config.min_gas_price_wei)));

    let validators: Vec<H256> = config.validators.iter().map(|v| parse_node_id(v)).collect();
    let signature_mode = match config.signature_enforcement {
        EnforcementMode::Off => SignatureMode::Off,
        EnforcementMode::Monitor => SignatureMode::Monitor,
        EnforcementMode::Enforce => SignatureMode::Enforce,
    };

    let chain = Arc::new(ChainEngine::new(
        config.chain_id as u64,
        self_node_id,
        validators,
        config.finality_depth,
        signature_mode,
        evm.clone(),
        index.clone(),
        mempool.clone(),
        Box::new(system_now_ms),
    ));

    let p2p = if opts.p2p_enabled {
        let p2p_config = P2pConfig {
            chain_id: config.chain_id as u64,
            listen_addr: format!("0.0.0.0:{}", config.p2p_port).parse().expect("valid p2p listen addr"),
            max_connections: config.p2p_max_peers,
            max_connections_per_ip: config.p2p_max_peers.max(1),
            inbound_auth_mode: match config.p2p_inbound_auth_mode {
                EnforcementMode::Off => InboundAuthMode::Off,
                EnforcementMode::Monitor => InboundAuthMode::Monitor,
                EnforcementMode::Enforce => InboundAuthMode::Enforce,
            },
            max_discovered_per_batch: config.p2p_max_discovered_per_batch,
            rate_limit_window_ms: config.p2p_rate_limit_window_ms,
            rate_limit_max_requests: config.p2p_rate_limit_max_requests,
        };
        let sign_secret = signer;
        let node = P2pNode::new(
            p2p_config,
            self_node_id,
            Box::new(move |msg: &[u8]| coc_crypto::sign(msg, &sign_secret).expect("node key can always sign")),
            chain.clone(),
            mempool.clone(),
            evm.clone(),
            index.clone(),
        );
        coc_p2p::spawn_server(node.clone());
        for addr in &opts.p2p_bootnodes {
            if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
                let node = node.clone();
                tokio::spawn(async move {
                    if let Err(e) = coc_p2p::dial(node, socket_addr).await {
                        tracing::warn!(%socket_addr, error = %e, "failed to dial bootnode");
                    }
                });
            }
        }
        Some(node)
    } else {
        None
    };

    let settlement = Arc::new(SettlementState::new());
    let replay_registry = Arc::new(ReplayRegistry::new(store.clone(), config.storage.nonce_retention_days as usize * 100_000));
    replay_registry.load().await.expect("failed to load the replay registry");
    let accepted_receipts = Arc::new(AcceptedReceiptLog::new(store.clone()));
    accepted_receipts.load().await.expect("failed to load the accepted-receipt log");

    let challenge_issuer = Arc::new(ChallengeIssuer::new(config.pose_max_challenges_per_epoch));
    let pose_http_auth = Arc::new(PoseHttpAuthenticator::new(
        coc_pose::AuthMode::Off,
        Box::new(StaticAllowlist(HashSet::new())),
    ));

    let challenger_identity = if opts.challenger {
        let secret_key = SecretKey::new(&mut OsRng);
        let pubkey = coc_crypto::raw_pubkey_for_secret_key(&secret_key);
        Some(Arc::new(ChallengerIdentity { secret_key, pubkey }))
    } else {
        None
    };

    let dev_signer = Some(Arc::new(DevSigner { secret_key: signer, address: self_address }));

    let rpc_ctx = RpcApiContext {
        chain: chain.clone(),
        mempool: mempool.clone(),
        evm: evm.clone(),
        index: index.clone(),
        p2p: p2p.clone(),
        settlement: settlement.clone(),
        challenge_issuer,
        replay_registry: replay_registry.clone(),
        accepted_receipts: accepted_receipts.clone(),
        pose_http_auth,
        chain_id: config.chain_id as u64,
        enable_admin_rpc: config.enable_admin_rpc,
        rpc_auth_token: config.rpc_auth_token.clone().map(Arc::from),
        dev_signer,
        challenger_identity,
        active_filters: Arc::new(parking_lot::Mutex::new(std::collections::HashMap::new())),
        pending_tx_log: Arc::new(PendingTxLog::default()),
        http_rate_limiter: Arc::new(SlidingWindowLimiter::new(
            std::time::Duration::from_millis(60_000),
            200,
        )),
        pose_rate_limiter: Arc::new(SlidingWindowLimiter::new(std::time::Duration::from_millis(60_000), 60)),
        ws_message_limiter: Arc::new(TokenBucketLimiter::new(100, 20, 10_000)),
        ws_connections: Arc::new(WsConnectionTracker::default()),
        now_fn: Arc::new(system_now_ms),
    };

    let rpc_addr = format!("{}:{}", opts.http_addr, config.rpc_port)
        .parse()
        .expect("valid rpc listen address");

    Ok(NodeHandles {
        chain,
        mempool,
        evm,
        index,
        p2p,
        settlement,
        accepted_receipts,
        replay_registry,
        rpc_ctx,
        self_node_id,
        block_time_ms: config.block_time_ms,
        max_tx_per_block: config.max_tx_per_block,
        rpc_addr,
    })
}

/// The relayer's slasher identity and whether this node runs the aggregator
/// loop — both derive from `--aggregator`; a node that doesn't aggregate
/// never needs a slasher key of its own.
pub fn aggregator_identity(enabled: bool) -> Option<(Address, SecretKey)> {
    if !enabled {
        return None;
    }
    let secret_key = SecretKey::new(&mut OsRng);
    let address = coc_crypto::address_from_secret_key(&secret_key);
    Some((address, secret_key))
}
