//! The P2P node itself (§4.9): TCP accept loop, handshake, admission
//! control, gossip dispatch and relay, discovery. Grounded on the teacher's
//! `net.rs` (`start_network` / `serve_p2p_requests` / `listener` / the
//! receiver-vs-initiator split) for the accept-loop shape; the RLPx
//! encryption handshake there doesn't apply since this wire protocol is
//! plain framed JSON.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use coc_blockchain::{ChainEngine, Mempool};
use coc_common::{keccak256, Block, NodeId, RawTransaction, H256};
use coc_crypto::{block_message, verify_node_sig, wire_handshake_message, Signature65};
use coc_health::TokenBucketLimiter;
use coc_storage::BlockIndex;
use coc_vm::ExecutionEngine;

use crate::codec::FrameCodec;
use crate::discovery::PendingDiscovery;
use crate::error::P2PError;
use crate::message::{
    BftVote, BlockResp, FindNode, FindNodeResp, Handshake, Message, PeerInfo, PingPong, Snapshot,
};
use crate::peers::PeerTable;
use crate::seen::BoundedSeenSet;

const SEEN_TX_CAPACITY: usize = 50_000;
const SEEN_BLOCKS_CAPACITY: usize = 10_000;
const MAX_KNOWN_PEERS: usize = 1_000;
const GOSSIP_RELAY_CAPACITY: usize = 4_096;
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// `off` never checks the handshake signature; `monitor` logs but admits
/// anyway; `enforce` closes unauthenticated inbound connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundAuthMode {
    Off,
    Monitor,
    Enforce,
}

#[derive(Debug, Clone)]
pub struct P2pConfig {
    pub chain_id: u64,
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    pub inbound_auth_mode: InboundAuthMode,
    pub max_discovered_per_batch: usize,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
}

/// A block or transaction that cleared gossip dedup and chain/mempool
/// admission, handed off to the cross-protocol HTTP relay (§4.9 "forwarded
/// to the cross-protocol HTTP relay").
#[derive(Debug, Clone)]
pub enum GossipEvent {
    Block(Arc<Block>),
    Tx(Arc<RawTransaction>),
}

pub struct P2pNode {
    config: P2pConfig,
    self_node_id: NodeId,
    sign: Box<dyn Fn(&[u8]) -> Signature65 + Send + Sync>,
    peer_table: Arc<PeerTable>,
    discovery: PendingDiscovery,
    known_peers: Mutex<Vec<PeerInfo>>,
    peer_senders: Mutex<std::collections::HashMap<NodeId, mpsc::Sender<Message>>>,
    rate_limiter: TokenBucketLimiter<IpAddr>,
    relay_tx: broadcast::Sender<Message>,
    gossip_out: broadcast::Sender<GossipEvent>,
    tracker: TaskTracker,

    chain: Arc<ChainEngine>,
    mempool: Arc<Mempool>,
    evm: Arc<ExecutionEngine>,
    index: Arc<BlockIndex>,
}

impl P2pNode {
    pub fn new(
        config: P2pConfig,
        self_node_id: NodeId,
        sign: Box<dyn Fn(&[u8]) -> Signature65 + Send + Sync>,
        chain: Arc<ChainEngine>,
        mempool: Arc<Mempool>,
        evm: Arc<ExecutionEngine>,
        index: Arc<BlockIndex>,
    ) -> Arc<Self> {
        let peer_table = PeerTable::new(config.max_connections, config.max_connections_per_ip);
        let rate_limit_per_sec =
            ((config.rate_limit_max_requests as u64 * 1000) / config.rate_limit_window_ms.max(1)).max(1) as u32;
        let rate_limiter = TokenBucketLimiter::new(
            config.rate_limit_max_requests,
            rate_limit_per_sec,
            config.max_connections * 4,
        );
        let (relay_tx, _) = broadcast::channel(GOSSIP_RELAY_CAPACITY);
        let (gossip_out, _) = broadcast::channel(GOSSIP_RELAY_CAPACITY);

        Arc::new(Self {
            config,
            self_node_id,
            sign,
            peer_table,
            discovery: PendingDiscovery::new(),
            known_peers: Mutex::new(Vec::new()),
            peer_senders: Mutex::new(std::collections::HashMap::new()),
            rate_limiter,
            relay_tx,
            gossip_out,
            tracker: TaskTracker::new(),
            chain,
            mempool,
            evm,
            index,
        })
    }

    pub fn connected_peer_count(&self) -> usize {
        self.peer_table.connected_count()
    }

    pub fn subscribe_gossip(&self) -> broadcast::Receiver<GossipEvent> {
        self.gossip_out.subscribe()
    }

    /// Broadcasts a locally-produced block to every currently-connected peer.
    pub fn broadcast_block(&self, block: Arc<Block>) {
        let _ = self.relay_tx.send(Message::Block((*block).clone()));
    }

    /// Broadcasts a locally-admitted (RPC-submitted) transaction to peers.
    pub fn broadcast_tx(&self, tx: RawTransaction) {
        let _ = self.relay_tx.send(Message::Tx(tx));
    }

    /// Sends a `FindNode` to an already-connected peer and awaits its
    /// response, subject to the 10s discovery timeout (§4.9, §5).
    pub async fn find_node(&self, peer: NodeId, target: NodeId) -> Result<FindNodeResp, P2PError> {
        let request_id: u64 = rand::random();
        let sender = self.peer_senders.lock().get(&peer).cloned();
        let Some(sender) = sender else {
            return Err(P2PError::AdmissionRejected("no active session with that peer"));
        };
        sender
            .send(Message::FindNode(FindNode { request_id, target }))
            .await
            .map_err(|_| P2PError::AdmissionRejected("peer session closed"))?;
        self.discovery.wait_for(request_id).await
    }

    fn nearest_known_peers(&self, target: NodeId, limit: usize) -> Vec<PeerInfo> {
        let mut peers = self.known_peers.lock().clone();
        peers.sort_by_key(|p| xor_distance(p.node_id, target));
        peers.truncate(limit);
        peers
    }

    fn remember_peer(&self, node_id: NodeId, addr: SocketAddr) {
        let mut peers = self.known_peers.lock();
        if let Some(existing) = peers.iter_mut().find(|p| p.node_id == node_id) {
            existing.addr = addr.to_string();
            return;
        }
        if peers.len() >= MAX_KNOWN_PEERS {
            peers.remove(0);
        }
        peers.push(PeerInfo {
            node_id,
            addr: addr.to_string(),
        });
    }

    fn merge_discovered_peers(&self, discovered: Vec<PeerInfo>) {
        let mut peers = self.known_peers.lock();
        for candidate in discovered {
            if candidate.node_id == self.self_node_id {
                continue;
            }
            if peers.iter().any(|p| p.node_id == candidate.node_id) {
                continue;
            }
            if peers.len() >= MAX_KNOWN_PEERS {
                peers.remove(0);
            }
            peers.push(candidate);
        }
    }

    fn build_handshake(&self, nonce: u64) -> Handshake {
        let message = wire_handshake_message(self.config.chain_id, self.self_node_id, nonce);
        let signature = (self.sign)(&message);
        Handshake {
            node_id: self.self_node_id,
            chain_id: self.config.chain_id,
            height: self.chain.height(),
            nonce,
            signature,
        }
    }
}

fn xor_distance(a: NodeId, b: NodeId) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a.as_bytes()[i] ^ b.as_bytes()[i];
    }
    out
}

fn verify_bft_vote(vote: &BftVote) -> bool {
    let addr = coc_common::Address::from_slice(&vote.voter.as_bytes()[12..]);
    verify_node_sig(&block_message(vote.block_hash), &vote.signature, addr)
}

/// Starts the listener and the accept loop as a tracked task. Call
/// `node.tracker().close()` then `node.tracker().wait()` during shutdown to
/// drain in-flight connections.
pub fn spawn_server(node: Arc<P2pNode>) {
    let tracker = node.tracker.clone();
    tracker.spawn(serve_p2p_requests(node));
}

impl P2pNode {
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }
}

async fn serve_p2p_requests(node: Arc<P2pNode>) {
    let listener_addr = node.config.listen_addr;
    let listener = match bind_listener(listener_addr) {
        Ok(l) => l,
        Err(e) => {
            warn!(addr = %listener_addr, error = %e, "failed to bind p2p listener, stopping");
            return;
        }
    };
    info!(addr = %listener_addr, "p2p listener started");
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "p2p accept failed, stopping server");
                return;
            }
        };
        let node = node.clone();
        node.tracker
            .spawn(async move { handle_connection(stream, peer_addr, node).await });
    }
}

fn bind_listener(addr: SocketAddr) -> std::io::Result<tokio::net::TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.bind(addr)?;
    socket.listen(50)
}

/// Dials an outbound peer and runs the same session handling as an inbound
/// connection once the TCP stream is established.
pub async fn dial(node: Arc<P2pNode>, addr: SocketAddr) -> Result<(), P2PError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    let stream = socket.connect(addr).await?;
    node.tracker
        .spawn(async move { handle_connection(stream, addr, node).await });
    Ok(())
}

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, node: Arc<P2pNode>) {
    let ip = peer_addr.ip();
    let _slot = match node.peer_table.try_admit(ip) {
        Ok(slot) => slot,
        Err(e) => {
            debug!(%peer_addr, error = %e, "connection rejected by admission control");
            return;
        }
    };

    let mut framed = Framed::new(stream, FrameCodec);

    let nonce: u64 = rand::random();
    if framed.send(Message::Handshake(node.build_handshake(nonce))).await.is_err() {
        return;
    }

    let peer_handshake = match await_handshake(&mut framed).await {
        Ok(h) => h,
        Err(e) => {
            debug!(%peer_addr, error = %e, "handshake failed");
            return;
        }
    };

    if peer_handshake.chain_id != node.config.chain_id {
        warn!(%peer_addr, "chain id mismatch, closing connection");
        return;
    }

    let claimed_addr = coc_common::Address::from_slice(&peer_handshake.node_id.as_bytes()[12..]);
    let authenticated = verify_node_sig(
        &wire_handshake_message(peer_handshake.chain_id, peer_handshake.node_id, peer_handshake.nonce),
        &peer_handshake.signature,
        claimed_addr,
    );
    if !authenticated {
        match node.config.inbound_auth_mode {
            InboundAuthMode::Enforce => {
                warn!(%peer_addr, "unauthenticated handshake rejected (enforce mode)");
                return;
            }
            InboundAuthMode::Monitor => {
                warn!(%peer_addr, "unauthenticated handshake (monitor mode, continuing)");
            }
            InboundAuthMode::Off => {}
        }
    }

    if framed.send(Message::HandshakeAck(node.build_handshake(nonce))).await.is_err() {
        return;
    }

    node.remember_peer(peer_handshake.node_id, peer_addr);
    info!(%peer_addr, node_id = ?peer_handshake.node_id, "peer session established");

    let (sink, mut stream) = framed.split();
    let (out_tx, out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_CAPACITY);
    node.peer_senders.lock().insert(peer_handshake.node_id, out_tx.clone());

    let writer = tokio::spawn(run_writer(sink, out_rx));

    let mut relay_rx = node.relay_tx.subscribe();
    let relay_out_tx = out_tx.clone();
    let relay_task = tokio::spawn(async move {
        while let Ok(msg) = relay_rx.recv().await {
            if relay_out_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut seen_tx = BoundedSeenSet::new(SEEN_TX_CAPACITY);
    let mut seen_blocks = BoundedSeenSet::new(SEEN_BLOCKS_CAPACITY);

    while let Some(frame) = stream.next().await {
        let message = match frame {
            Ok(m) => m,
            Err(e) => {
                debug!(%peer_addr, error = %e, "frame decode error, closing connection");
                break;
            }
        };
        if !node.rate_limiter.allow(ip) {
            warn!(%peer_addr, "peer exceeded request rate, closing connection");
            break;
        }
        if let Err(e) = handle_message(&node, message, &mut seen_tx, &mut seen_blocks, &out_tx).await {
            debug!(%peer_addr, error = %e, "closing connection after message error");
            break;
        }
    }

    node.peer_senders.lock().remove(&peer_handshake.node_id);
    relay_task.abort();
    writer.abort();
    info!(%peer_addr, "peer session closed");
}

async fn await_handshake(framed: &mut Framed<TcpStream, FrameCodec>) -> Result<Handshake, P2PError> {
    match framed.next().await {
        Some(Ok(Message::Handshake(h))) => Ok(h),
        Some(Ok(_)) => Err(P2PError::AdmissionRejected("expected Handshake as the first frame")),
        Some(Err(e)) => Err(e),
        None => Err(P2PError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before handshake",
        ))),
    }
}

async fn run_writer(
    mut sink: futures::stream::SplitSink<Framed<TcpStream, FrameCodec>, Message>,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if sink.send(msg).await.is_err() {
            break;
        }
    }
}

async fn handle_message(
    node: &Arc<P2pNode>,
    message: Message,
    seen_tx: &mut BoundedSeenSet<H256>,
    seen_blocks: &mut BoundedSeenSet<H256>,
    out_tx: &mpsc::Sender<Message>,
) -> Result<(), P2PError> {
    match message {
        Message::Handshake(_) | Message::HandshakeAck(_) => {
            return Err(P2PError::AdmissionRejected("unexpected handshake after session established"));
        }
        Message::Block(block) => {
            if seen_blocks.insert(block.hash) {
                return Ok(());
            }
            match node.chain.apply_block(block, true).await {
                Ok(applied) => {
                    let _ = node.relay_tx.send(Message::Block((*applied).clone()));
                    let _ = node.gossip_out.send(GossipEvent::Block(applied));
                }
                Err(e) => warn!(error = %e, "rejected remote block"),
            }
        }
        Message::Tx(tx) => {
            if seen_tx.insert(tx.hash) {
                return Ok(());
            }
            let onchain_nonce = node.evm.get_nonce(tx.from);
            match node.mempool.add(tx.clone(), onchain_nonce) {
                Ok(()) => {
                    let _ = node.relay_tx.send(Message::Tx(tx.clone()));
                    let _ = node.gossip_out.send(GossipEvent::Tx(Arc::new(tx)));
                }
                Err(e) => warn!(error = %e, "rejected remote transaction"),
            }
        }
        Message::BlockReq(req) => {
            let block = node.index.get_block(req.height).await.unwrap_or(None);
            let _ = out_tx.send(Message::BlockResp(BlockResp { block })).await;
        }
        Message::BlockResp(resp) => {
            debug!(height = ?resp.block.as_ref().map(|b| b.number), "received block response");
        }
        Message::SnapshotReq(req) => {
            let mut blocks = Vec::new();
            let mut height = req.from_height;
            while height <= node.chain.height() && blocks.len() < node.config.max_discovered_per_batch {
                if let Ok(Some(block)) = node.index.get_block(height).await {
                    blocks.push(block);
                }
                height += 1;
            }
            let _ = out_tx.send(Message::Snapshot(Snapshot { blocks })).await;
        }
        Message::Snapshot(snapshot) => match node.chain.maybe_adopt_snapshot(snapshot.blocks).await {
            Ok(adopted) => info!(adopted, "processed inbound snapshot"),
            Err(e) => warn!(error = %e, "snapshot rejected"),
        },
        Message::BftPrepare(vote) => {
            if verify_bft_vote(&vote) {
                let _ = node.relay_tx.send(Message::BftPrepare(vote));
            } else {
                warn!("dropping BftPrepare with invalid vote signature");
            }
        }
        Message::BftCommit(vote) => {
            if verify_bft_vote(&vote) {
                let _ = node.relay_tx.send(Message::BftCommit(vote));
            } else {
                warn!("dropping BftCommit with invalid vote signature");
            }
        }
        Message::FindNode(req) => {
            let peers = node.nearest_known_peers(req.target, node.config.max_discovered_per_batch);
            let _ = out_tx
                .send(Message::FindNodeResp(FindNodeResp {
                    request_id: req.request_id,
                    peers,
                }))
                .await;
        }
        Message::FindNodeResp(resp) => {
            node.merge_discovered_peers(resp.peers.clone());
            node.discovery.resolve(resp.request_id, resp);
        }
        Message::Ping(ping) => {
            let _ = out_tx.send(Message::Pong(PingPong { nonce: ping.nonce })).await;
        }
        Message::Pong(_) => {}
    }
    Ok(())
}

/// `keccak256(pubkey)`-derived peer identity hashed against a raw bootstrap
/// address string, used only to seed `known_peers` for bootnodes configured
/// by address rather than discovered via `FindNode`.
pub fn bootstrap_peer_id(addr: &str) -> NodeId {
    keccak256(addr.as_bytes())
}
