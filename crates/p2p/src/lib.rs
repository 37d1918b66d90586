//! Wire/P2P fabric (C9, §4.9): a framed TCP protocol with handshake
//! authentication, admission control, gossip dedup, discovery, and relay
//! into the rest of the node. Grounded on the teacher's `networking/p2p`
//! crate for the accept-loop and codec *shapes* — the actual wire format
//! here is plain magic-prefixed JSON, not RLPx.

pub mod codec;
pub mod discovery;
pub mod error;
pub mod message;
pub mod peers;
pub mod seen;
pub mod server;

pub use codec::{FrameCodec, MAGIC, MAX_BUFFER, MAX_PAYLOAD};
pub use error::P2PError;
pub use message::Message;
pub use server::{bootstrap_peer_id, dial, spawn_server, GossipEvent, InboundAuthMode, P2pConfig, P2pNode};
