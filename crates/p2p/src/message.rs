//! Frame payload types for the wire protocol (§4.9). Every variant is plain
//! JSON; numeric fields that can exceed 2^53-1 are carried as decimal
//! strings (`wire_u64`) per the BigInt wire-encoding rule in §9, matching
//! the same convention `coc_common::canonical_json_bytes` uses elsewhere.

use serde::{Deserialize, Serialize};

use coc_common::{Block, NodeId, RawTransaction, H256};
use coc_crypto::Signature65;

use crate::error::P2PError;

/// Serializes a `u64` as a decimal string instead of a JSON number, since
/// JSON numbers above 2^53-1 are not safely round-trippable in most parsers.
pub mod wire_u64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

mod sig_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    use coc_crypto::Signature65;

    pub fn serialize<S: Serializer>(sig: &Signature65, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(sig)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Signature65, D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("signature must be exactly 65 bytes"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub node_id: NodeId,
    #[serde(with = "wire_u64")]
    pub chain_id: u64,
    #[serde(with = "wire_u64")]
    pub height: u64,
    #[serde(with = "wire_u64")]
    pub nonce: u64,
    #[serde(with = "sig_hex")]
    pub signature: Signature65,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockReq {
    #[serde(with = "wire_u64")]
    pub height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResp {
    pub block: Option<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotReq {
    #[serde(with = "wire_u64")]
    pub from_height: u64,
}

/// A proposer's vote over a candidate block hash, carried by the
/// `BftPrepare`/`BftCommit` frame types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BftVote {
    pub block_hash: H256,
    #[serde(with = "wire_u64")]
    pub height: u64,
    pub voter: NodeId,
    #[serde(with = "sig_hex")]
    pub signature: Signature65,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub node_id: NodeId,
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindNode {
    #[serde(with = "wire_u64")]
    pub request_id: u64,
    pub target: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindNodeResp {
    #[serde(with = "wire_u64")]
    pub request_id: u64,
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingPong {
    #[serde(with = "wire_u64")]
    pub nonce: u64,
}

#[derive(Debug, Clone)]
pub enum Message {
    Handshake(Handshake),
    HandshakeAck(Handshake),
    Block(Block),
    Tx(RawTransaction),
    BlockReq(BlockReq),
    BlockResp(BlockResp),
    Snapshot(Snapshot),
    SnapshotReq(SnapshotReq),
    BftPrepare(BftVote),
    BftCommit(BftVote),
    FindNode(FindNode),
    FindNodeResp(FindNodeResp),
    Ping(PingPong),
    Pong(PingPong),
}

impl Message {
    pub fn type_byte(&self) -> u8 {
        match self {
            Message::Handshake(_) => 0x01,
            Message::HandshakeAck(_) => 0x02,
            Message::Block(_) => 0x10,
            Message::Tx(_) => 0x11,
            Message::BlockReq(_) => 0x12,
            Message::BlockResp(_) => 0x13,
            Message::Snapshot(_) => 0x20,
            Message::SnapshotReq(_) => 0x21,
            Message::BftPrepare(_) => 0x30,
            Message::BftCommit(_) => 0x31,
            Message::FindNode(_) => 0x40,
            Message::FindNodeResp(_) => 0x41,
            Message::Ping(_) => 0xF0,
            Message::Pong(_) => 0xF1,
        }
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>, P2PError> {
        Ok(match self {
            Message::Handshake(m) => serde_json::to_vec(m)?,
            Message::HandshakeAck(m) => serde_json::to_vec(m)?,
            Message::Block(m) => serde_json::to_vec(m)?,
            Message::Tx(m) => serde_json::to_vec(m)?,
            Message::BlockReq(m) => serde_json::to_vec(m)?,
            Message::BlockResp(m) => serde_json::to_vec(m)?,
            Message::Snapshot(m) => serde_json::to_vec(m)?,
            Message::SnapshotReq(m) => serde_json::to_vec(m)?,
            Message::BftPrepare(m) => serde_json::to_vec(m)?,
            Message::BftCommit(m) => serde_json::to_vec(m)?,
            Message::FindNode(m) => serde_json::to_vec(m)?,
            Message::FindNodeResp(m) => serde_json::to_vec(m)?,
            Message::Ping(m) => serde_json::to_vec(m)?,
            Message::Pong(m) => serde_json::to_vec(m)?,
        })
    }

    pub fn decode(type_byte: u8, payload: &[u8]) -> Result<Message, P2PError> {
        Ok(match type_byte {
            0x01 => Message::Handshake(serde_json::from_slice(payload)?),
            0x02 => Message::HandshakeAck(serde_json::from_slice(payload)?),
            0x10 => Message::Block(serde_json::from_slice(payload)?),
            0x11 => Message::Tx(serde_json::from_slice(payload)?),
            0x12 => Message::BlockReq(serde_json::from_slice(payload)?),
            0x13 => Message::BlockResp(serde_json::from_slice(payload)?),
            0x20 => Message::Snapshot(serde_json::from_slice(payload)?),
            0x21 => Message::SnapshotReq(serde_json::from_slice(payload)?),
            0x30 => Message::BftPrepare(serde_json::from_slice(payload)?),
            0x31 => Message::BftCommit(serde_json::from_slice(payload)?),
            0x40 => Message::FindNode(serde_json::from_slice(payload)?),
            0x41 => Message::FindNodeResp(serde_json::from_slice(payload)?),
            0xF0 => Message::Ping(serde_json::from_slice(payload)?),
            0xF1 => Message::Pong(serde_json::from_slice(payload)?),
            other => return Err(P2PError::UnknownMessageType(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trips_through_json() {
        let h = Handshake {
            node_id: NodeId::zero(),
            chain_id: 1,
            height: 9_007_199_254_740_993, // > 2^53-1
            nonce: 42,
            signature: [7u8; 65],
        };
        let msg = Message::Handshake(h);
        let payload = msg.encode_payload().unwrap();
        let decoded = Message::decode(0x01, &payload).unwrap();
        match decoded {
            Message::Handshake(h2) => {
                assert_eq!(h2.height, 9_007_199_254_740_993);
                assert_eq!(h2.signature, [7u8; 65]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn height_is_encoded_as_a_string_not_a_number() {
        let h = Handshake {
            node_id: NodeId::zero(),
            chain_id: 1,
            height: 5,
            nonce: 1,
            signature: [0u8; 65],
        };
        let payload = Message::Handshake(h).encode_payload().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert!(value["height"].is_string());
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        assert!(matches!(
            Message::decode(0x99, b"{}"),
            Err(P2PError::UnknownMessageType(0x99))
        ));
    }
}
