//! Hash & Merkle primitives (C1) and the signer/verifier (C2).

pub mod error;
pub mod merkle;
pub mod signer;

pub use error::CryptoError;
pub use merkle::{merkle_proof, merkle_root, sample_commitment_fold, verify_merkle_proof};
pub use signer::{
    address_from_secret_key, block_message, node_id_from_secret_key, node_ownership_message, pose_http_message,
    raw_pubkey_for_secret_key, recover_address, sign, tx_message, typed_data_message, verify_node_sig,
    wire_handshake_message, Signature65,
};
