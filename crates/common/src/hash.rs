//! Thin keccak256 helper shared by every crate in the workspace. Lives in
//! `coc-common` (rather than `coc-crypto`) so that `Block::compute_hash` has
//! no dependency on the signer crate.

use crate::H256;

pub fn keccak256(data: &[u8]) -> H256 {
    H256::from(keccak_hash::keccak(data).0)
}

pub fn keccak256_concat(parts: &[&[u8]]) -> H256 {
    let mut buf = Vec::new();
    for part in parts {
        buf.extend_from_slice(part);
    }
    keccak256(&buf)
}
