//! Merkle primitives (C1): a sorted-pair commutative tree for PoSe batch
//! roots, and an order-sensitive index-commitment fold for sample proofs.

use coc_common::{keccak256_concat, H256};

/// Builds the sorted-pair Merkle root over `leaves`. Internal nodes hash
/// `keccak(min(L,R) || max(L,R))` so membership proofs are commutative —
/// the verifier doesn't need to know left/right position, only siblings.
/// An odd level duplicates its last leaf before pairing.
pub fn merkle_root(leaves: &[H256]) -> H256 {
    match leaves {
        [] => H256::zero(),
        [single] => *single,
        _ => {
            let mut level = leaves.to_vec();
            while level.len() > 1 {
                level = next_level(&level);
            }
            level[0]
        }
    }
}

/// Builds the sibling path from `leaves[index]` to the root.
pub fn merkle_proof(leaves: &[H256], index: usize) -> Vec<H256> {
    if leaves.len() <= 1 {
        return vec![];
    }
    let mut level = leaves.to_vec();
    let mut idx = index;
    let mut proof = Vec::new();

    while level.len() > 1 {
        let padded = pad_if_odd(&level);
        let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
        proof.push(padded[sibling_idx]);
        level = next_level(&level);
        idx /= 2;
    }
    proof
}

/// Verifies that folding `leaf` with each entry in `proof` (commutatively)
/// reproduces `root`.
pub fn verify_merkle_proof(proof: &[H256], root: H256, leaf: H256) -> bool {
    let mut current = leaf;
    for sibling in proof {
        current = sorted_pair_hash(current, *sibling);
    }
    current == root
}

fn sorted_pair_hash(a: H256, b: H256) -> H256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    keccak256_concat(&[lo.as_bytes(), hi.as_bytes()])
}

fn pad_if_odd(level: &[H256]) -> Vec<H256> {
    let mut padded = level.to_vec();
    if padded.len() % 2 == 1 {
        padded.push(*padded.last().unwrap());
    }
    padded
}

fn next_level(level: &[H256]) -> Vec<H256> {
    let padded = pad_if_odd(level);
    padded
        .chunks(2)
        .map(|pair| sorted_pair_hash(pair[0], pair[1]))
        .collect()
}

/// The sample-commitment fold: `c0 = 0; c_{i+1} = keccak(c_i || leafIndex:u32 || leaf)`.
/// Order-sensitive, not a tree — used to bind the set and order of sampled
/// leaves into `summaryHash` (§3 `SampleProof`).
pub fn sample_commitment_fold(samples: &[(u32, H256)]) -> H256 {
    let mut acc = H256::zero();
    for (leaf_index, leaf) in samples {
        acc = keccak256_concat(&[acc.as_bytes(), &leaf_index.to_be_bytes(), leaf.as_bytes()]);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> H256 {
        H256::from([n; 32])
    }

    #[test]
    fn single_leaf_root_is_the_leaf() {
        let l = leaf(1);
        assert_eq!(merkle_root(&[l]), l);
    }

    #[test]
    fn proof_verifies_for_every_leaf() {
        let leaves: Vec<H256> = (1..=5u8).map(leaf).collect();
        let root = merkle_root(&leaves);
        for (i, l) in leaves.iter().enumerate() {
            let proof = merkle_proof(&leaves, i);
            assert!(verify_merkle_proof(&proof, root, *l), "leaf {i} failed");
        }
    }

    #[test]
    fn tampered_leaf_fails_verification() {
        let leaves: Vec<H256> = (1..=4u8).map(leaf).collect();
        let root = merkle_root(&leaves);
        let proof = merkle_proof(&leaves, 0);
        assert!(!verify_merkle_proof(&proof, root, leaf(99)));
    }

    #[test]
    fn sample_fold_is_order_sensitive() {
        let a = sample_commitment_fold(&[(0, leaf(1)), (1, leaf(2))]);
        let b = sample_commitment_fold(&[(1, leaf(2)), (0, leaf(1))]);
        assert_ne!(a, b);
    }
}
