//! Challenge issuance with a per-`(nodeId, epoch)` quota (§4.11).

use std::collections::HashMap;

use coc_common::{keccak256_concat, ChallengeMessage, EpochId, NodeId};
use coc_crypto::{sign, Signature65};
use parking_lot::RwLock;
use secp256k1::SecretKey;

use crate::error::PoseError;

/// Canonical message a challenger signs: `"pose:challenge:0x"||hex(challengeId)`.
pub fn challenge_message(challenge_id: coc_common::H256) -> Vec<u8> {
    format!("pose:challenge:0x{}", hex::encode(challenge_id.as_bytes())).into_bytes()
}

pub struct ChallengeIssuer {
    max_per_epoch: u32,
    /// `(nodeId, epoch) -> issued count`, reset implicitly as epochs roll by
    /// never being looked up again (old entries are pruned lazily below).
    quotas: RwLock<HashMap<(NodeId, EpochId), u32>>,
    /// `challengeId -> (nodeId, epoch, issuedAtMs)`, looked up by the receipt
    /// verifier when the caller doesn't resubmit the full challenge object.
    issued: RwLock<HashMap<coc_common::H256, ChallengeMessage>>,
}

impl ChallengeIssuer {
    pub fn new(max_per_epoch: u32) -> Self {
        Self {
            max_per_epoch,
            quotas: RwLock::new(HashMap::new()),
            issued: RwLock::new(HashMap::new()),
        }
    }

    pub fn lookup(&self, challenge_id: coc_common::H256) -> Option<ChallengeMessage> {
        self.issued.read().get(&challenge_id).cloned()
    }

    /// `issueChallenge(nodeId) -> Challenge | null`. Returns `None` once the
    /// per-epoch quota for `nodeId` is exhausted; callers surface that as
    /// HTTP 429.
    pub fn issue(
        &self,
        node_id: NodeId,
        epoch_id: EpochId,
        issued_at_ms: u64,
        nonce: u64,
        challenger_pubkey: &[u8],
        challenger_secret: &SecretKey,
    ) -> Result<ChallengeMessage, PoseError> {
        {
            let mut quotas = self.quotas.write();
            let count = quotas.entry((node_id, epoch_id)).or_insert(0);
            *count += 1;
            if *count > self.max_per_epoch {
                return Err(PoseError::QuotaExceeded);
            }
        }

        let challenge_id = keccak256_concat(&[
            challenger_pubkey,
            node_id.as_bytes(),
            &epoch_id.to_be_bytes(),
            &nonce.to_be_bytes(),
        ]);
        let sig: Signature65 = sign(&challenge_message(challenge_id), challenger_secret)
            .map_err(|_| PoseError::InvalidNodeSig)?;

        let challenge = ChallengeMessage {
            challenge_id,
            node_id,
            epoch_id,
            issued_at_ms,
            challenger_sig: sig.to_vec(),
        };
        self.issued.write().insert(challenge_id, challenge.clone());
        Ok(challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use secp256k1::{PublicKey, SECP256K1};

    fn keypair() -> (SecretKey, Vec<u8>) {
        let sk = SecretKey::new(&mut OsRng);
        let pk = PublicKey::from_secret_key(SECP256K1, &sk);
        (sk, pk.serialize().to_vec())
    }

    #[test]
    fn issues_up_to_the_quota_then_rejects() {
        let issuer = ChallengeIssuer::new(2);
        let (sk, pubkey) = keypair();
        let node_id = coc_common::H256::from_low_u64_be(1);

        issuer.issue(node_id, 0, 1000, 1, &pubkey, &sk).unwrap();
        issuer.issue(node_id, 0, 1001, 2, &pubkey, &sk).unwrap();
        assert!(matches!(
            issuer.issue(node_id, 0, 1002, 3, &pubkey, &sk),
            Err(PoseError::QuotaExceeded)
        ));
    }

    #[test]
    fn quota_is_independent_per_epoch() {
        let issuer = ChallengeIssuer::new(1);
        let (sk, pubkey) = keypair();
        let node_id = coc_common::H256::from_low_u64_be(1);

        issuer.issue(node_id, 0, 1000, 1, &pubkey, &sk).unwrap();
        assert!(issuer.issue(node_id, 1, 1001, 2, &pubkey, &sk).is_ok());
    }
}
