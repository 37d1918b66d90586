//! PoSe HTTP/JSON envelope authentication (`pose-http`, §4.11).
//!
//! Each POST body optionally carries an `_auth: {senderId, timestampMs,
//! nonce, signature}` envelope. The server strips `_auth`, reconstructs the
//! `pose:http:…` message over the remaining payload, and recovers
//! `senderId`. Monitor mode logs violations but forwards the request;
//! enforce mode rejects.

use async_trait::async_trait;
use coc_common::Address;
use coc_crypto::{pose_http_message, recover_address};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use crate::error::PoseError;

pub const MAX_CLOCK_SKEW_MS: u64 = 120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Off,
    Monitor,
    Enforce,
}

/// Authorizes a sender beyond the static allowlist, e.g. against a remote
/// registry lookup.
#[async_trait]
pub trait ChallengerAuthorizer: Send + Sync {
    async fn is_authorized(&self, sender_id: Address) -> bool;
}

pub struct StaticAllowlist(pub HashSet<Address>);

#[async_trait]
impl ChallengerAuthorizer for StaticAllowlist {
    async fn is_authorized(&self, sender_id: Address) -> bool {
        self.0.contains(&sender_id)
    }
}

pub struct PoseHttpAuthenticator {
    mode: AuthMode,
    authorizer: Box<dyn ChallengerAuthorizer>,
    nonces: RwLock<HashSet<(Address, u64)>>,
}

impl PoseHttpAuthenticator {
    pub fn new(mode: AuthMode, authorizer: Box<dyn ChallengerAuthorizer>) -> Self {
        Self {
            mode,
            authorizer,
            nonces: RwLock::new(HashSet::new()),
        }
    }

    /// Verifies the envelope and returns the authenticated sender. In
    /// `Monitor` mode, verification failures are logged and `None` is
    /// returned instead of an error so the caller still forwards the request.
    pub async fn authenticate(
        &self,
        path: &str,
        body: &mut Value,
        now_ms: u64,
    ) -> Result<Option<Address>, PoseError> {
        if self.mode == AuthMode::Off {
            return Ok(None);
        }

        match self.verify(path, body, now_ms).await {
            Ok(sender) => Ok(Some(sender)),
            Err(e) if self.mode == AuthMode::Monitor => {
                warn!(error = %e, path, "pose-http auth violation (monitor mode)");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn verify(&self, path: &str, body: &mut Value, now_ms: u64) -> Result<Address, PoseError> {
        let auth = body
            .as_object_mut()
            .and_then(|obj| obj.remove("_auth"))
            .ok_or(PoseError::MissingAuthEnvelope)?;

        let sender_id: Address = auth
            .get("senderId")
            .and_then(Value::as_str)
            .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
            .filter(|bytes| bytes.len() == 20)
            .map(|bytes| Address::from_slice(&bytes))
            .ok_or(PoseError::InvalidAuthSig)?;
        let timestamp_ms = auth
            .get("timestampMs")
            .and_then(Value::as_u64)
            .ok_or(PoseError::InvalidAuthSig)?;
        let nonce = auth
            .get("nonce")
            .and_then(Value::as_u64)
            .ok_or(PoseError::InvalidAuthSig)?;
        let signature_hex = auth
            .get("signature")
            .and_then(Value::as_str)
            .ok_or(PoseError::InvalidAuthSig)?;
        let sig_bytes = hex::decode(signature_hex.trim_start_matches("0x"))
            .map_err(|_| PoseError::InvalidAuthSig)?;
        let sig: [u8; 65] = sig_bytes.as_slice().try_into().map_err(|_| PoseError::InvalidAuthSig)?;

        if now_ms.abs_diff(timestamp_ms) > MAX_CLOCK_SKEW_MS {
            return Err(PoseError::ClockSkewExceeded);
        }

        if !self.nonces.write().insert((sender_id, nonce)) {
            return Err(PoseError::NonceReplayed);
        }

        let message = pose_http_message(path, &format!("0x{}", hex::encode(sender_id.as_bytes())), timestamp_ms, nonce, body);
        let recovered = recover_address(&message, &sig).map_err(|_| PoseError::InvalidAuthSig)?;
        if recovered != sender_id {
            return Err(PoseError::InvalidAuthSig);
        }

        if !self.authorizer.is_authorized(sender_id).await {
            return Err(PoseError::UnauthorizedSender);
        }

        Ok(sender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coc_crypto::sign;
    use rand::rngs::OsRng;
    use secp256k1::{PublicKey, SecretKey, SECP256K1};
    use serde_json::json;

    fn keypair() -> (SecretKey, Address) {
        let sk = SecretKey::new(&mut OsRng);
        let pk = PublicKey::from_secret_key(SECP256K1, &sk);
        let uncompressed = pk.serialize_uncompressed();
        let hash = coc_common::keccak256(&uncompressed[1..]);
        (sk, Address::from_slice(&hash.as_bytes()[12..]))
    }

    #[tokio::test]
    async fn accepts_a_correctly_signed_envelope() {
        let (sk, addr) = keypair();
        let authenticator = PoseHttpAuthenticator::new(
            AuthMode::Enforce,
            Box::new(StaticAllowlist(std::iter::once(addr).collect())),
        );

        let mut payload = json!({"nodeId": "0x01"});
        let message = pose_http_message("/pose/challenge", &format!("0x{}", hex::encode(addr.as_bytes())), 1_000, 1, &payload);
        let sig = sign(&message, &sk).unwrap();
        payload.as_object_mut().unwrap().insert(
            "_auth".into(),
            json!({
                "senderId": format!("0x{}", hex::encode(addr.as_bytes())),
                "timestampMs": 1_000,
                "nonce": 1,
                "signature": format!("0x{}", hex::encode(sig)),
            }),
        );

        let result = authenticator.authenticate("/pose/challenge", &mut payload, 1_050).await.unwrap();
        assert_eq!(result, Some(addr));
    }

    #[tokio::test]
    async fn rejects_replayed_nonce() {
        let (sk, addr) = keypair();
        let authenticator = PoseHttpAuthenticator::new(
            AuthMode::Enforce,
            Box::new(StaticAllowlist(std::iter::once(addr).collect())),
        );

        let build = || {
            let mut payload = json!({"nodeId": "0x01"});
            let message = pose_http_message("/pose/challenge", &format!("0x{}", hex::encode(addr.as_bytes())), 1_000, 7, &payload);
            let sig = sign(&message, &sk).unwrap();
            payload.as_object_mut().unwrap().insert(
                "_auth".into(),
                json!({
                    "senderId": format!("0x{}", hex::encode(addr.as_bytes())),
                    "timestampMs": 1_000,
                    "nonce": 7,
                    "signature": format!("0x{}", hex::encode(sig)),
                }),
            );
            payload
        };

        let mut first = build();
        authenticator.authenticate("/pose/challenge", &mut first, 1_050).await.unwrap();
        let mut second = build();
        assert!(matches!(
            authenticator.authenticate("/pose/challenge", &mut second, 1_050).await,
            Err(PoseError::NonceReplayed)
        ));
    }
}
