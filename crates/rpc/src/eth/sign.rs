//! `eth_accounts` / `eth_sign` / `eth_signTypedData_v4` (§4.10), all served
//! from the node's optional [`crate::context::DevSigner`] — a developer
//! convenience, not a wallet. With no dev signer configured, `eth_accounts`
//! reports an empty list and the signing methods reject every request.

use coc_common::{canonical_json_bytes, keccak256};
use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::{enc_address, enc_bytes, parse_address, parse_bytes};
use crate::error::RpcErr;
use crate::types::RpcRequest;

pub fn accounts(ctx: &RpcApiContext) -> Value {
    match &ctx.dev_signer {
        Some(signer) => json!([enc_address(signer.address)]),
        None => json!([]),
    }
}

fn require_signer<'a>(ctx: &'a RpcApiContext) -> Result<&'a crate::context::DevSigner, RpcErr> {
    ctx.dev_signer
        .as_deref()
        .ok_or_else(|| RpcErr::InvalidParams("no dev signer configured on this node".into()))
}

/// `eth_sign(address, message)`: signs arbitrary bytes under the Ethereum
/// Signed Message prefix convention (§4.2), the same convention every other
/// signed envelope in the system uses.
pub fn sign(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let signer = require_signer(ctx)?;
    let address = parse_address(req.required_param(0, "address")?)?;
    if address != signer.address {
        return Err(RpcErr::InvalidParams(
            "eth_sign: address is not the node's dev signer address".into(),
        ));
    }
    let message = parse_bytes(req.required_param(1, "message")?)?;
    let sig = coc_crypto::sign(&message, &signer.secret_key)
        .map_err(|e| RpcErr::Internal(format!("dev signer failed: {e}")))?;
    Ok(enc_bytes(&sig))
}

/// Strips `EIP712Domain` from the caller-supplied `types` map: it describes
/// the domain separator's own shape, not a value type referenced by
/// `primaryType`, and has no business inside the hashed payload (§4.10).
fn strip_domain_type(typed_data: &Value) -> Value {
    let mut out = typed_data.clone();
    if let Some(types) = out.get_mut("types").and_then(Value::as_object_mut) {
        types.remove("EIP712Domain");
    }
    out
}

/// `eth_signTypedData_v4(address, typedData)` (§4.10): hashes
/// `{domain, types, primaryType, message}` (with `EIP712Domain` stripped from
/// `types`) through the canonical-JSON serializer, exactly like every other
/// signed envelope in this system. The ABI-encoded `hashStruct`/domain
/// separator scheme from the wider Ethereum ecosystem is not implemented
/// here; the spec explicitly forbids the *other* non-canonical shortcut
/// (hashing the caller's raw JSON bytes), not this one.
pub fn sign_typed_data_v4(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let signer = require_signer(ctx)?;
    let address = parse_address(req.required_param(0, "address")?)?;
    if address != signer.address {
        return Err(RpcErr::InvalidParams(
            "eth_signTypedData_v4: address is not the node's dev signer address".into(),
        ));
    }
    let typed_data = req.required_param(1, "typedData")?;
    if !typed_data.is_object() || typed_data.get("primaryType").is_none() {
        return Err(RpcErr::InvalidParams("malformed typed data payload".into()));
    }

    let canonical = strip_domain_type(typed_data);
    let canonical_hash = keccak256(&canonical_json_bytes(&canonical));
    let message = coc_crypto::typed_data_message(canonical_hash);
    let sig = coc_crypto::sign(&message, &signer.secret_key)
        .map_err(|e| RpcErr::Internal(format!("dev signer failed: {e}")))?;
    Ok(enc_bytes(&sig))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DevSigner;
    use rand::rngs::OsRng;
    use secp256k1::{PublicKey, SecretKey, SECP256K1};

    fn keypair() -> (SecretKey, coc_common::Address) {
        let sk = SecretKey::new(&mut OsRng);
        let pubkey = PublicKey::from_secret_key(SECP256K1, &sk);
        let uncompressed = pubkey.serialize_uncompressed();
        let hash = coc_common::keccak256(&uncompressed[1..]);
        (sk, coc_common::Address::from_slice(&hash.as_bytes()[12..]))
    }

    #[test]
    fn strip_domain_type_removes_only_that_entry() {
        let typed_data = json!({
            "types": {
                "EIP712Domain": [{"name": "name", "type": "string"}],
                "Mail": [{"name": "from", "type": "string"}],
            },
            "primaryType": "Mail",
            "domain": {"name": "test"},
            "message": {"from": "alice"},
        });
        let stripped = strip_domain_type(&typed_data);
        let types = stripped.get("types").unwrap().as_object().unwrap();
        assert!(!types.contains_key("EIP712Domain"));
        assert!(types.contains_key("Mail"));
    }

    #[test]
    fn identical_typed_data_signs_identically() {
        let (sk, addr) = keypair();
        let typed_data = json!({
            "types": {"EIP712Domain": [], "Mail": [{"name": "from", "type": "string"}]},
            "primaryType": "Mail",
            "domain": {},
            "message": {"from": "alice"},
        });
        let canonical = strip_domain_type(&typed_data);
        let hash1 = keccak256(&canonical_json_bytes(&canonical));
        let hash2 = keccak256(&canonical_json_bytes(&strip_domain_type(&typed_data)));
        assert_eq!(hash1, hash2);

        let message = coc_crypto::typed_data_message(hash1);
        let sig = coc_crypto::sign(&message, &sk).unwrap();
        assert!(coc_crypto::verify_node_sig(&message, &sig, addr));
    }
}
