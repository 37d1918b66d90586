//! `coc_*`: node-native methods with no Ethereum-standard equivalent,
//! namespaced the way the teacher's non-standard extensions are. This
//! includes node/chain introspection (`coc_nodeInfo`, `coc_validators`,
//! `coc_prunerStats`, `coc_getTransactionsByAddress`) and the settlement
//! contract's essential ABI (§6, §4.13): the settlement state machine is a
//! native Rust module rather than EVM bytecode (see DESIGN.md), so its
//! `registerNode`/`submitBatch`/`finalizeEpoch`/`slash`/… surface is reached
//! over this JSON-RPC namespace instead of `eth_sendRawTransaction` calldata.

use serde_json::{json, Value};

use coc_common::SlashEvidence;
use coc_crypto::{node_ownership_message, recover_address, verify_node_sig};

use crate::context::RpcApiContext;
use crate::encoding::{
    batch_record_to_json, enc_h256, enc_u256, enc_u64, node_record_to_json, parse_address, parse_bytes,
    parse_h256, parse_sample_proof, parse_u256, parse_u32, parse_u64,
};
use crate::error::RpcErr;
use crate::types::RpcRequest;

fn parse_signature65(v: &Value) -> Result<[u8; 65], RpcErr> {
    let bytes = parse_bytes(v)?;
    if bytes.len() != 65 {
        return Err(RpcErr::InvalidParams("signature must be 65 bytes".into()));
    }
    let mut out = [0u8; 65];
    out.copy_from_slice(&bytes);
    Ok(out)
}

pub async fn map_coc_requests(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    match req.method.as_str() {
        "coc_nodeInfo" => Ok(json!({
            "nodeId": format!("0x{}", hex::encode(ctx.chain.self_node_id().as_bytes())),
            "chainId": enc_u64(ctx.chain_id),
            "height": enc_u64(ctx.chain.height()),
            "finalizedHeight": enc_u64(ctx.chain.finalized_height()),
            "peers": enc_u64(ctx.p2p.as_ref().map(|p| p.connected_peer_count() as u64).unwrap_or(0)),
            "mempoolPending": enc_u64(ctx.mempool.stats().pending_count as u64),
        })),
        "coc_getTransactionsByAddress" => {
            let address = parse_address(req.required_param(0, "address")?)?;
            let reverse = req.param(1).and_then(Value::as_bool).unwrap_or(true);
            let limit = req
                .param(2)
                .map(parse_u64)
                .transpose()?
                .unwrap_or(100)
                .min(1_000) as usize;
            let hashes = ctx.index.get_address_history(address, reverse, limit).await?;
            Ok(json!(hashes.into_iter().map(enc_h256).collect::<Vec<_>>()))
        }
        "coc_validators" => Ok(json!(ctx
            .chain
            .validators()
            .iter()
            .map(|v| enc_h256(*v))
            .collect::<Vec<_>>())),
        "coc_prunerStats" => Ok(json!({
            "replayRegistrySize": enc_u64(ctx.replay_registry.len() as u64),
            "replayRegistryOverCapacity": ctx.replay_registry.is_over_capacity(),
        })),

        // ---- settlement contract ABI (§6, §4.13) ----
        "coc_requiredBond" => {
            let operator = parse_address(req.required_param(0, "operator")?)?;
            Ok(enc_u256(ctx.settlement.required_bond(operator)))
        }
        "coc_getNode" => {
            let node_id = parse_h256(req.required_param(0, "nodeId")?)?;
            Ok(ctx.settlement.get_node(node_id).map(|n| node_record_to_json(&n)).unwrap_or(Value::Null))
        }
        "coc_getBatch" => {
            let batch_id = parse_h256(req.required_param(0, "batchId")?)?;
            Ok(ctx.settlement.get_batch(batch_id).map(|b| batch_record_to_json(&b)).unwrap_or(Value::Null))
        }
        "coc_getEpochBatchIds" => {
            let epoch_id = parse_u64(req.required_param(0, "epochId")?)?;
            Ok(json!(ctx.settlement.get_epoch_batch_ids(epoch_id).into_iter().map(enc_h256).collect::<Vec<_>>()))
        }
        "coc_getBatchSampleInfo" => {
            let batch_id = parse_h256(req.required_param(0, "batchId")?)?;
            Ok(ctx
                .settlement
                .get_batch_sample_info(batch_id)
                .map(|proofs| json!(proofs.iter().map(crate::encoding::sample_proof_to_json).collect::<Vec<_>>()))
                .unwrap_or(Value::Null))
        }
        "coc_isSampleLeaf" => {
            let batch_id = parse_h256(req.required_param(0, "batchId")?)?;
            let leaf_index = parse_u32(req.required_param(1, "leafIndex")?)?;
            Ok(json!(ctx.settlement.is_sample_leaf(batch_id, leaf_index)))
        }
        "coc_registerNode" => {
            let operator = parse_address(req.required_param(0, "operator")?)?;
            let pubkey = parse_bytes(req.required_param(1, "pubkey")?)?;
            let service_flags = parse_u32(req.required_param(2, "serviceFlags")?)? as u8;
            let service_commitment = parse_h256(req.required_param(3, "serviceCommitment")?)?;
            let endpoint_commitment = parse_h256(req.required_param(4, "endpointCommitment")?)?;
            let metadata_hash = parse_h256(req.required_param(5, "metadataHash")?)?;
            let bond_sent = parse_u256(req.required_param(6, "bondValueWei")?)?;
            let signature = parse_signature65(req.required_param(7, "ownershipSignature")?)?;

            let ownership_msg = node_ownership_message(operator, &pubkey);
            let ownership_valid = verify_node_sig(&ownership_msg, &signature, operator);

            let current_epoch = ctx.current_epoch();
            let node_id = ctx.settlement.register_node(
                operator,
                pubkey,
                service_flags,
                service_commitment,
                endpoint_commitment,
                metadata_hash,
                bond_sent,
                current_epoch,
                ownership_valid,
            )?;
            Ok(enc_h256(node_id))
        }
        "coc_updateCommitment" => {
            let node_id = parse_h256(req.required_param(0, "nodeId")?)?;
            let caller = parse_address(req.required_param(1, "caller")?)?;
            let service_commitment = parse_h256(req.required_param(2, "serviceCommitment")?)?;
            ctx.settlement.update_commitment(node_id, caller, service_commitment)?;
            Ok(json!(true))
        }
        "coc_requestUnbond" => {
            let node_id = parse_h256(req.required_param(0, "nodeId")?)?;
            let caller = parse_address(req.required_param(1, "caller")?)?;
            let current_epoch = ctx.current_epoch();
            ctx.settlement.request_unbond(node_id, caller, current_epoch)?;
            Ok(json!(true))
        }
        "coc_withdraw" => {
            let node_id = parse_h256(req.required_param(0, "nodeId")?)?;
            let caller = parse_address(req.required_param(1, "caller")?)?;
            let current_epoch = ctx.current_epoch();
            let amount = ctx.settlement.withdraw(node_id, caller, current_epoch)?;
            Ok(enc_u256(amount))
        }
        "coc_submitBatch" => {
            let epoch_id = parse_u64(req.required_param(0, "epochId")?)?;
            let merkle_root = parse_h256(req.required_param(1, "merkleRoot")?)?;
            let summary_hash = parse_h256(req.required_param(2, "summaryHash")?)?;
            let sample_proofs = req
                .required_param(3, "sampleProofs")?
                .as_array()
                .ok_or_else(|| RpcErr::InvalidParams("sampleProofs must be an array".into()))?
                .iter()
                .map(parse_sample_proof)
                .collect::<Result<Vec<_>, _>>()?;
            let aggregator = parse_h256(req.required_param(4, "aggregator")?)?;
            let current_epoch = ctx.current_epoch();
            let batch_id = ctx
                .settlement
                .submit_batch(epoch_id, merkle_root, summary_hash, sample_proofs, aggregator, current_epoch)?;
            Ok(enc_h256(batch_id))
        }
        "coc_challengeBatch" => {
            let caller = parse_address(req.required_param(0, "caller")?)?;
            let batch_id = parse_h256(req.required_param(1, "batchId")?)?;
            let receipt_leaf = parse_h256(req.required_param(2, "receiptLeaf")?)?;
            let merkle_proof = req
                .required_param(3, "merkleProof")?
                .as_array()
                .ok_or_else(|| RpcErr::InvalidParams("merkleProof must be an array".into()))?
                .iter()
                .map(parse_h256)
                .collect::<Result<Vec<_>, _>>()?;
            let current_epoch = ctx.current_epoch();
            ctx.settlement.challenge_batch(caller, batch_id, receipt_leaf, merkle_proof, current_epoch)?;
            Ok(json!(true))
        }
        "coc_finalizeEpoch" => {
            let epoch_id = parse_u64(req.required_param(0, "epochId")?)?;
            let current_epoch = ctx.current_epoch();
            let valid_batch_count = ctx.settlement.finalize_epoch(epoch_id, current_epoch)?;
            Ok(json!({
                "validBatchCount": enc_u64(valid_batch_count as u64),
                "epochSettlementRoot": enc_h256(ctx.settlement.epoch_settlement_root(epoch_id)),
            }))
        }
        "coc_slash" => {
            let caller = parse_address(req.required_param(0, "caller")?)?;
            let node_id = parse_h256(req.required_param(1, "nodeId")?)?;
            let reason_code = parse_u32(req.required_param(2, "reasonCode")?)? as u8;
            let raw_evidence = parse_bytes(req.required_param(3, "rawEvidence")?)?;
            let evidence_hash = coc_common::keccak256(&raw_evidence);
            let evidence = SlashEvidence { node_id, evidence_hash, reason_code, raw_evidence };
            let slashed = ctx.settlement.slash(caller, evidence)?;
            Ok(enc_u256(slashed))
        }
        "coc_setSlasher" => {
            if !ctx.enable_admin_rpc {
                return Err(RpcErr::MethodNotFound(req.method.clone()));
            }
            let slasher = parse_address(req.required_param(0, "slasher")?)?;
            let enabled = req.param(1).and_then(Value::as_bool).unwrap_or(true);
            ctx.settlement.set_slasher(slasher, enabled);
            Ok(json!(true))
        }
        "coc_recoverAddress" => {
            // Operational helper mirroring §4.2 `recoverAddress`, useful for
            // constructing `ownershipSignature` offline before `coc_registerNode`.
            let message = parse_bytes(req.required_param(0, "message")?)?;
            let signature = parse_signature65(req.required_param(1, "signature")?)?;
            let address = recover_address(&message, &signature).map_err(|e| RpcErr::InvalidParams(e.to_string()))?;
            Ok(crate::encoding::enc_address(address))
        }
        other => Err(RpcErr::MethodNotFound(other.to_string())),
    }
}
