//! Node lifecycle: register → active → requestUnbond → withdraw (§4.13).

use std::collections::{HashMap, HashSet};

use coc_common::{Address, EpochId, NodeRecord, H256, MAX_NODES_PER_OPERATOR, MIN_BOND_WEI, U256};

use crate::error::SettlementError;

pub const UNBOND_DELAY_EPOCHS: u64 = 7 * 24;

#[derive(Default)]
pub struct NodeRegistry {
    nodes: HashMap<H256, NodeRecord>,
    operator_node_count: HashMap<Address, u32>,
    endpoint_commitments: HashSet<H256>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `requiredBond(operator) = MIN_BOND * 2^operatorNodeCount[operator]`.
    pub fn required_bond(&self, operator: Address) -> U256 {
        let count = *self.operator_node_count.get(&operator).unwrap_or(&0);
        U256::from(MIN_BOND_WEI) * U256::from(2u64).pow(U256::from(count))
    }

    pub fn get(&self, node_id: H256) -> Option<&NodeRecord> {
        self.nodes.get(&node_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &mut self,
        operator: Address,
        pubkey: Vec<u8>,
        service_flags: u8,
        service_commitment: H256,
        endpoint_commitment: H256,
        metadata_hash: H256,
        bond_sent: U256,
        current_epoch: EpochId,
        ownership_proof_valid: bool,
    ) -> Result<H256, SettlementError> {
        if !ownership_proof_valid {
            return Err(SettlementError::InvalidOwnershipProof);
        }
        let node_id = NodeRecord::compute_node_id(&pubkey);
        if node_id.is_zero() {
            return Err(SettlementError::InvalidNodeId);
        }
        if self.nodes.contains_key(&node_id) {
            return Err(SettlementError::NodeAlreadyRegistered);
        }

        let count = *self.operator_node_count.get(&operator).unwrap_or(&0);
        if count >= MAX_NODES_PER_OPERATOR {
            return Err(SettlementError::TooManyNodes);
        }
        let required = self.required_bond(operator);
        if bond_sent < required {
            return Err(SettlementError::InsufficientBond);
        }
        if self.endpoint_commitments.contains(&endpoint_commitment) {
            return Err(SettlementError::EndpointAlreadyRegistered);
        }

        let record = NodeRecord {
            node_id,
            operator,
            pubkey,
            service_flags,
            service_commitment,
            endpoint_commitment,
            bond_amount: bond_sent,
            metadata_hash,
            registered_at_epoch: current_epoch,
            unlock_epoch: 0,
            active: true,
            unbond_requested: false,
        };
        self.nodes.insert(node_id, record);
        self.endpoint_commitments.insert(endpoint_commitment);
        self.operator_node_count.insert(operator, count + 1);
        Ok(node_id)
    }

    pub fn update_commitment(
        &mut self,
        node_id: H256,
        caller: Address,
        service_commitment: H256,
    ) -> Result<(), SettlementError> {
        let node = self.nodes.get_mut(&node_id).ok_or(SettlementError::NodeNotFound)?;
        if node.operator != caller {
            return Err(SettlementError::NotNodeOperator);
        }
        node.service_commitment = service_commitment;
        Ok(())
    }

    pub fn request_unbond(
        &mut self,
        node_id: H256,
        caller: Address,
        current_epoch: EpochId,
    ) -> Result<(), SettlementError> {
        let node = self.nodes.get_mut(&node_id).ok_or(SettlementError::NodeNotFound)?;
        if node.operator != caller {
            return Err(SettlementError::NotNodeOperator);
        }
        if node.unbond_requested {
            return Err(SettlementError::AlreadyUnbonding);
        }
        node.active = false;
        node.unbond_requested = true;
        node.unlock_epoch = current_epoch + UNBOND_DELAY_EPOCHS;
        self.endpoint_commitments.remove(&node.endpoint_commitment);
        if let Some(count) = self.operator_node_count.get_mut(&node.operator) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    /// Returns the withdrawable amount; the caller performs the external
    /// transfer and must zero the bond only after the transfer succeeds is
    /// irrelevant here since state is already zeroed first (Checks-Effects-
    /// Interactions): the bond is cleared before this function returns.
    pub fn withdraw(&mut self, node_id: H256, caller: Address, current_epoch: EpochId) -> Result<U256, SettlementError> {
        let node = self.nodes.get_mut(&node_id).ok_or(SettlementError::NodeNotFound)?;
        if node.operator != caller {
            return Err(SettlementError::NotNodeOperator);
        }
        if node.unlock_epoch > current_epoch {
            return Err(SettlementError::UnlockNotReached);
        }
        if node.bond_amount.is_zero() {
            return Err(SettlementError::NoBondToWithdraw);
        }
        let amount = node.bond_amount;
        node.bond_amount = U256::zero();
        node.unbond_requested = false;
        Ok(amount)
    }

    /// Applies a slash, returning the amount actually deducted (clamped to
    /// the remaining bond) and deactivating the node if its bond hits zero.
    pub fn apply_slash(&mut self, node_id: H256, amount: U256) -> Result<U256, SettlementError> {
        let node = self.nodes.get_mut(&node_id).ok_or(SettlementError::NodeNotFound)?;
        let deducted = amount.min(node.bond_amount);
        node.bond_amount -= deducted;
        if node.bond_amount.is_zero() {
            node.active = false;
        }
        Ok(deducted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pubkey(n: u8) -> Vec<u8> {
        vec![n; 64]
    }

    #[test]
    fn registers_with_minimum_bond() {
        let mut reg = NodeRegistry::new();
        let op = Address::from_low_u64_be(1);
        let node_id = reg
            .register(op, pubkey(1), 0, H256::zero(), H256::from_low_u64_be(1), H256::zero(), U256::from(MIN_BOND_WEI), 0, true)
            .unwrap();
        assert!(reg.get(node_id).unwrap().active);
    }

    #[test]
    fn rejects_duplicate_endpoint_commitment() {
        let mut reg = NodeRegistry::new();
        let op1 = Address::from_low_u64_be(1);
        let op2 = Address::from_low_u64_be(2);
        let endpoint = H256::from_low_u64_be(42);
        reg.register(op1, pubkey(1), 0, H256::zero(), endpoint, H256::zero(), U256::from(MIN_BOND_WEI), 0, true)
            .unwrap();
        let err = reg
            .register(op2, pubkey(2), 0, H256::zero(), endpoint, H256::zero(), U256::from(MIN_BOND_WEI), 0, true)
            .unwrap_err();
        assert!(matches!(err, SettlementError::EndpointAlreadyRegistered));
    }

    #[test]
    fn required_bond_doubles_per_additional_node() {
        let mut reg = NodeRegistry::new();
        let op = Address::from_low_u64_be(1);
        assert_eq!(reg.required_bond(op), U256::from(MIN_BOND_WEI));
        reg.register(op, pubkey(1), 0, H256::zero(), H256::from_low_u64_be(1), H256::zero(), U256::from(MIN_BOND_WEI), 0, true)
            .unwrap();
        assert_eq!(reg.required_bond(op), U256::from(MIN_BOND_WEI) * 2);
    }

    #[test]
    fn withdraw_requires_unlock_epoch_reached() {
        let mut reg = NodeRegistry::new();
        let op = Address::from_low_u64_be(1);
        let node_id = reg
            .register(op, pubkey(1), 0, H256::zero(), H256::from_low_u64_be(1), H256::zero(), U256::from(MIN_BOND_WEI), 0, true)
            .unwrap();
        reg.request_unbond(node_id, op, 0).unwrap();
        assert!(matches!(
            reg.withdraw(node_id, op, 0),
            Err(SettlementError::UnlockNotReached)
        ));
        let amount = reg.withdraw(node_id, op, UNBOND_DELAY_EPOCHS).unwrap();
        assert_eq!(amount, U256::from(MIN_BOND_WEI));
    }
}
