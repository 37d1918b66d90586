//! Base-fee controller (C8, §4.8): EIP-1559-style dynamic base fee targeting
//! 50% utilization of `BLOCK_GAS_LIMIT`, moving at most 1/8 per block, floored
//! at 1 gwei.

use coc_common::{BLOCK_GAS_LIMIT, U256};

pub const GENESIS_BASE_FEE_WEI: u64 = 1_000_000_000; // 1 gwei
const FLOOR_WEI: u64 = 1_000_000_000;
const MAX_CHANGE_DENOMINATOR: u64 = 8;

pub fn target_gas_used() -> u64 {
    BLOCK_GAS_LIMIT / 2
}

/// Computes `nextBaseFee` from the parent block's declared base fee and the
/// gas it actually used.
pub fn next_base_fee(parent_base_fee: U256, parent_gas_used: u64) -> U256 {
    let target = target_gas_used();
    let parent = parent_base_fee;

    match parent_gas_used.cmp(&target) {
        std::cmp::Ordering::Equal => parent,
        std::cmp::Ordering::Greater => {
            let delta = parent_gas_used - target;
            let increase = (parent * U256::from(delta) / U256::from(target))
                / U256::from(MAX_CHANGE_DENOMINATOR);
            parent + increase.max(U256::from(1))
        }
        std::cmp::Ordering::Less => {
            let delta = target - parent_gas_used;
            let decrease = (parent * U256::from(delta) / U256::from(target))
                / U256::from(MAX_CHANGE_DENOMINATOR);
            parent.saturating_sub(decrease).max(U256::from(FLOOR_WEI))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_at_target_utilization() {
        let base = U256::from(GENESIS_BASE_FEE_WEI);
        assert_eq!(next_base_fee(base, target_gas_used()), base);
    }

    #[test]
    fn strictly_increases_at_full_utilization() {
        let mut base = U256::from(GENESIS_BASE_FEE_WEI);
        for _ in 0..10 {
            let next = next_base_fee(base, BLOCK_GAS_LIMIT);
            assert!(next > base);
            // each step's increase should be within integer-division tolerance of 1/8
            let expected = base + base / U256::from(8);
            let diff = if next > expected { next - expected } else { expected - next };
            assert!(diff <= U256::from(2));
            base = next;
        }
    }

    #[test]
    fn converges_to_floor_under_sustained_zero_usage() {
        let mut base = U256::from(GENESIS_BASE_FEE_WEI * 10);
        for _ in 0..200 {
            base = next_base_fee(base, 0);
        }
        assert_eq!(base, U256::from(FLOOR_WEI));
    }
}
