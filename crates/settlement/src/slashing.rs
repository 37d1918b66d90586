//! Slash reason-code → basis-points table and replay protection (§4.13, §3 `SlashEvidence`).

use coc_common::{SlashEvidence, U256};

/// `slashAmount = max(1, bond * bps / 10000)`, clamped to `bond`.
pub fn slash_bps(reason_code: u8) -> u32 {
    match reason_code {
        1 => 2000,
        2 => 1500,
        3 => 500,
        4 => 3000,
        _ => 1000, // 5+
    }
}

pub fn slash_amount(bond: U256, reason_code: u8) -> U256 {
    if bond.is_zero() {
        return U256::zero();
    }
    let bps = U256::from(slash_bps(reason_code));
    let amount = bond * bps / U256::from(10_000u64);
    amount.max(U256::from(1)).min(bond)
}

pub fn evidence_is_valid(evidence: &SlashEvidence) -> bool {
    evidence.reason_code != 0 && evidence.evidence_hash == coc_common::keccak256(&evidence.raw_evidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_code_table_matches_bps() {
        assert_eq!(slash_bps(1), 2000);
        assert_eq!(slash_bps(2), 1500);
        assert_eq!(slash_bps(3), 500);
        assert_eq!(slash_bps(4), 3000);
        assert_eq!(slash_bps(5), 1000);
        assert_eq!(slash_bps(99), 1000);
    }

    #[test]
    fn compounding_slashes_match_spec_example() {
        let bond = U256::from(1_000_000u64);
        let after_first = bond - slash_amount(bond, 1);
        assert_eq!(after_first, U256::from(800_000u64));
        let after_second = after_first - slash_amount(after_first, 4);
        assert_eq!(after_second, U256::from(560_000u64));
    }
}
