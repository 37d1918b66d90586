use coc_common::{Address, MIN_BOND_WEI, U256};
use coc_settlement::{build_and_submit_batch, SettlementState};

fn receipt(n: u64) -> coc_common::ReceiptMessage {
    coc_common::ReceiptMessage {
        challenge_id: coc_common::H256::from_low_u64_be(n),
        node_id: coc_common::H256::from_low_u64_be(1),
        response_at_ms: n,
        response_body: vec![],
        node_sig: vec![0u8; 65],
    }
}

/// Register a node with the minimum bond, submit a batch over two receipts,
/// advance three epochs and finalize: epochFinalized flips true, the batch
/// count is 1, and the rolling settlement root is non-zero.
#[test]
fn registers_submits_and_finalizes_a_batch() {
    let state = SettlementState::new();
    let operator = Address::from_low_u64_be(1);
    let node_id = state
        .register_node(
            operator,
            vec![9u8; 64],
            0,
            coc_common::H256::zero(),
            coc_common::H256::from_low_u64_be(77),
            coc_common::H256::zero(),
            U256::from(MIN_BOND_WEI),
            0,
            true,
        )
        .expect("registration with exact minimum bond succeeds");

    assert!(state.get_node(node_id).unwrap().active);

    let receipts = vec![receipt(1), receipt(2)];
    let batch_id = build_and_submit_batch(&state, &receipts, 0, node_id, 0).expect("valid batch submits");

    let batch = state.get_batch(batch_id).unwrap();
    assert_eq!(batch.epoch_id, 0);
    assert!(!batch.finalized);

    assert!(state.finalize_epoch(0, 2).is_err(), "dispute window has not elapsed yet");

    let finalized_count = state.finalize_epoch(0, 3).expect("dispute window has elapsed");
    assert_eq!(finalized_count, 1);
    assert!(state.epoch_finalized(0));
    assert_ne!(state.epoch_settlement_root(0), coc_common::H256::zero());
}

/// A second operator cannot reuse an endpoint commitment already bound to an
/// active node (Sybil resistance via endpoint uniqueness).
#[test]
fn rejects_endpoint_reuse_across_operators() {
    let state = SettlementState::new();
    let endpoint = coc_common::H256::from_low_u64_be(1234);

    state
        .register_node(
            Address::from_low_u64_be(1),
            vec![1u8; 64],
            0,
            coc_common::H256::zero(),
            endpoint,
            coc_common::H256::zero(),
            U256::from(MIN_BOND_WEI),
            0,
            true,
        )
        .unwrap();

    let err = state
        .register_node(
            Address::from_low_u64_be(2),
            vec![2u8; 64],
            0,
            coc_common::H256::zero(),
            endpoint,
            coc_common::H256::zero(),
            U256::from(MIN_BOND_WEI),
            0,
            true,
        )
        .unwrap_err();
    assert!(matches!(err, coc_settlement::SettlementError::EndpointAlreadyRegistered));
}

/// Unbonding a node frees its endpoint commitment, withdraw is only
/// available once the unlock epoch has passed, and the bond is zeroed on
/// withdrawal (Checks-Effects-Interactions).
#[test]
fn unbond_then_withdraw_lifecycle() {
    let state = SettlementState::new();
    let operator = Address::from_low_u64_be(5);
    let node_id = state
        .register_node(
            operator,
            vec![5u8; 64],
            0,
            coc_common::H256::zero(),
            coc_common::H256::from_low_u64_be(5),
            coc_common::H256::zero(),
            U256::from(MIN_BOND_WEI),
            0,
            true,
        )
        .unwrap();

    state.request_unbond(node_id, operator, 0).unwrap();
    assert!(!state.get_node(node_id).unwrap().active);

    assert!(state.withdraw(node_id, operator, 0).is_err());

    let amount = state.withdraw(node_id, operator, 7 * 24).unwrap();
    assert_eq!(amount, U256::from(MIN_BOND_WEI));
    assert!(state.get_node(node_id).unwrap().bond_amount.is_zero());
}
