//! PoSe aggregation, node bonding and dispute/slash settlement (C11/C12/C13).
//!
//! Implemented as a native state machine driven by ABI-shaped method calls
//! rather than EVM bytecode; reached from the outside over the `coc_*`
//! JSON-RPC surface in `coc-rpc`, not through contract calldata.

pub mod aggregator;
pub mod batch;
pub mod error;
pub mod node_registry;
pub mod relayer;
pub mod slashing;
pub mod state;

pub use aggregator::{build_and_submit_batch, pick_sample_indices, receipt_leaf};
pub use batch::BatchRegistry;
pub use error::SettlementError;
pub use node_registry::NodeRegistry;
pub use relayer::{DisputeObserver, NodeScore, Relayer, LIVENESS_SLASH_THRESHOLD};
pub use slashing::{evidence_is_valid, slash_amount, slash_bps};
pub use state::SettlementState;
