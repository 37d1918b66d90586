//! Chain engine (C7), mempool (C5) and base-fee controller (C8).

pub mod basefee;
pub mod blockchain;
pub mod error;
pub mod mempool;

pub use basefee::{next_base_fee, target_gas_used, GENESIS_BASE_FEE_WEI};
pub use blockchain::{ChainEngine, ChainEvent, SignatureMode};
pub use error::{ChainError, MempoolError};
pub use mempool::{Mempool, MempoolStats};
