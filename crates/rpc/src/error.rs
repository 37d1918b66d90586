//! JSON-RPC error taxonomy (C10, §7): every downstream error enum converts
//! into `RpcErr`, which maps to a JSON-RPC error code via the shared
//! `ErrorKind` taxonomy rather than inventing a parallel code table per
//! crate.

use coc_blockchain::{ChainError, MempoolError};
use coc_common::ErrorKind;
use coc_pose::PoseError;
use coc_settlement::SettlementError;
use coc_storage::{IndexError, StoreError};
use coc_vm::EvmError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum RpcErr {
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("missing param: {0}")]
    MissingParam(String),
    #[error("request body too large")]
    TooLargeRequest,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Mempool(#[from] MempoolError),
    #[error(transparent)]
    Evm(#[from] EvmError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Pose(#[from] PoseError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcErr {
    /// The JSON-RPC 2.0 code to surface, derived from each error's
    /// `ErrorKind` (§7) except for the framing-level errors that precede any
    /// handler (parse/method-not-found/rate-limit), which use the standard
    /// JSON-RPC 2.0 codes directly.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            RpcErr::ParseError(_) => -32700,
            RpcErr::MethodNotFound(_) => -32601,
            RpcErr::InvalidParams(_) | RpcErr::MissingParam(_) => -32602,
            RpcErr::TooLargeRequest => -32005,
            RpcErr::RateLimited => ErrorKind::Overload.json_rpc_code(),
            RpcErr::AuthFailure(_) => ErrorKind::AuthFailure.json_rpc_code(),
            RpcErr::NotFound => ErrorKind::NotFound.json_rpc_code(),
            RpcErr::Chain(e) => e.kind().json_rpc_code(),
            RpcErr::Mempool(e) => e.kind().json_rpc_code(),
            RpcErr::Evm(e) => e.kind().json_rpc_code(),
            RpcErr::Store(e) => e.kind().json_rpc_code(),
            RpcErr::Index(e) => match e {
                IndexError::Store(s) => s.kind().json_rpc_code(),
                IndexError::RangeTooLarge(_) | IndexError::TooManyTopics(_) => {
                    ErrorKind::InvalidInput.json_rpc_code()
                }
                IndexError::Decode(_) => ErrorKind::CorruptState.json_rpc_code(),
            },
            RpcErr::Pose(e) => e.kind().json_rpc_code(),
            RpcErr::Settlement(e) => e.kind().json_rpc_code(),
            RpcErr::Internal(_) => ErrorKind::BugInvariant.json_rpc_code(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RpcErrorMetadata {
    pub code: i64,
    pub message: String,
}

impl From<RpcErr> for RpcErrorMetadata {
    fn from(err: RpcErr) -> Self {
        RpcErrorMetadata {
            code: err.json_rpc_code(),
            message: err.to_string(),
        }
    }
}
