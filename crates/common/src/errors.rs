//! The cross-cutting error taxonomy from spec §7. Every component's
//! `thiserror::Error` enum exposes a `kind() -> ErrorKind` so the RPC layer
//! and the chain engine can apply uniform propagation rules without knowing
//! about each other's concrete error types.

/// A classification of failure, not a concrete error type. Components map
/// their own errors onto this set so callers can make uniform decisions
/// (reject vs. log-and-continue vs. fatal) without matching on every variant
/// of every downstream error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or semantically invalid input; reject and surface to the caller.
    InvalidInput,
    /// A signature, auth token, or handshake failed verification; reject, log, rate-limit.
    AuthFailure,
    /// The requested entity does not exist; return null/empty, not an error.
    NotFound,
    /// A duplicate of already-applied work; treat as an idempotent no-op.
    Conflict,
    /// A precondition was not met (e.g. `NonceTooLow`, `UnlockNotReached`); surface it.
    Precondition,
    /// Caller exceeded a rate limit or quota; return 429.
    Overload,
    /// A retryable failure in an external dependency; surface it, caller may retry.
    Transient,
    /// The persistent store is corrupted; fatal, refuse to start or proceed.
    CorruptState,
    /// An internal invariant was violated; fatal, indicates a bug.
    BugInvariant,
}

impl ErrorKind {
    /// The JSON-RPC 2.0 error code this kind maps to, per spec §7.
    pub fn json_rpc_code(self) -> i64 {
        match self {
            ErrorKind::InvalidInput => -32600,
            ErrorKind::AuthFailure => -32003,
            ErrorKind::Overload => -32005,
            ErrorKind::NotFound => -32601,
            ErrorKind::Conflict | ErrorKind::Precondition => -32602,
            ErrorKind::Transient | ErrorKind::CorruptState | ErrorKind::BugInvariant => -32603,
        }
    }
}
