use coc_common::ErrorKind;
use coc_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("challenge quota exhausted for this epoch")]
    QuotaExceeded,
    #[error("no challenge found for this receipt")]
    ChallengeNotFound,
    #[error("receipt's challengeId does not match the supplied challenge")]
    ChallengeMismatch,
    #[error("invalid node signature")]
    InvalidNodeSig,
    #[error("response latency outside the configured window")]
    LatencyWindowExceeded,
    #[error("receipt already accepted (replayed)")]
    ReceiptReplayed,
    #[error("missing _auth envelope")]
    MissingAuthEnvelope,
    #[error("invalid auth envelope signature")]
    InvalidAuthSig,
    #[error("clock skew exceeds the allowed window")]
    ClockSkewExceeded,
    #[error("auth nonce already used")]
    NonceReplayed,
    #[error("sender is not authorized to issue challenges")]
    UnauthorizedSender,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PoseError {
    pub fn kind(&self) -> ErrorKind {
        use PoseError::*;
        match self {
            QuotaExceeded => ErrorKind::Overload,
            ChallengeNotFound => ErrorKind::NotFound,
            ChallengeMismatch | LatencyWindowExceeded => ErrorKind::InvalidInput,
            InvalidNodeSig | InvalidAuthSig | ClockSkewExceeded | UnauthorizedSender => {
                ErrorKind::AuthFailure
            }
            ReceiptReplayed | NonceReplayed => ErrorKind::Conflict,
            MissingAuthEnvelope => ErrorKind::InvalidInput,
            Store(e) => e.kind(),
        }
    }
}
