use coc_common::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid message digest: {0}")]
    InvalidMessage(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidMessage(_) => ErrorKind::InvalidInput,
            CryptoError::InvalidSignature(_) => ErrorKind::AuthFailure,
        }
    }
}
