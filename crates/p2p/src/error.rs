//! Error taxonomy for the wire/P2P fabric (C9, §4.9).

use coc_common::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum P2PError {
    #[error("frame payload of {0} bytes exceeds MAX_PAYLOAD (16 MiB)")]
    FrameTooLarge(usize),
    #[error("frame buffer exceeded the 32 MiB hard cap")]
    BufferOverflow,
    #[error("bad frame magic {0:#06x}")]
    BadMagic(u16),
    #[error("unknown frame message type {0:#04x}")]
    UnknownMessageType(u8),
    #[error("malformed message payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("handshake signature did not recover the claimed node id")]
    HandshakeAuthFailed,
    #[error("connection rejected: {0}")]
    AdmissionRejected(&'static str),
    #[error("discovery request timed out")]
    DiscoveryTimeout,
}

impl P2PError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            P2PError::FrameTooLarge(_)
            | P2PError::BadMagic(_)
            | P2PError::UnknownMessageType(_)
            | P2PError::Json(_) => ErrorKind::InvalidInput,
            P2PError::BufferOverflow | P2PError::AdmissionRejected(_) => ErrorKind::Overload,
            P2PError::Io(_) | P2PError::DiscoveryTimeout => ErrorKind::Transient,
            P2PError::HandshakeAuthFailed => ErrorKind::AuthFailure,
        }
    }
}
