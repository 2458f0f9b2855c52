//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding room messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, wrong types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The action name is not part of the room protocol.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The message decoded but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
