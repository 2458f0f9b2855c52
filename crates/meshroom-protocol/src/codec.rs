//! Codec trait and implementations for room message payloads.
//!
//! The room layer never serializes directly; it goes through a [`Codec`]
//! so the wire format can be swapped without touching protocol logic.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
///
/// `Send + Sync + 'static` because the codec is owned by the room actor
/// task for as long as the room manager runs.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`. Field names are camelCase, matching
/// what browser peers publish.
///
/// ```rust
/// use meshroom_protocol::{Codec, JsonCodec, LeaveNotify, PeerId};
///
/// let codec = JsonCodec;
/// let msg = LeaveNotify { player_id: PeerId::new("bob") };
/// let bytes = codec.encode(&msg).unwrap();
/// assert_eq!(bytes, br#"{"playerId":"bob"}"#);
/// let back: LeaveNotify = codec.decode(&bytes).unwrap();
/// assert_eq!(back, msg);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{JoinRequest, PeerId};

    #[test]
    fn test_json_codec_rejects_truncated_input() {
        let result: Result<JoinRequest, _> = JsonCodec.decode(br#"{"playerId":"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_rejects_missing_field() {
        let result: Result<JoinRequest, _> = JsonCodec.decode(b"{}");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_encodes_camel_case() {
        let bytes = JsonCodec
            .encode(&JoinRequest {
                player_id: PeerId::new("carol"),
            })
            .unwrap();
        assert_eq!(bytes, br#"{"playerId":"carol"}"#);
    }
}
