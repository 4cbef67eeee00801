//! Pluggable serialization for wire messages and payloads.
//!
//! The same [`MessageCodec`] encodes the [`RemoteMessage`](crate::RemoteMessage)
//! frames on the stream and, through [`CodecRegistry`](crate::CodecRegistry),
//! the application payloads carried inside a batch.
//!
//! ```rust
//! use moonpool_remote::{JsonCodec, MessageCodec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Ping { seq: u32 }
//!
//! let bytes = JsonCodec.encode(&Ping { seq: 1 }).expect("encode");
//! assert_eq!(&bytes, br#"{"seq":1}"#);
//! let decoded: Ping = JsonCodec.decode(&bytes).expect("decode");
//! assert_eq!(decoded, Ping { seq: 1 });
//! ```

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec operations.
#[derive(Debug)]
pub enum CodecError {
    /// Failed to encode a message to bytes.
    Encode(Box<dyn std::error::Error + Send + Sync>),
    /// Failed to decode bytes to a message.
    Decode(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(e) => write!(f, "encode error: {}", e),
            CodecError::Decode(e) => write!(f, "decode error: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Encode(e) => Some(e.as_ref()),
            CodecError::Decode(e) => Some(e.as_ref()),
        }
    }
}

/// Pluggable message serialization format.
///
/// `Clone + 'static` so a codec can be held by transports and registries
/// that outlive the call that created them.
pub trait MessageCodec: Clone + 'static {
    /// Encode a serializable message to bytes.
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes to a deserializable message.
    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec using serde_json.
///
/// Human-readable on the wire, which keeps packet captures debuggable.
#[derive(Clone, Default, Debug, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(msg).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
