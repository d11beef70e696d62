//! Pluggable wire codecs
//!
//! The session engine treats the byte layout of a message as opaque: it
//! calls [`WireCodec::encode`] right after the send-side checks and
//! [`WireCodec::decode`] right before the receive-side checks, and never
//! looks at the bytes in between.
//!
//! # Codec IDs
//!
//! - `1`: JSON (serde_json)
//! - `2`: Postcard (compact binary)

use bytes::Bytes;

use crate::error::CodecError;
use crate::message::CdapMessage;

/// Encodes and decodes messages to and from wire bytes.
///
/// Implementations must be thread-safe (Send + Sync) as one codec
/// instance may be shared by every session of a registry.
pub trait WireCodec: Send + Sync {
    /// Returns the codec ID (1=JSON, 2=Postcard)
    fn id(&self) -> u8;

    /// Returns a human-readable name for this codec
    fn name(&self) -> &'static str;

    /// Encodes a message into wire bytes
    fn encode(&self, message: &CdapMessage) -> Result<Bytes, CodecError>;

    /// Decodes wire bytes into a message
    fn decode(&self, bytes: &[u8]) -> Result<CdapMessage, CodecError>;
}

/// JSON codec (codec_id = 1)
///
/// Human-readable, handy for debugging and interoperability.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec;

impl WireCodec for JsonCodec {
    fn id(&self) -> u8 {
        1
    }

    fn name(&self) -> &'static str {
        "JSON"
    }

    fn encode(&self, message: &CdapMessage) -> Result<Bytes, CodecError> {
        let vec = serde_json::to_vec(message)
            .map_err(|e| CodecError::Encode(format!("JSON: {}", e)))?;
        Ok(Bytes::from(vec))
    }

    fn decode(&self, bytes: &[u8]) -> Result<CdapMessage, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(format!("JSON: {}", e)))
    }
}

/// Postcard codec (codec_id = 2)
///
/// Compact binary encoding, preferred on bandwidth-constrained channels.
#[derive(Debug, Clone, Copy)]
pub struct PostcardCodec;

impl WireCodec for PostcardCodec {
    fn id(&self) -> u8 {
        2
    }

    fn name(&self) -> &'static str {
        "Postcard"
    }

    fn encode(&self, message: &CdapMessage) -> Result<Bytes, CodecError> {
        let vec = postcard::to_stdvec(message)
            .map_err(|e| CodecError::Encode(format!("Postcard: {}", e)))?;
        Ok(Bytes::from(vec))
    }

    fn decode(&self, bytes: &[u8]) -> Result<CdapMessage, CodecError> {
        postcard::from_bytes(bytes).map_err(|e| CodecError::Decode(format!("Postcard: {}", e)))
    }
}
