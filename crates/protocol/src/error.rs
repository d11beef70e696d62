use thiserror::Error;

use crate::message::Opcode;

/// Field-level message validation failures.
///
/// Raised by [`crate::validator::validate`] on both outbound messages
/// (before encoding) and inbound messages (after decoding).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be set for {opcode}")]
    MissingField { opcode: Opcode, field: &'static str },

    #[error("{field} cannot be set for {opcode}")]
    IllegalField { opcode: Opcode, field: &'static str },

    #[error("invoke id cannot be 0 for {opcode}")]
    MissingInvokeId { opcode: Opcode },

    #[error("object class and object name must be set together for {opcode}")]
    ObjectNamingMismatch { opcode: Opcode },
}

/// Wire codec failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}
