use thiserror::Error;

use cdaplink_protocol::{CodecError, Opcode, ValidationError};

use crate::state::ConnectionState;

/// Session engine failures.
///
/// Violations raised while preparing to send are recoverable: nothing
/// was mutated and the caller may correct and resend. Violations raised
/// on receipt, and timeouts, are session-fatal: the session is forced to
/// Null and must be discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{opcode} is not allowed while the session is in {state} state")]
    StateViolation {
        opcode: Opcode,
        state: ConnectionState,
    },

    #[error("no matching {expected} operation for invoke id {invoke_id}")]
    OperationMismatch { invoke_id: u32, expected: Opcode },

    #[error("invoke id {0} is already in flight")]
    DuplicateInvokeId(u32),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("timed out after {timeout_ms} ms in {state} state")]
    Timeout {
        state: ConnectionState,
        timeout_ms: u64,
    },

    #[error("no session for channel {0}")]
    UnknownChannel(u64),
}

pub type Result<T> = std::result::Result<T, SessionError>;
