//! # cdaplink-protocol
//!
//! Message layer for the CDAP session engine.
//!
//! This crate provides:
//! - [`CdapMessage`]: the message model with typed per-opcode constructors
//! - [`Opcode`] and [`MessageFlags`]: the closed opcode and flag sets
//! - [`validator::validate`]: stateless opcode/field consistency checks
//! - [`WireCodec`]: pluggable wire encodings (JSON, Postcard)
//!
//! ## Example
//!
//! ```
//! use cdaplink_protocol::{CdapMessage, JsonCodec, MessageFlags, ObjectInfo, WireCodec};
//!
//! let obj = ObjectInfo {
//!     class: "Flow".into(),
//!     name: "/flows/1".into(),
//!     ..Default::default()
//! };
//! let msg = CdapMessage::read_request(MessageFlags::None, &obj, None, 3);
//! cdaplink_protocol::validator::validate(&msg).unwrap();
//!
//! let bytes = JsonCodec.encode(&msg).unwrap();
//! let decoded = JsonCodec.decode(&bytes).unwrap();
//! assert_eq!(msg, decoded);
//! ```

pub mod codec;
pub mod error;
pub mod message;
pub mod validator;

pub use codec::{JsonCodec, PostcardCodec, WireCodec};
pub use error::{CodecError, ValidationError};
pub use message::{
    AuthPolicy, CdapMessage, ConnectionInfo, EndpointInfo, FilterInfo, MessageFlags, ObjectInfo,
    Opcode, ResultInfo, ABSTRACT_SYNTAX,
};
pub use validator::validate;
