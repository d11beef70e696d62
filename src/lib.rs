//! # cdaplink
//!
//! CDAP (Common Distributed Application Protocol) session engine:
//! the per-association correctness layer deciding whether a message may
//! legally be sent or has legally been received, and pairing every
//! response with the request that caused it.
//!
//! ## Components
//!
//! - `cdaplink-protocol`: message model, stateless validation, wire codecs
//! - `cdaplink-session`: connection state machine, invoke-id allocation,
//!   operation tracking, session registry and the transport seam

pub use cdaplink_protocol as protocol;
pub use cdaplink_session as session;
