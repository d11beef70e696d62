//! # cdaplink-session
//!
//! Per-association CDAP session engine.
//!
//! This crate provides:
//! - [`Session`]: connection state machine + operation tracker +
//!   invoke-id allocator for one association, behind one lock
//! - [`SessionRegistry`]: creates, routes to and destroys sessions by
//!   channel id
//! - [`Transport`]: the byte-moving seam the engine stays agnostic of
//!
//! The engine is invoked synchronously and performs no I/O; callers
//! carry the bytes and report wire order through `message_sent` /
//! `message_received`.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cdaplink_protocol::{ConnectionInfo, EndpointInfo, JsonCodec, ResultInfo};
//! use cdaplink_session::SessionRegistry;
//!
//! let client = SessionRegistry::new(Arc::new(JsonCodec), Duration::from_secs(10));
//! let server = SessionRegistry::new(Arc::new(JsonCodec), Duration::from_secs(10));
//!
//! let con = ConnectionInfo {
//!     source: EndpointInfo::named("apps.client"),
//!     destination: EndpointInfo::named("apps.server"),
//!     ..Default::default()
//! };
//!
//! // open handshake over channel 1
//! let connect = client.connect_request(1, &con).unwrap();
//! let bytes = client.encode_next_message_to_be_sent(1, &connect).unwrap();
//! client.message_sent(1, &connect).unwrap();
//! let received = server.message_received(1, &bytes).unwrap();
//!
//! let reply = server
//!     .connect_response(1, &con, &ResultInfo::ok(), received.invoke_id)
//!     .unwrap();
//! let bytes = server.encode_next_message_to_be_sent(1, &reply).unwrap();
//! server.message_sent(1, &reply).unwrap();
//! client.message_received(1, &bytes).unwrap();
//!
//! assert!(client.session(1).unwrap().state().is_connected());
//! ```

pub mod error;
pub mod invoke_id;
pub mod operation;
pub mod registry;
pub mod session;
pub mod state;
pub mod transport;

pub use error::{Result, SessionError};
pub use invoke_id::InvokeIdAllocator;
pub use operation::{OperationRole, OperationTracker, PendingOperation};
pub use registry::{SessionRegistry, DEFAULT_TIMEOUT};
pub use session::{ChannelId, Session, SessionDescriptor};
pub use state::{ConnectionState, ConnectionStateMachine};
pub use transport::{MemoryTransport, MemoryTransportError, Transport};
