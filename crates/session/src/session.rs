//! Per-association session
//!
//! A [`Session`] composes the connection state machine, the operation
//! tracker and the invoke-id allocator for one logical association, all
//! serialized under a single lock. The send path is split into
//! prepare/confirm: [`Session::encode_next_message_to_be_sent`] only
//! checks and encodes, and [`Session::message_sent`] applies the
//! mutations once the bytes were actually flushed, so a failed transport
//! write never corrupts session state.
//!
//! Send-side violations are recoverable. Receive-side violations and
//! timer expiry are fatal: the session is forced back to Null and must
//! be discarded by its owner.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use cdaplink_protocol::{
    validate, AuthPolicy, CdapMessage, EndpointInfo, MessageFlags, Opcode, WireCodec,
};

use crate::error::{Result, SessionError};
use crate::invoke_id::InvokeIdAllocator;
use crate::operation::{OperationRole, OperationTracker};
use crate::state::{ConnectionState, ConnectionStateMachine};

/// Identifier of the underlying channel (port id of the N-1 flow).
pub type ChannelId = u64;

/// Negotiated peer identity for one association. Populated wholesale
/// when a CONNECT is processed, cleared wholesale when the association
/// ends; only the channel id survives clearing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub channel: ChannelId,
    pub abs_syntax: Option<i32>,
    pub version: Option<u32>,
    pub auth: Option<AuthPolicy>,
    pub local: Option<EndpointInfo>,
    pub peer: Option<EndpointInfo>,
}

impl SessionDescriptor {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            ..Default::default()
        }
    }

    /// On a sent CONNECT the source names this side; on a received one
    /// the orientation is mirrored.
    fn populate(&mut self, message: &CdapMessage, sent: bool) {
        self.abs_syntax = message.abs_syntax;
        self.version = message.version;
        self.auth = message.auth.clone();
        if sent {
            self.local = message.source.clone();
            self.peer = message.destination.clone();
        } else {
            self.local = message.destination.clone();
            self.peer = message.source.clone();
        }
    }

    fn clear(&mut self) {
        *self = Self::new(self.channel);
    }
}

struct SessionInner {
    machine: ConnectionStateMachine,
    tracker: OperationTracker,
    invoke_ids: InvokeIdAllocator,
    descriptor: SessionDescriptor,
}

/// One CDAP association over one channel.
///
/// All mutation goes through the per-session lock; different sessions
/// are fully independent. The session performs no I/O itself: callers
/// move the bytes and report wire order through `message_sent` /
/// `message_received`.
pub struct Session {
    channel: ChannelId,
    timeout: std::time::Duration,
    codec: Arc<dyn WireCodec>,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new(channel: ChannelId, timeout: std::time::Duration, codec: Arc<dyn WireCodec>) -> Self {
        Self {
            channel,
            timeout,
            codec,
            inner: Mutex::new(SessionInner {
                machine: ConnectionStateMachine::new(timeout),
                tracker: OperationTracker::new(),
                invoke_ids: InvokeIdAllocator::new(),
                descriptor: SessionDescriptor::new(channel),
            }),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn timeout(&self) -> std::time::Duration {
        self.timeout
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().machine.state()
    }

    /// True once the association has ended (or never started).
    pub fn is_closed(&self) -> bool {
        self.state().is_null()
    }

    pub fn descriptor(&self) -> SessionDescriptor {
        self.inner.lock().descriptor.clone()
    }

    /// Smallest free invoke id, marked in flight.
    pub fn allocate_invoke_id(&self) -> u32 {
        self.inner.lock().invoke_ids.allocate()
    }

    pub fn invoke_id_in_use(&self, invoke_id: u32) -> bool {
        self.inner.lock().invoke_ids.is_used(invoke_id)
    }

    pub fn pending_operation_count(&self) -> usize {
        self.inner.lock().tracker.pending_count()
    }

    /// Validates the message, runs the send-side checks and returns the
    /// wire bytes. Nothing is mutated: call [`Session::message_sent`]
    /// once the bytes were flushed.
    pub fn encode_next_message_to_be_sent(&self, message: &CdapMessage) -> Result<Bytes> {
        validate(message)?;
        let inner = self.inner.lock();
        check_outbound(&inner, message)?;
        Ok(self.codec.encode(message)?)
    }

    /// Confirms that the message reached the wire and applies the state
    /// transitions, operation bookkeeping and invoke-id updates.
    pub fn message_sent(&self, message: &CdapMessage) -> Result<()> {
        validate(message)?;
        let mut inner = self.inner.lock();
        check_outbound(&inner, message)?;
        apply_outbound(&mut inner, message, Instant::now())?;
        debug!(channel = self.channel, %message, "message sent");
        if inner.machine.state().is_null() {
            teardown(&mut inner);
        }
        Ok(())
    }

    /// Decodes an inbound buffer and runs the receive-side automaton.
    /// Any failure here is fatal to the session.
    pub fn message_received(&self, bytes: &[u8]) -> Result<CdapMessage> {
        let message = match self.codec.decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                let mut inner = self.inner.lock();
                warn!(channel = self.channel, error = %e, "undecodable message, tearing down session");
                teardown(&mut inner);
                return Err(e.into());
            }
        };
        self.process_received(&message)?;
        Ok(message)
    }

    /// Receive-side processing for an already decoded message.
    pub fn process_received(&self, message: &CdapMessage) -> Result<()> {
        let mut inner = self.inner.lock();
        let result = apply_inbound(&mut inner, message).and_then(|()| {
            validate(message)?;
            Ok(())
        });
        if let Err(e) = result {
            warn!(channel = self.channel, %message, error = %e, "receive violation, tearing down session");
            teardown(&mut inner);
            return Err(e);
        }
        debug!(channel = self.channel, %message, "message received");
        if inner.machine.state().is_null() {
            teardown(&mut inner);
        }
        Ok(())
    }

    /// Polls the open/close timers against `now`. On expiry the session
    /// is torn down and the timeout returned; the owner must discard it.
    pub fn check_timeouts(&self, now: Instant) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Err(e) = inner.machine.check_timeout(now) {
            warn!(channel = self.channel, error = %e, "timer expired, tearing down session");
            teardown(&mut inner);
            return Err(e);
        }
        Ok(())
    }
}

fn teardown(inner: &mut SessionInner) {
    inner.machine.force_null();
    inner.tracker.clear();
    inner.invoke_ids.clear();
    inner.descriptor.clear();
}

fn require_connected(inner: &SessionInner, opcode: Opcode) -> Result<()> {
    if !inner.machine.is_connected() {
        return Err(SessionError::StateViolation {
            opcode,
            state: inner.machine.state(),
        });
    }
    Ok(())
}

fn is_incomplete_read_response(message: &CdapMessage) -> bool {
    message.opcode == Opcode::ReadR && message.flags == MessageFlags::IncompleteRead
}

fn check_outbound(inner: &SessionInner, message: &CdapMessage) -> Result<()> {
    match message.opcode {
        Opcode::Connect => inner.machine.check_connect(),
        Opcode::ConnectR => inner.machine.check_connect_response(),
        Opcode::Release => inner.machine.check_release(),
        Opcode::ReleaseR => inner.machine.check_release_response(),
        Opcode::Create
        | Opcode::Delete
        | Opcode::Read
        | Opcode::Write
        | Opcode::Start
        | Opcode::Stop => {
            require_connected(inner, message.opcode)?;
            inner.tracker.check_request(message.invoke_id)
        }
        Opcode::CreateR
        | Opcode::DeleteR
        | Opcode::ReadR
        | Opcode::WriteR
        | Opcode::StartR
        | Opcode::StopR => {
            require_connected(inner, message.opcode)?;
            inner
                .tracker
                .check_response(message.invoke_id, message.opcode, OperationRole::Responder)
        }
        Opcode::CancelRead => {
            require_connected(inner, message.opcode)?;
            inner
                .tracker
                .check_cancel_request(message.invoke_id, OperationRole::Initiator)
        }
        Opcode::CancelReadR => {
            require_connected(inner, message.opcode)?;
            inner
                .tracker
                .check_cancel_response(message.invoke_id, OperationRole::Responder)
        }
    }
}

fn apply_outbound(inner: &mut SessionInner, message: &CdapMessage, now: Instant) -> Result<()> {
    match message.opcode {
        Opcode::Connect => {
            inner.machine.connect_sent(now)?;
            inner.descriptor.populate(message, true);
            inner.invoke_ids.reserve(message.invoke_id);
        }
        Opcode::ConnectR => {
            inner.machine.connect_response_sent()?;
            inner.invoke_ids.free(message.invoke_id);
        }
        Opcode::Release => {
            inner.machine.release_sent(message.invoke_id, now)?;
            inner.invoke_ids.reserve(message.invoke_id);
        }
        Opcode::ReleaseR => {
            inner.machine.release_response_sent()?;
            inner.invoke_ids.free(message.invoke_id);
            inner.descriptor.clear();
        }
        Opcode::Create
        | Opcode::Delete
        | Opcode::Read
        | Opcode::Write
        | Opcode::Start
        | Opcode::Stop => {
            inner
                .tracker
                .open_request(message.invoke_id, message.opcode, OperationRole::Initiator);
            inner.invoke_ids.reserve(message.invoke_id);
        }
        Opcode::CreateR
        | Opcode::DeleteR
        | Opcode::ReadR
        | Opcode::WriteR
        | Opcode::StartR
        | Opcode::StopR => {
            if !is_incomplete_read_response(message) {
                inner.tracker.close(message.invoke_id);
                inner.invoke_ids.free(message.invoke_id);
            }
        }
        Opcode::CancelRead => {
            inner
                .tracker
                .open_cancel(message.invoke_id, OperationRole::Initiator);
            inner.invoke_ids.reserve(message.invoke_id);
        }
        Opcode::CancelReadR => {
            inner.tracker.close_cancel(message.invoke_id);
            inner.invoke_ids.free(message.invoke_id);
        }
    }
    Ok(())
}

fn apply_inbound(inner: &mut SessionInner, message: &CdapMessage) -> Result<()> {
    match message.opcode {
        Opcode::Connect => {
            inner.machine.connect_received()?;
            inner.descriptor.populate(message, false);
            inner.invoke_ids.reserve(message.invoke_id);
        }
        Opcode::ConnectR => {
            inner.machine.connect_response_received()?;
            inner.invoke_ids.free(message.invoke_id);
        }
        Opcode::Release => {
            inner.machine.release_received(message.invoke_id)?;
            inner.invoke_ids.reserve(message.invoke_id);
        }
        Opcode::ReleaseR => {
            inner.machine.release_response_received()?;
            inner.invoke_ids.free(message.invoke_id);
            inner.descriptor.clear();
        }
        Opcode::Create
        | Opcode::Delete
        | Opcode::Read
        | Opcode::Write
        | Opcode::Start
        | Opcode::Stop => {
            require_connected(inner, message.opcode)?;
            inner.tracker.check_request(message.invoke_id)?;
            inner
                .tracker
                .open_request(message.invoke_id, message.opcode, OperationRole::Responder);
            inner.invoke_ids.reserve(message.invoke_id);
        }
        Opcode::CreateR
        | Opcode::DeleteR
        | Opcode::ReadR
        | Opcode::WriteR
        | Opcode::StartR
        | Opcode::StopR => {
            require_connected(inner, message.opcode)?;
            inner
                .tracker
                .check_response(message.invoke_id, message.opcode, OperationRole::Initiator)?;
            if !is_incomplete_read_response(message) {
                inner.tracker.close(message.invoke_id);
                inner.invoke_ids.free(message.invoke_id);
            }
        }
        Opcode::CancelRead => {
            require_connected(inner, message.opcode)?;
            inner
                .tracker
                .check_cancel_request(message.invoke_id, OperationRole::Responder)?;
            inner
                .tracker
                .open_cancel(message.invoke_id, OperationRole::Responder);
            inner.invoke_ids.reserve(message.invoke_id);
        }
        Opcode::CancelReadR => {
            require_connected(inner, message.opcode)?;
            inner
                .tracker
                .check_cancel_response(message.invoke_id, OperationRole::Initiator)?;
            inner.tracker.close_cancel(message.invoke_id);
            inner.invoke_ids.free(message.invoke_id);
        }
    }
    Ok(())
}
