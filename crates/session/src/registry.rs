//! Session registry
//!
//! Owns every live [`Session`] keyed by channel id and routes traffic to
//! the right one. Sessions are created lazily when a CONNECT is first
//! sent or received on a channel, and dropped the moment their
//! connection state returns to Null, whether through graceful release, a
//! receive violation or timer expiry.
//!
//! The registry also hosts the request builders that consult the
//! per-session invoke-id allocator, so callers never pick invoke ids by
//! hand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use cdaplink_protocol::{
    CdapMessage, ConnectionInfo, FilterInfo, MessageFlags, ObjectInfo, Opcode, ResultInfo,
    WireCodec,
};

use crate::error::{Result, SessionError};
use crate::session::{ChannelId, Session};

/// Default open/close timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Creates, looks up and destroys sessions.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ChannelId, Arc<Session>>>,
    timeout: Duration,
    codec: Arc<dyn WireCodec>,
}

impl SessionRegistry {
    pub fn new(codec: Arc<dyn WireCodec>, timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            timeout,
            codec,
        }
    }

    pub fn with_default_timeout(codec: Arc<dyn WireCodec>) -> Self {
        Self::new(codec, DEFAULT_TIMEOUT)
    }

    pub fn session(&self, channel: ChannelId) -> Option<Arc<Session>> {
        self.sessions.lock().get(&channel).cloned()
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.sessions.lock().keys().copied().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Finds the channel whose negotiated peer application process name
    /// matches `ap_name`.
    pub fn channel_for_peer(&self, ap_name: &str) -> Option<ChannelId> {
        let sessions = self.sessions.lock();
        sessions
            .values()
            .find(|session| {
                session
                    .descriptor()
                    .peer
                    .is_some_and(|peer| peer.ap_name == ap_name)
            })
            .map(|session| session.channel())
    }

    pub fn remove(&self, channel: ChannelId) -> Option<Arc<Session>> {
        self.sessions.lock().remove(&channel)
    }

    fn get_or_create(&self, channel: ChannelId) -> Arc<Session> {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(channel)
            .or_insert_with(|| {
                debug!(channel, "creating session");
                Arc::new(Session::new(channel, self.timeout, Arc::clone(&self.codec)))
            })
            .clone()
    }

    fn existing(&self, channel: ChannelId) -> Result<Arc<Session>> {
        self.session(channel)
            .ok_or(SessionError::UnknownChannel(channel))
    }

    fn reap_if_closed(&self, session: &Arc<Session>) {
        if session.is_closed() {
            debug!(channel = session.channel(), "session closed, removing");
            self.sessions.lock().remove(&session.channel());
        }
    }

    /// Send-side prepare. A CONNECT creates the session on the fly; any
    /// other opcode on an unknown channel is an error.
    pub fn encode_next_message_to_be_sent(
        &self,
        channel: ChannelId,
        message: &CdapMessage,
    ) -> Result<Bytes> {
        let session = if message.opcode == Opcode::Connect {
            self.get_or_create(channel)
        } else {
            self.existing(channel)?
        };
        session.encode_next_message_to_be_sent(message)
    }

    /// Send-side confirm. Drops the session if the message ended the
    /// association (RELEASE_R sent).
    pub fn message_sent(&self, channel: ChannelId, message: &CdapMessage) -> Result<()> {
        let session = if message.opcode == Opcode::Connect {
            self.get_or_create(channel)
        } else {
            self.existing(channel)?
        };
        let result = session.message_sent(message);
        self.reap_if_closed(&session);
        result
    }

    /// Routes an inbound buffer to its session, creating one when a
    /// CONNECT arrives on an unknown channel. Fatal receive errors,
    /// undecodable frames included, drop the session.
    pub fn message_received(&self, channel: ChannelId, bytes: &[u8]) -> Result<CdapMessage> {
        let session = match self.session(channel) {
            Some(session) => session,
            None => {
                // peek at the opcode before creating anything
                let message = self.codec.decode(bytes)?;
                if message.opcode != Opcode::Connect {
                    return Err(SessionError::UnknownChannel(channel));
                }
                self.get_or_create(channel)
            }
        };
        let result = session.message_received(bytes);
        self.reap_if_closed(&session);
        result
    }

    /// Polls every session's timers, dropping the ones that expired.
    /// Returns the channels that were torn down.
    pub fn check_timeouts(&self, now: Instant) -> Vec<ChannelId> {
        let sessions: Vec<Arc<Session>> = self.sessions.lock().values().cloned().collect();
        let mut expired = Vec::new();
        for session in sessions {
            if let Err(e) = session.check_timeouts(now) {
                warn!(channel = session.channel(), error = %e, "discarding timed out session");
                self.sessions.lock().remove(&session.channel());
                expired.push(session.channel());
            }
        }
        expired
    }

    // Message builders. Requests draw their invoke id from the session
    // allocator; `want_reply: false` sends fire-and-forget with id 0.

    pub fn connect_request(&self, channel: ChannelId, con: &ConnectionInfo) -> Result<CdapMessage> {
        let session = self.get_or_create(channel);
        let invoke_id = session.allocate_invoke_id();
        Ok(CdapMessage::connect_request(con, invoke_id))
    }

    pub fn connect_response(
        &self,
        channel: ChannelId,
        con: &ConnectionInfo,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Result<CdapMessage> {
        self.existing(channel)?;
        Ok(CdapMessage::connect_response(con, res, invoke_id))
    }

    pub fn release_request(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        want_reply: bool,
    ) -> Result<CdapMessage> {
        let session = self.existing(channel)?;
        let invoke_id = if want_reply { session.allocate_invoke_id() } else { 0 };
        Ok(CdapMessage::release_request(flags, invoke_id))
    }

    pub fn release_response(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Result<CdapMessage> {
        self.existing(channel)?;
        Ok(CdapMessage::release_response(flags, res, invoke_id))
    }

    pub fn create_request(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        want_reply: bool,
    ) -> Result<CdapMessage> {
        let invoke_id = self.request_invoke_id(channel, want_reply)?;
        Ok(CdapMessage::create_request(flags, obj, filter, invoke_id))
    }

    pub fn create_response(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        obj: &ObjectInfo,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Result<CdapMessage> {
        self.existing(channel)?;
        Ok(CdapMessage::create_response(flags, obj, res, invoke_id))
    }

    pub fn delete_request(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        want_reply: bool,
    ) -> Result<CdapMessage> {
        let invoke_id = self.request_invoke_id(channel, want_reply)?;
        Ok(CdapMessage::delete_request(flags, obj, filter, invoke_id))
    }

    pub fn delete_response(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        obj: &ObjectInfo,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Result<CdapMessage> {
        self.existing(channel)?;
        Ok(CdapMessage::delete_response(flags, obj, res, invoke_id))
    }

    pub fn read_request(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        want_reply: bool,
    ) -> Result<CdapMessage> {
        let invoke_id = self.request_invoke_id(channel, want_reply)?;
        Ok(CdapMessage::read_request(flags, obj, filter, invoke_id))
    }

    pub fn read_response(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        obj: &ObjectInfo,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Result<CdapMessage> {
        self.existing(channel)?;
        Ok(CdapMessage::read_response(flags, obj, res, invoke_id))
    }

    pub fn write_request(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        want_reply: bool,
    ) -> Result<CdapMessage> {
        let invoke_id = self.request_invoke_id(channel, want_reply)?;
        Ok(CdapMessage::write_request(flags, obj, filter, invoke_id))
    }

    pub fn write_response(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Result<CdapMessage> {
        self.existing(channel)?;
        Ok(CdapMessage::write_response(flags, res, invoke_id))
    }

    pub fn start_request(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        want_reply: bool,
    ) -> Result<CdapMessage> {
        let invoke_id = self.request_invoke_id(channel, want_reply)?;
        Ok(CdapMessage::start_request(flags, obj, filter, invoke_id))
    }

    pub fn start_response(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        obj: Option<&ObjectInfo>,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Result<CdapMessage> {
        self.existing(channel)?;
        Ok(CdapMessage::start_response(flags, obj, res, invoke_id))
    }

    pub fn stop_request(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        want_reply: bool,
    ) -> Result<CdapMessage> {
        let invoke_id = self.request_invoke_id(channel, want_reply)?;
        Ok(CdapMessage::stop_request(flags, obj, filter, invoke_id))
    }

    pub fn stop_response(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Result<CdapMessage> {
        self.existing(channel)?;
        Ok(CdapMessage::stop_response(flags, res, invoke_id))
    }

    /// CANCELREAD reuses the invoke id of the READ it aborts.
    pub fn cancel_read_request(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        invoke_id: u32,
    ) -> Result<CdapMessage> {
        self.existing(channel)?;
        Ok(CdapMessage::cancel_read_request(flags, invoke_id))
    }

    pub fn cancel_read_response(
        &self,
        channel: ChannelId,
        flags: MessageFlags,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Result<CdapMessage> {
        self.existing(channel)?;
        Ok(CdapMessage::cancel_read_response(flags, res, invoke_id))
    }

    fn request_invoke_id(&self, channel: ChannelId, want_reply: bool) -> Result<u32> {
        let session = self.existing(channel)?;
        Ok(if want_reply { session.allocate_invoke_id() } else { 0 })
    }
}
