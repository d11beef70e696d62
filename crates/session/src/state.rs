//! Connection state machine
//!
//! State transitions:
//! ```text
//! NULL → (send/recv CONNECT) → AWAITCON → (send/recv CONNECT_R) → CONNECTED
//!      ← (send/recv RELEASE_R) ← AWAITCLOSE ← (send/recv RELEASE) ←┘
//! ```
//!
//! Sending CONNECT arms an open timer; sending RELEASE with a nonzero
//! invoke id arms a close timer. Timers are plain deadlines: the owner
//! polls [`ConnectionStateMachine::check_timeout`] from its own time
//! source, and expiry forces the machine back to Null with no retry.

use std::time::{Duration, Instant};

use tracing::debug;

use cdaplink_protocol::Opcode;

use crate::error::{Result, SessionError};

/// Connection lifecycle state. Null is both initial and terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No association. Initial and terminal.
    #[default]
    Null,

    /// CONNECT sent or received, waiting for CONNECT_R.
    AwaitCon,

    /// Open handshake complete, object operations allowed.
    Connected,

    /// RELEASE sent or received, waiting for RELEASE_R.
    AwaitClose,
}

impl ConnectionState {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, ConnectionState::Null)
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Null => write!(f, "Null"),
            ConnectionState::AwaitCon => write!(f, "AwaitCon"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::AwaitClose => write!(f, "AwaitClose"),
        }
    }
}

/// Drives the open/close handshakes for one session.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    timeout: Duration,
    open_deadline: Option<Instant>,
    close_deadline: Option<Instant>,
}

impl ConnectionStateMachine {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: ConnectionState::Null,
            timeout,
            open_deadline: None,
            close_deadline: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    fn violation(&self, opcode: Opcode) -> SessionError {
        SessionError::StateViolation {
            opcode,
            state: self.state,
        }
    }

    pub fn check_connect(&self) -> Result<()> {
        if self.state != ConnectionState::Null {
            return Err(self.violation(Opcode::Connect));
        }
        Ok(())
    }

    /// CONNECT flushed to the wire: wait for the response, bounded by
    /// the open timer.
    pub fn connect_sent(&mut self, now: Instant) -> Result<()> {
        self.check_connect()?;
        self.state = ConnectionState::AwaitCon;
        self.open_deadline = Some(now + self.timeout);
        debug!(timeout_ms = self.timeout.as_millis() as u64, "waiting for connection response");
        Ok(())
    }

    /// The receiving side answers instead of waiting, so no timer is
    /// armed here.
    pub fn connect_received(&mut self) -> Result<()> {
        self.check_connect()?;
        self.state = ConnectionState::AwaitCon;
        Ok(())
    }

    pub fn check_connect_response(&self) -> Result<()> {
        if self.state != ConnectionState::AwaitCon {
            return Err(self.violation(Opcode::ConnectR));
        }
        Ok(())
    }

    pub fn connect_response_sent(&mut self) -> Result<()> {
        self.check_connect_response()?;
        self.state = ConnectionState::Connected;
        Ok(())
    }

    pub fn connect_response_received(&mut self) -> Result<()> {
        self.check_connect_response()?;
        debug!("connection response received");
        self.open_deadline = None;
        self.state = ConnectionState::Connected;
        Ok(())
    }

    pub fn check_release(&self) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(self.violation(Opcode::Release));
        }
        Ok(())
    }

    /// RELEASE flushed to the wire. A nonzero invoke id means a
    /// RELEASE_R is expected, so the close timer is armed.
    pub fn release_sent(&mut self, invoke_id: u32, now: Instant) -> Result<()> {
        self.check_release()?;
        self.state = ConnectionState::AwaitClose;
        if invoke_id != 0 {
            self.close_deadline = Some(now + self.timeout);
            debug!(timeout_ms = self.timeout.as_millis() as u64, "waiting for release response");
        }
        Ok(())
    }

    /// Returns true when the connection closed immediately: either the
    /// peer expects no RELEASE_R (invoke id 0) or both sides released
    /// simultaneously.
    pub fn release_received(&mut self, invoke_id: u32) -> Result<bool> {
        if self.state != ConnectionState::Connected && self.state != ConnectionState::AwaitClose {
            return Err(self.violation(Opcode::Release));
        }
        if invoke_id != 0 && self.state != ConnectionState::AwaitClose {
            self.state = ConnectionState::AwaitClose;
            Ok(false)
        } else {
            self.force_null();
            Ok(true)
        }
    }

    pub fn check_release_response(&self) -> Result<()> {
        if self.state != ConnectionState::AwaitClose {
            return Err(self.violation(Opcode::ReleaseR));
        }
        Ok(())
    }

    pub fn release_response_sent(&mut self) -> Result<()> {
        self.check_release_response()?;
        self.force_null();
        Ok(())
    }

    pub fn release_response_received(&mut self) -> Result<()> {
        self.check_release_response()?;
        debug!("release response received");
        self.force_null();
        Ok(())
    }

    /// Polls the open/close deadlines against the caller's clock. On
    /// expiry the machine is forced to Null and the timeout is returned;
    /// the owning session must be torn down.
    pub fn check_timeout(&mut self, now: Instant) -> Result<()> {
        let expired = match (self.open_deadline, self.close_deadline) {
            (Some(deadline), _) if now >= deadline => true,
            (_, Some(deadline)) if now >= deadline => true,
            _ => false,
        };
        if expired {
            let state = self.state;
            self.force_null();
            return Err(SessionError::Timeout {
                state,
                timeout_ms: self.timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Unconditionally returns to Null, dropping any armed timer.
    pub fn force_null(&mut self) {
        self.state = ConnectionState::Null;
        self.open_deadline = None;
        self.close_deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn test_open_handshake_initiator() {
        let mut machine = ConnectionStateMachine::new(TIMEOUT);
        let now = Instant::now();

        assert!(machine.connect_sent(now).is_ok());
        assert_eq!(machine.state(), ConnectionState::AwaitCon);

        assert!(machine.connect_response_received().is_ok());
        assert_eq!(machine.state(), ConnectionState::Connected);

        // open timer was disarmed by the response
        assert!(machine.check_timeout(now + TIMEOUT * 2).is_ok());
    }

    #[test]
    fn test_open_handshake_responder() {
        let mut machine = ConnectionStateMachine::new(TIMEOUT);

        assert!(machine.connect_received().is_ok());
        assert_eq!(machine.state(), ConnectionState::AwaitCon);

        assert!(machine.connect_response_sent().is_ok());
        assert!(machine.is_connected());
    }

    #[test]
    fn test_connect_requires_null() {
        let mut machine = ConnectionStateMachine::new(TIMEOUT);
        machine.connect_received().unwrap();

        let err = machine.connect_received().unwrap_err();
        assert!(matches!(
            err,
            SessionError::StateViolation {
                opcode: Opcode::Connect,
                state: ConnectionState::AwaitCon,
            }
        ));
    }

    #[test]
    fn test_connect_response_out_of_state() {
        let mut machine = ConnectionStateMachine::new(TIMEOUT);
        assert!(machine.connect_response_received().is_err());
        assert_eq!(machine.state(), ConnectionState::Null);
    }

    #[test]
    fn test_release_handshake() {
        let mut machine = connected(TIMEOUT);
        let now = Instant::now();

        assert!(machine.release_sent(4, now).is_ok());
        assert_eq!(machine.state(), ConnectionState::AwaitClose);

        assert!(machine.release_response_received().is_ok());
        assert_eq!(machine.state(), ConnectionState::Null);
        assert!(machine.check_timeout(now + TIMEOUT * 2).is_ok());
    }

    #[test]
    fn test_release_received_with_zero_invoke_id_closes_now() {
        let mut machine = connected(TIMEOUT);
        assert_eq!(machine.release_received(0).unwrap(), true);
        assert_eq!(machine.state(), ConnectionState::Null);
    }

    #[test]
    fn test_simultaneous_release() {
        let mut machine = connected(TIMEOUT);
        machine.release_sent(0, Instant::now()).unwrap();

        // peer released at the same time: close immediately
        assert_eq!(machine.release_received(5).unwrap(), true);
        assert_eq!(machine.state(), ConnectionState::Null);
    }

    #[test]
    fn test_open_timeout_forces_null() {
        let mut machine = ConnectionStateMachine::new(TIMEOUT);
        let now = Instant::now();
        machine.connect_sent(now).unwrap();

        let err = machine.check_timeout(now + TIMEOUT).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Timeout {
                state: ConnectionState::AwaitCon,
                ..
            }
        ));
        assert_eq!(machine.state(), ConnectionState::Null);
    }

    #[test]
    fn test_close_timeout_forces_null() {
        let mut machine = connected(TIMEOUT);
        let now = Instant::now();
        machine.release_sent(3, now).unwrap();

        assert!(machine.check_timeout(now + TIMEOUT / 2).is_ok());
        let err = machine.check_timeout(now + TIMEOUT).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Timeout {
                state: ConnectionState::AwaitClose,
                ..
            }
        ));
        assert_eq!(machine.state(), ConnectionState::Null);
    }

    #[test]
    fn test_release_without_reply_arms_no_timer() {
        let mut machine = connected(TIMEOUT);
        let now = Instant::now();
        machine.release_sent(0, now).unwrap();

        assert!(machine.check_timeout(now + TIMEOUT * 10).is_ok());
        assert_eq!(machine.state(), ConnectionState::AwaitClose);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Null.to_string(), "Null");
        assert_eq!(ConnectionState::AwaitCon.to_string(), "AwaitCon");
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(ConnectionState::AwaitClose.to_string(), "AwaitClose");
    }

    fn connected(timeout: Duration) -> ConnectionStateMachine {
        let mut machine = ConnectionStateMachine::new(timeout);
        machine.connect_received().unwrap();
        machine.connect_response_sent().unwrap();
        machine
    }
}
