//! In-flight operation tracking
//!
//! One table per session pairs every nonzero invoke id with the request
//! that opened it and the role this side plays in it. The cancel-read
//! exchange is tracked in a second table so that a legitimate READ_R can
//! still arrive while its cancellation is in flight.

use std::collections::HashMap;

use cdaplink_protocol::Opcode;

use crate::error::{Result, SessionError};

/// Which side of an exchange this session plays for one invoke id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationRole {
    /// This side sent the request and will consume the response.
    Initiator,

    /// This side received the request and must produce the response.
    Responder,
}

/// One unresolved request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperation {
    pub opcode: Opcode,
    pub role: OperationRole,
}

/// Per-session table of unresolved operations plus the parallel
/// cancel-read table.
#[derive(Debug, Default)]
pub struct OperationTracker {
    pending: HashMap<u32, PendingOperation>,
    cancel_read: HashMap<u32, PendingOperation>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request may not reuse an invoke id that is still unresolved.
    /// Invoke id 0 carries no operation state and always passes.
    pub fn check_request(&self, invoke_id: u32) -> Result<()> {
        if invoke_id != 0 && self.pending.contains_key(&invoke_id) {
            return Err(SessionError::DuplicateInvokeId(invoke_id));
        }
        Ok(())
    }

    pub fn open_request(&mut self, invoke_id: u32, opcode: Opcode, role: OperationRole) {
        if invoke_id != 0 {
            self.pending
                .insert(invoke_id, PendingOperation { opcode, role });
        }
    }

    /// A response is acceptable only if a pending operation exists for
    /// its invoke id, opened by the matching request opcode, with this
    /// side holding `role` (Responder to produce the response, Initiator
    /// to consume it).
    pub fn check_response(
        &self,
        invoke_id: u32,
        response: Opcode,
        role: OperationRole,
    ) -> Result<()> {
        let expected = response.request().unwrap_or(response);
        let mismatch = || SessionError::OperationMismatch {
            invoke_id,
            expected,
        };
        let entry = self.pending.get(&invoke_id).ok_or_else(mismatch)?;
        if entry.opcode != expected || entry.role != role {
            return Err(mismatch());
        }
        Ok(())
    }

    /// Closes the pending operation, if still open. Idempotent.
    pub fn close(&mut self, invoke_id: u32) -> bool {
        self.pending.remove(&invoke_id).is_some()
    }

    /// CANCELREAD requires an open READ held with `role` (Initiator when
    /// this side issued the READ, Responder when it received it), and no
    /// cancellation already in flight for the same invoke id.
    pub fn check_cancel_request(&self, invoke_id: u32, role: OperationRole) -> Result<()> {
        let entry = self
            .pending
            .get(&invoke_id)
            .ok_or(SessionError::OperationMismatch {
                invoke_id,
                expected: Opcode::Read,
            })?;
        if entry.opcode != Opcode::Read || entry.role != role {
            return Err(SessionError::OperationMismatch {
                invoke_id,
                expected: Opcode::Read,
            });
        }
        if self.cancel_read.contains_key(&invoke_id) {
            return Err(SessionError::DuplicateInvokeId(invoke_id));
        }
        Ok(())
    }

    pub fn open_cancel(&mut self, invoke_id: u32, role: OperationRole) {
        self.cancel_read.insert(
            invoke_id,
            PendingOperation {
                opcode: Opcode::CancelRead,
                role,
            },
        );
    }

    pub fn check_cancel_response(&self, invoke_id: u32, role: OperationRole) -> Result<()> {
        match self.cancel_read.get(&invoke_id) {
            Some(entry) if entry.role == role => Ok(()),
            _ => Err(SessionError::OperationMismatch {
                invoke_id,
                expected: Opcode::CancelRead,
            }),
        }
    }

    /// Closes the cancel-read entry and, idempotently, the READ it
    /// targeted. A READ_R that won the race and already closed the READ
    /// makes the second close a no-op.
    pub fn close_cancel(&mut self, invoke_id: u32) {
        self.cancel_read.remove(&invoke_id);
        self.pending.remove(&invoke_id);
    }

    pub fn get(&self, invoke_id: u32) -> Option<&PendingOperation> {
        self.pending.get(&invoke_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn cancel_pending_count(&self) -> usize {
        self.cancel_read.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.cancel_read.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_invoke_id_rejected() {
        let mut tracker = OperationTracker::new();
        tracker.open_request(2, Opcode::Create, OperationRole::Initiator);

        assert_eq!(
            tracker.check_request(2),
            Err(SessionError::DuplicateInvokeId(2))
        );
        assert!(tracker.check_request(3).is_ok());
    }

    #[test]
    fn test_fire_and_forget_keeps_no_state() {
        let mut tracker = OperationTracker::new();
        tracker.open_request(0, Opcode::Write, OperationRole::Initiator);
        assert_eq!(tracker.pending_count(), 0);
        assert!(tracker.check_request(0).is_ok());
    }

    #[test]
    fn test_response_requires_matching_request() {
        let mut tracker = OperationTracker::new();
        tracker.open_request(2, Opcode::Create, OperationRole::Initiator);

        // consuming side holds Initiator
        assert!(tracker
            .check_response(2, Opcode::CreateR, OperationRole::Initiator)
            .is_ok());

        // wrong opcode family
        assert!(tracker
            .check_response(2, Opcode::ReadR, OperationRole::Initiator)
            .is_err());

        // wrong role: the initiator cannot produce the response
        assert!(tracker
            .check_response(2, Opcode::CreateR, OperationRole::Responder)
            .is_err());

        // unknown invoke id
        assert!(tracker
            .check_response(9, Opcode::CreateR, OperationRole::Initiator)
            .is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut tracker = OperationTracker::new();
        tracker.open_request(4, Opcode::Read, OperationRole::Initiator);

        assert!(tracker.close(4));
        assert!(!tracker.close(4));
    }

    #[test]
    fn test_cancel_requires_open_read() {
        let mut tracker = OperationTracker::new();
        tracker.open_request(3, Opcode::Write, OperationRole::Initiator);

        // not a READ
        assert!(tracker
            .check_cancel_request(3, OperationRole::Initiator)
            .is_err());

        tracker.open_request(5, Opcode::Read, OperationRole::Initiator);
        assert!(tracker
            .check_cancel_request(5, OperationRole::Initiator)
            .is_ok());

        // wrong role
        assert!(tracker
            .check_cancel_request(5, OperationRole::Responder)
            .is_err());
    }

    #[test]
    fn test_duplicate_cancel_rejected() {
        let mut tracker = OperationTracker::new();
        tracker.open_request(5, Opcode::Read, OperationRole::Initiator);
        tracker.open_cancel(5, OperationRole::Initiator);

        assert_eq!(
            tracker.check_cancel_request(5, OperationRole::Initiator),
            Err(SessionError::DuplicateInvokeId(5))
        );
    }

    #[test]
    fn test_close_cancel_also_closes_read() {
        let mut tracker = OperationTracker::new();
        tracker.open_request(5, Opcode::Read, OperationRole::Initiator);
        tracker.open_cancel(5, OperationRole::Initiator);

        tracker.close_cancel(5);
        assert_eq!(tracker.pending_count(), 0);
        assert_eq!(tracker.cancel_pending_count(), 0);

        // READ_R already closed the READ: still a no-op
        tracker.open_request(6, Opcode::Read, OperationRole::Initiator);
        tracker.open_cancel(6, OperationRole::Initiator);
        tracker.close(6);
        tracker.close_cancel(6);
        assert_eq!(tracker.pending_count(), 0);
    }
}
