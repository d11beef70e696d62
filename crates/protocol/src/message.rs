//! CDAP message model
//!
//! A [`CdapMessage`] carries one of ~20 opcodes forming request/response
//! pairs (CONNECT, RELEASE, CREATE, DELETE, READ, WRITE, START, STOP,
//! CANCELREAD and their `_R` responses), an invoke id correlating a
//! request with its response(s), and opcode-dependent naming, object and
//! result fields.
//!
//! The typed constructors (`connect_request`, `create_response`, ...)
//! build messages with exactly the field set that is legal for each
//! opcode, so a freshly constructed message always passes
//! [`crate::validator::validate`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Abstract syntax identifier carried by CONNECT and CONNECT_R.
pub const ABSTRACT_SYNTAX: i32 = 0x0073;

/// CDAP operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Connect,
    ConnectR,
    Release,
    ReleaseR,
    Create,
    CreateR,
    Delete,
    DeleteR,
    Read,
    ReadR,
    Write,
    WriteR,
    Start,
    StartR,
    Stop,
    StopR,
    CancelRead,
    CancelReadR,
}

impl Opcode {
    /// CONNECT or CONNECT_R.
    #[inline]
    pub fn is_connect_family(&self) -> bool {
        matches!(self, Opcode::Connect | Opcode::ConnectR)
    }

    /// One of the six object requests (CREATE, DELETE, READ, WRITE, START, STOP).
    #[inline]
    pub fn is_object_request(&self) -> bool {
        matches!(
            self,
            Opcode::Create
                | Opcode::Delete
                | Opcode::Read
                | Opcode::Write
                | Opcode::Start
                | Opcode::Stop
        )
    }

    /// One of the six object responses (CREATE_R .. STOP_R).
    #[inline]
    pub fn is_object_response(&self) -> bool {
        matches!(
            self,
            Opcode::CreateR
                | Opcode::DeleteR
                | Opcode::ReadR
                | Opcode::WriteR
                | Opcode::StartR
                | Opcode::StopR
        )
    }

    /// Any `_R` opcode.
    #[inline]
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Opcode::ConnectR
                | Opcode::ReleaseR
                | Opcode::CreateR
                | Opcode::DeleteR
                | Opcode::ReadR
                | Opcode::WriteR
                | Opcode::StartR
                | Opcode::StopR
                | Opcode::CancelReadR
        )
    }

    /// Maps a response opcode to the request opcode it answers.
    pub fn request(&self) -> Option<Opcode> {
        match self {
            Opcode::ConnectR => Some(Opcode::Connect),
            Opcode::ReleaseR => Some(Opcode::Release),
            Opcode::CreateR => Some(Opcode::Create),
            Opcode::DeleteR => Some(Opcode::Delete),
            Opcode::ReadR => Some(Opcode::Read),
            Opcode::WriteR => Some(Opcode::Write),
            Opcode::StartR => Some(Opcode::Start),
            Opcode::StopR => Some(Opcode::Stop),
            Opcode::CancelReadR => Some(Opcode::CancelRead),
            _ => None,
        }
    }

    /// Maps a request opcode to its response opcode.
    pub fn response(&self) -> Option<Opcode> {
        match self {
            Opcode::Connect => Some(Opcode::ConnectR),
            Opcode::Release => Some(Opcode::ReleaseR),
            Opcode::Create => Some(Opcode::CreateR),
            Opcode::Delete => Some(Opcode::DeleteR),
            Opcode::Read => Some(Opcode::ReadR),
            Opcode::Write => Some(Opcode::WriteR),
            Opcode::Start => Some(Opcode::StartR),
            Opcode::Stop => Some(Opcode::StopR),
            Opcode::CancelRead => Some(Opcode::CancelReadR),
            _ => None,
        }
    }

    /// Opcodes that may carry object class/name/instance fields.
    #[inline]
    pub fn carries_object(&self) -> bool {
        self.is_object_request() || self.is_object_response()
    }

    /// Opcodes that may carry an object value. DELETE_R is the one
    /// object opcode excluded here.
    #[inline]
    pub fn carries_object_value(&self) -> bool {
        self.carries_object() && *self != Opcode::DeleteR
    }

    /// Opcodes that may carry scope and filter.
    #[inline]
    pub fn is_targeted(&self) -> bool {
        self.is_object_request()
    }

    /// Opcodes that may carry a result reason: all responses plus both
    /// halves of the cancel-read exchange.
    #[inline]
    pub fn carries_result_reason(&self) -> bool {
        self.is_response() || *self == Opcode::CancelRead
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Opcode::Connect => "M_CONNECT",
            Opcode::ConnectR => "M_CONNECT_R",
            Opcode::Release => "M_RELEASE",
            Opcode::ReleaseR => "M_RELEASE_R",
            Opcode::Create => "M_CREATE",
            Opcode::CreateR => "M_CREATE_R",
            Opcode::Delete => "M_DELETE",
            Opcode::DeleteR => "M_DELETE_R",
            Opcode::Read => "M_READ",
            Opcode::ReadR => "M_READ_R",
            Opcode::Write => "M_WRITE",
            Opcode::WriteR => "M_WRITE_R",
            Opcode::Start => "M_START",
            Opcode::StartR => "M_START_R",
            Opcode::Stop => "M_STOP",
            Opcode::StopR => "M_STOP_R",
            Opcode::CancelRead => "M_CANCELREAD",
            Opcode::CancelReadR => "M_CANCELREAD_R",
        };
        write!(f, "{}", name)
    }
}

/// Per-message flags. Mutually exclusive, so a plain enum rather than a
/// bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageFlags {
    #[default]
    None,

    /// On READ_R: more responses for the same invoke id will follow.
    IncompleteRead,

    /// Synchronous delivery requested.
    Sync,
}

/// Application process / application entity naming for one side of a
/// connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub ap_name: String,
    pub ap_instance: String,
    pub ae_name: String,
    pub ae_instance: String,
}

impl EndpointInfo {
    pub fn named(ap_name: impl Into<String>) -> Self {
        Self {
            ap_name: ap_name.into(),
            ..Default::default()
        }
    }
}

/// Opaque authentication policy carried on CONNECT/CONNECT_R. The engine
/// never interprets these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPolicy {
    pub name: String,
    pub versions: Vec<String>,
    pub options: Option<Bytes>,
}

/// Everything needed to build a CONNECT or CONNECT_R message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub abs_syntax: i32,
    pub version: u32,
    pub auth: AuthPolicy,
    pub source: EndpointInfo,
    pub destination: EndpointInfo,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            abs_syntax: ABSTRACT_SYNTAX,
            version: 1,
            auth: AuthPolicy::default(),
            source: EndpointInfo::default(),
            destination: EndpointInfo::default(),
        }
    }
}

/// Object naming and (optional) value for the object-manipulation opcodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub class: String,
    pub name: String,
    pub instance: i64,
    pub value: Option<Bytes>,
}

/// Scope and filter for the targeted request opcodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterInfo {
    pub filter: Bytes,
    pub scope: i32,
}

/// Result code plus optional human-readable reason, carried on responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultInfo {
    pub code: i32,
    pub reason: Option<String>,
}

impl ResultInfo {
    /// Success result (code 0, no reason).
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failure(code: i32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: Some(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// A single CDAP message.
///
/// Invoke id 0 means fire-and-forget: no response is expected and no
/// operation state is kept for the message.
///
/// # Example
///
/// ```
/// use cdaplink_protocol::message::{CdapMessage, MessageFlags, ObjectInfo, Opcode};
///
/// let obj = ObjectInfo {
///     class: "Flow".into(),
///     name: "/flows/1".into(),
///     ..Default::default()
/// };
/// let msg = CdapMessage::read_request(MessageFlags::None, &obj, None, 3);
/// assert_eq!(msg.opcode, Opcode::Read);
/// assert_eq!(msg.invoke_id, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdapMessage {
    pub opcode: Opcode,
    pub invoke_id: u32,
    pub flags: MessageFlags,
    pub abs_syntax: Option<i32>,
    pub version: Option<u32>,
    pub auth: Option<AuthPolicy>,
    pub source: Option<EndpointInfo>,
    pub destination: Option<EndpointInfo>,
    pub obj_class: Option<String>,
    pub obj_name: Option<String>,
    pub obj_instance: Option<i64>,
    pub obj_value: Option<Bytes>,
    pub scope: Option<i32>,
    pub filter: Option<Bytes>,
    pub result: i32,
    pub result_reason: Option<String>,
}

impl CdapMessage {
    /// Bare message with every optional field unset.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            invoke_id: 0,
            flags: MessageFlags::None,
            abs_syntax: None,
            version: None,
            auth: None,
            source: None,
            destination: None,
            obj_class: None,
            obj_name: None,
            obj_instance: None,
            obj_value: None,
            scope: None,
            filter: None,
            result: 0,
            result_reason: None,
        }
    }

    pub fn connect_request(con: &ConnectionInfo, invoke_id: u32) -> Self {
        let mut msg = Self::new(Opcode::Connect);
        msg.invoke_id = invoke_id;
        msg.apply_connection(con);
        msg
    }

    pub fn connect_response(con: &ConnectionInfo, res: &ResultInfo, invoke_id: u32) -> Self {
        let mut msg = Self::new(Opcode::ConnectR);
        msg.invoke_id = invoke_id;
        msg.apply_connection(con);
        msg.apply_result(res);
        msg
    }

    pub fn release_request(flags: MessageFlags, invoke_id: u32) -> Self {
        let mut msg = Self::new(Opcode::Release);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg
    }

    pub fn release_response(flags: MessageFlags, res: &ResultInfo, invoke_id: u32) -> Self {
        let mut msg = Self::new(Opcode::ReleaseR);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_result(res);
        msg
    }

    pub fn create_request(
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        invoke_id: u32,
    ) -> Self {
        let mut msg = Self::new(Opcode::Create);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_object(obj, true);
        msg.apply_filter(filter);
        msg
    }

    pub fn create_response(
        flags: MessageFlags,
        obj: &ObjectInfo,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Self {
        let mut msg = Self::new(Opcode::CreateR);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_object(obj, true);
        msg.apply_result(res);
        msg
    }

    pub fn delete_request(
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        invoke_id: u32,
    ) -> Self {
        let mut msg = Self::new(Opcode::Delete);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_object(obj, false);
        msg.apply_filter(filter);
        msg
    }

    pub fn delete_response(
        flags: MessageFlags,
        obj: &ObjectInfo,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Self {
        let mut msg = Self::new(Opcode::DeleteR);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_object(obj, false);
        msg.apply_result(res);
        msg
    }

    pub fn read_request(
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        invoke_id: u32,
    ) -> Self {
        let mut msg = Self::new(Opcode::Read);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_object(obj, false);
        msg.apply_filter(filter);
        msg
    }

    pub fn read_response(
        flags: MessageFlags,
        obj: &ObjectInfo,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Self {
        let mut msg = Self::new(Opcode::ReadR);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_object(obj, true);
        msg.apply_result(res);
        msg
    }

    pub fn write_request(
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        invoke_id: u32,
    ) -> Self {
        let mut msg = Self::new(Opcode::Write);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_object(obj, true);
        msg.apply_filter(filter);
        msg
    }

    pub fn write_response(flags: MessageFlags, res: &ResultInfo, invoke_id: u32) -> Self {
        let mut msg = Self::new(Opcode::WriteR);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_result(res);
        msg
    }

    pub fn start_request(
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        invoke_id: u32,
    ) -> Self {
        let mut msg = Self::new(Opcode::Start);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_object(obj, true);
        msg.apply_filter(filter);
        msg
    }

    /// START_R optionally echoes object information back to the requester.
    pub fn start_response(
        flags: MessageFlags,
        obj: Option<&ObjectInfo>,
        res: &ResultInfo,
        invoke_id: u32,
    ) -> Self {
        let mut msg = Self::new(Opcode::StartR);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        if let Some(obj) = obj {
            msg.apply_object(obj, true);
        }
        msg.apply_result(res);
        msg
    }

    pub fn stop_request(
        flags: MessageFlags,
        obj: &ObjectInfo,
        filter: Option<&FilterInfo>,
        invoke_id: u32,
    ) -> Self {
        let mut msg = Self::new(Opcode::Stop);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_object(obj, true);
        msg.apply_filter(filter);
        msg
    }

    pub fn stop_response(flags: MessageFlags, res: &ResultInfo, invoke_id: u32) -> Self {
        let mut msg = Self::new(Opcode::StopR);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_result(res);
        msg
    }

    pub fn cancel_read_request(flags: MessageFlags, invoke_id: u32) -> Self {
        let mut msg = Self::new(Opcode::CancelRead);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg
    }

    pub fn cancel_read_response(flags: MessageFlags, res: &ResultInfo, invoke_id: u32) -> Self {
        let mut msg = Self::new(Opcode::CancelReadR);
        msg.flags = flags;
        msg.invoke_id = invoke_id;
        msg.apply_result(res);
        msg
    }

    fn apply_connection(&mut self, con: &ConnectionInfo) {
        self.abs_syntax = Some(con.abs_syntax);
        self.version = Some(con.version);
        self.auth = Some(con.auth.clone());
        self.source = Some(con.source.clone());
        self.destination = Some(con.destination.clone());
    }

    fn apply_object(&mut self, obj: &ObjectInfo, include_value: bool) {
        if !obj.class.is_empty() {
            self.obj_class = Some(obj.class.clone());
        }
        if !obj.name.is_empty() {
            self.obj_name = Some(obj.name.clone());
        }
        if obj.instance != 0 {
            self.obj_instance = Some(obj.instance);
        }
        if include_value {
            self.obj_value = obj.value.clone();
        }
    }

    fn apply_filter(&mut self, filter: Option<&FilterInfo>) {
        if let Some(filter) = filter {
            self.filter = Some(filter.filter.clone());
            self.scope = Some(filter.scope);
        }
    }

    fn apply_result(&mut self, res: &ResultInfo) {
        self.result = res.code;
        self.result_reason = res.reason.clone();
    }
}

impl std::fmt::Display for CdapMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(invoke_id={})", self.opcode, self.invoke_id)
    }
}
