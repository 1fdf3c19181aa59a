//! Wire format constants.
//!
//! LRSN is a line protocol over TCP. Every message is a single XML empty
//! element terminated by one newline:
//! ```text
//! <Tag attr1="val1" attr2="val2" />\n
//! ```
//!
//! A message never contains a raw newline; newlines inside attribute values
//! travel as character references.

/// TCP control port of the transmitter.
pub const LRSN_PORT: u16 = 3700;

/// Message terminator.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default maximum length of a single line (64 KiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Services requested at login.
pub const DEFAULT_SERVICES: &str = "NetPage;Heartbeat";

/// `ret` value of a successful `LoginAck`.
pub const LOGIN_SUCCESS: i64 = 0;

/// Tag names used on the wire.
pub mod tags {
    /// Greeting sent by the transmitter on connect.
    pub const GREETING: &str = "LRSN";
    /// Client login request.
    pub const LOGIN: &str = "Login";
    /// Login acknowledgment.
    pub const LOGIN_ACK: &str = "LoginAck";
    /// Liveness message from the transmitter.
    pub const HEARTBEAT: &str = "Heartbeat";
    /// Client page request.
    pub const PAGE_REQUEST: &str = "PageRequest";
    /// Transmitter status report for a page request.
    pub const PAGE_REQUEST_STATUS: &str = "PageRequestStatus";
}

/// Attribute names used on the wire.
pub mod attrs {
    pub const SERVICES: &str = "services";
    pub const RET: &str = "ret";
    pub const INTERVAL: &str = "interval";
    pub const ID: &str = "id";
    pub const PAGER: &str = "pager";
    pub const MESSAGE: &str = "message";
    pub const SYSTEM_ID: &str = "system_id";
    pub const DEVICE: &str = "device";
    pub const SWVER: &str = "swver";
    pub const SERNO: &str = "serno";
}
