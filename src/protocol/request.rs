//! Outgoing requests.
//!
//! Each request serializes to exactly one wire line, newline included. The
//! transmitter does not acknowledge a request that lacks the trailing newline.
//!
//! # Example
//!
//! ```
//! use lrsn_client::protocol::{PageRequest, PagerType};
//!
//! let request = PageRequest::new(5, PagerType::Guest, 1234, "");
//! assert_eq!(
//!     &request.encode()[..],
//!     b"<PageRequest id=\"5\" pager=\"2;1234\" message=\"\" />\n"
//! );
//! ```

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use super::wire_format::{attrs, tags, DEFAULT_SERVICES};
use crate::codec::XmlCodec;

/// Pager type code carried in the `pager` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PagerType {
    /// Alphanumeric POCSAG pager.
    Alpha = 0,
    /// Numeric POCSAG pager.
    Numeric = 1,
    /// LRS guest pager (coaster, Adverteaser, specialty).
    Guest = 2,
    /// Star pager (LRS staff pager).
    Star = 3,
    /// Vibe-only POCSAG pager.
    Vibe = 4,
}

impl PagerType {
    /// Wire code (0-4).
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether this pager type displays free text.
    #[inline]
    pub fn takes_text(self) -> bool {
        self == PagerType::Alpha
    }
}

impl TryFrom<i64> for PagerType {
    type Error = i64;

    fn try_from(code: i64) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(PagerType::Alpha),
            1 => Ok(PagerType::Numeric),
            2 => Ok(PagerType::Guest),
            3 => Ok(PagerType::Star),
            4 => Ok(PagerType::Vibe),
            other => Err(other),
        }
    }
}

impl FromStr for PagerType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let code: i64 = s
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a number", s.trim()))?;
        PagerType::try_from(code).map_err(|code| format!("pager type {} is out of range 0-4", code))
    }
}

impl fmt::Display for PagerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// `<Login services="..." />` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    /// Semicolon-separated list of services.
    pub services: String,
}

impl LoginRequest {
    /// Create a login request for the given services.
    pub fn new(services: impl Into<String>) -> Self {
        Self {
            services: services.into(),
        }
    }

    /// Encode to a newline-terminated wire line.
    pub fn encode(&self) -> Bytes {
        XmlCodec::encode_line(tags::LOGIN, &[(attrs::SERVICES, self.services.as_str())])
    }
}

impl Default for LoginRequest {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICES)
    }
}

/// A page to send, before the session assigns it a sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageIntent {
    /// Pager type.
    pub pager_type: PagerType,
    /// Target pager number.
    pub number: u64,
    /// Message text.
    pub message: String,
}

impl PageIntent {
    /// Create a new page intent.
    pub fn new(pager_type: PagerType, number: u64, message: impl Into<String>) -> Self {
        Self {
            pager_type,
            number,
            message: message.into(),
        }
    }
}

/// `<PageRequest ... />` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Session-scoped sequence id.
    pub id: u64,
    /// Pager type.
    pub pager_type: PagerType,
    /// Target pager number.
    pub number: u64,
    /// Message text.
    pub message: String,
    /// Transmitter system id, omitted from the wire when `None`.
    pub system_id: Option<u32>,
}

impl PageRequest {
    /// Create a page request without a system id.
    pub fn new(id: u64, pager_type: PagerType, number: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            pager_type,
            number,
            message: message.into(),
            system_id: None,
        }
    }

    /// Build a request from an intent and its assigned sequence id.
    pub fn from_intent(id: u64, intent: PageIntent, system_id: Option<u32>) -> Self {
        Self {
            id,
            pager_type: intent.pager_type,
            number: intent.number,
            message: intent.message,
            system_id,
        }
    }

    /// Set the system id (builder style).
    pub fn with_system_id(mut self, system_id: Option<u32>) -> Self {
        self.system_id = system_id;
        self
    }

    /// Value of the `pager` attribute: `"{type};{number}"`.
    pub fn pager(&self) -> String {
        format!("{};{}", self.pager_type, self.number)
    }

    /// Encode to a newline-terminated wire line.
    pub fn encode(&self) -> Bytes {
        let id = self.id.to_string();
        let pager = self.pager();
        let system_id = self.system_id.map(|s| s.to_string());

        let mut fields: Vec<(&str, &str)> = vec![
            (attrs::ID, id.as_str()),
            (attrs::PAGER, pager.as_str()),
            (attrs::MESSAGE, self.message.as_str()),
        ];
        if let Some(system_id) = &system_id {
            fields.push((attrs::SYSTEM_ID, system_id.as_str()));
        }

        XmlCodec::encode_line(tags::PAGE_REQUEST, &fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_encoding() {
        let login = LoginRequest::default();
        assert_eq!(
            &login.encode()[..],
            b"<Login services=\"NetPage;Heartbeat\" />\n"
        );
    }

    #[test]
    fn test_page_request_without_system_id() {
        let request = PageRequest::new(5, PagerType::Guest, 1234, "");
        assert_eq!(
            &request.encode()[..],
            b"<PageRequest id=\"5\" pager=\"2;1234\" message=\"\" />\n"
        );
    }

    #[test]
    fn test_page_request_with_system_id() {
        let request = PageRequest::new(1, PagerType::Alpha, 42, "Table ready").with_system_id(Some(7));
        assert_eq!(
            &request.encode()[..],
            b"<PageRequest id=\"1\" pager=\"0;42\" message=\"Table ready\" system_id=\"7\" />\n"
        );
    }

    #[test]
    fn test_page_request_escapes_message() {
        let request = PageRequest::new(2, PagerType::Alpha, 9, "Fish & \"chips\"\nnow");
        let encoded = request.encode();

        assert_eq!(
            &encoded[..],
            b"<PageRequest id=\"2\" pager=\"0;9\" message=\"Fish &amp; &quot;chips&quot;&#10;now\" />\n"
        );
        // Exactly one newline: the terminator
        assert_eq!(encoded.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn test_from_intent() {
        let intent = PageIntent::new(PagerType::Vibe, 100, "Vibe1");
        let request = PageRequest::from_intent(3, intent, Some(12));

        assert_eq!(request.id, 3);
        assert_eq!(request.pager(), "4;100");
        assert_eq!(request.system_id, Some(12));
    }

    #[test]
    fn test_pager_type_codes() {
        for code in 0..=4i64 {
            let pager_type = PagerType::try_from(code).unwrap();
            assert_eq!(pager_type.code() as i64, code);
        }
        assert_eq!(PagerType::try_from(5), Err(5));
        assert_eq!(PagerType::try_from(-1), Err(-1));
    }

    #[test]
    fn test_pager_type_from_str() {
        assert_eq!(" 3 ".parse::<PagerType>(), Ok(PagerType::Star));
        assert!("9".parse::<PagerType>().unwrap_err().contains("out of range"));
        assert!("x".parse::<PagerType>().unwrap_err().contains("not a number"));
    }

    #[test]
    fn test_only_alpha_takes_text() {
        assert!(PagerType::Alpha.takes_text());
        assert!(!PagerType::Numeric.takes_text());
        assert!(!PagerType::Vibe.takes_text());
    }
}
