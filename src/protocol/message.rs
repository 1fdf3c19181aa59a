//! Message struct with typed accessors.
//!
//! Represents one decoded wire line: a tag name plus its attributes.
//!
//! # Example
//!
//! ```
//! use lrsn_client::protocol::{Message, MessageKind};
//!
//! let msg = Message::new("Heartbeat").with_attr("interval", "10");
//!
//! assert_eq!(msg.kind(), MessageKind::Heartbeat);
//! assert_eq!(msg.attr_parse::<u64>("interval").unwrap(), 10);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::wire_format::tags;
use crate::codec::XmlCodec;
use crate::error::{LrsnError, Result};

/// Known message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `LRSN` greeting.
    Greeting,
    /// `LoginAck`.
    LoginAck,
    /// `Heartbeat`.
    Heartbeat,
    /// `PageRequestStatus`.
    PageRequestStatus,
    /// Any other tag.
    Other,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    tag: String,
    attributes: BTreeMap<String, String>,
}

impl Message {
    /// Create a message with no attributes.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Create a message from a tag and attribute map.
    pub fn from_parts(tag: impl Into<String>, attributes: BTreeMap<String, String>) -> Self {
        Self {
            tag: tag.into(),
            attributes,
        }
    }

    /// Add an attribute (builder style).
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Get the tag name.
    #[inline]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Classify the tag.
    pub fn kind(&self) -> MessageKind {
        match self.tag.as_str() {
            tags::GREETING => MessageKind::Greeting,
            tags::LOGIN_ACK => MessageKind::LoginAck,
            tags::HEARTBEAT => MessageKind::Heartbeat,
            tags::PAGE_REQUEST_STATUS => MessageKind::PageRequestStatus,
            _ => MessageKind::Other,
        }
    }

    /// Check the tag name.
    #[inline]
    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    /// Get an attribute value.
    #[inline]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Get and parse a required attribute.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the attribute is missing or does not parse.
    pub fn attr_parse<T: FromStr>(&self, name: &str) -> Result<T> {
        let raw = self.attr(name).ok_or_else(|| {
            LrsnError::Protocol(format!("<{}> is missing attribute '{}'", self.tag, name))
        })?;

        raw.trim().parse().map_err(|_| {
            LrsnError::Protocol(format!(
                "<{}> has invalid {}=\"{}\"",
                self.tag, name, raw
            ))
        })
    }

    /// Iterate over attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs: Vec<(&str, &str)> = self.attributes().collect();
        f.write_str(&XmlCodec::encode_element(&self.tag, &attrs))
    }
}
