//! Protocol module - wire constants, line framing, and message types.
//!
//! This module implements the LRSN line protocol:
//! - Line buffer for accumulating partial reads
//! - Decoded incoming [`Message`]s with typed accessors
//! - Outgoing [`LoginRequest`] and [`PageRequest`] encoders

mod line_buffer;
mod message;
mod request;
mod wire_format;

pub use line_buffer::LineBuffer;
pub use message::{Message, MessageKind};
pub use request::{LoginRequest, PageIntent, PageRequest, PagerType};
pub use wire_format::{
    attrs, tags, DEFAULT_MAX_LINE_LENGTH, DEFAULT_SERVICES, LINE_TERMINATOR, LOGIN_SUCCESS,
    LRSN_PORT,
};
