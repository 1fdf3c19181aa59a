//! Codec module - conversion between wire lines and messages.
//!
//! - [`XmlCodec`] - the attribute-only XML subset LRSN speaks
//!
//! # Design
//!
//! The codec is a marker struct with static methods rather than a trait
//! object; there is exactly one wire syntax.

mod xml;

pub use xml::XmlCodec;
