//! Control module - process-wide quit/reconnect signalling.
//!
//! Every long-running loop in the client (supervisor, session, listener,
//! console) holds a clone of [`ControlFlags`] and checks it at each loop
//! boundary. Setting a flag is the only cancellation primitive.
//!
//! # Example
//!
//! ```
//! use lrsn_client::control::ControlFlags;
//!
//! let flags = ControlFlags::new();
//! let listener_view = flags.clone();
//!
//! flags.request_reconnect();
//! assert!(listener_view.should_stop());
//!
//! flags.request_quit();
//! assert!(listener_view.is_quit());
//! assert!(!listener_view.is_reconnect());
//! ```

mod flags;

pub use flags::{ControlFlags, ControlState};
