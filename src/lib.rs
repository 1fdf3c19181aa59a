//! # lrsn-client
//!
//! Rust client for the LRSN control protocol spoken by paging transmitters.
//!
//! The client logs in to the transmitter, watches its heartbeats to detect a
//! silently dead link, submits page requests, and reconnects on its own
//! whenever the link degrades.
//!
//! ## Architecture
//!
//! - **Supervisor**: restarts sessions after a delay until quit
//! - **Session**: connect, login handshake, active phase, teardown
//! - **Listener**: framed reads, decoding, heartbeat watchdog
//! - **Writer**: the only task that writes to the socket once active
//!
//! Everything is stopped cooperatively through shared [`ControlFlags`].
//!
//! ## Example
//!
//! ```ignore
//! use lrsn_client::{ClientBuilder, PageIntent, PagerType};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = ClientBuilder::new("192.168.1.50").start();
//!
//!     client
//!         .pages()
//!         .send_page(PageIntent::new(PagerType::Guest, 12, "Vibe1"))
//!         .await
//!         .unwrap();
//!
//!     client.quit();
//!     client.wait_for_shutdown().await.unwrap();
//! }
//! ```

pub mod codec;
pub mod console;
pub mod control;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod watchdog;
pub mod writer;

mod client;

pub use client::{Client, ClientBuilder, ClientConfig, PageSender};
pub use control::ControlFlags;
pub use error::{LrsnError, Result};
pub use protocol::{Message, MessageKind, PageIntent, PagerType};
pub use session::{LinkEvent, SessionOutcome, SessionState};
pub use supervisor::SupervisorSummary;
