//! Shared quit/reconnect control state.
//!
//! Two cooperative flags coordinate every loop in the client:
//!
//! - `quit`: operator asked for total shutdown. Never cleared once set.
//! - `reconnect`: the current session should be abandoned and retried.
//!   Cleared by the supervisor at the top of each connection attempt.
//!
//! Quit takes precedence: a reconnect request made after quit is ignored,
//! and setting quit clears any pending reconnect so the supervisor does not
//! retry.
//!
//! The state lives in a `tokio::sync::watch` channel so that loops can both
//! poll it cheaply and `await` a change.

use std::sync::Arc;

use tokio::sync::watch;

/// Snapshot of the two control flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    /// Total shutdown requested.
    pub quit: bool,
    /// Session should be torn down and retried.
    pub reconnect: bool,
}

impl ControlState {
    /// Whether the current session should stop for either reason.
    #[inline]
    pub fn should_stop(&self) -> bool {
        self.quit || self.reconnect
    }
}

/// Cloneable handle to the process-wide control flags.
#[derive(Debug, Clone)]
pub struct ControlFlags {
    tx: Arc<watch::Sender<ControlState>>,
}

impl ControlFlags {
    /// Create a new set of flags with both cleared.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }

    /// Whether quit has been requested.
    #[inline]
    pub fn is_quit(&self) -> bool {
        self.state().quit
    }

    /// Whether a reconnect is pending.
    #[inline]
    pub fn is_reconnect(&self) -> bool {
        self.state().reconnect
    }

    /// Whether the current session should stop.
    #[inline]
    pub fn should_stop(&self) -> bool {
        self.state().should_stop()
    }

    /// Request total shutdown.
    pub fn request_quit(&self) {
        self.tx.send_if_modified(|state| {
            let changed = !state.quit || state.reconnect;
            state.quit = true;
            state.reconnect = false;
            changed
        });
    }

    /// Request a reconnect.
    ///
    /// Returns `false` if quit was already requested and the request was
    /// ignored.
    pub fn request_reconnect(&self) -> bool {
        let mut accepted = false;
        self.tx.send_if_modified(|state| {
            if state.quit {
                return false;
            }
            accepted = true;
            let changed = !state.reconnect;
            state.reconnect = true;
            changed
        });
        accepted
    }

    /// Clear a pending reconnect at the start of a new attempt.
    pub fn clear_reconnect(&self) {
        self.tx.send_if_modified(|state| {
            let changed = state.reconnect;
            state.reconnect = false;
            changed
        });
    }

    /// Wait until the current session should stop.
    pub async fn stopped(&self) {
        self.wait_for(ControlState::should_stop).await;
    }

    /// Wait until quit is requested.
    pub async fn quit_requested(&self) {
        self.wait_for(|state| state.quit).await;
    }

    async fn wait_for(&self, predicate: impl Fn(&ControlState) -> bool) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only fails if it is
        // dropped concurrently, which cannot happen while we hold it.
        let _ = rx.wait_for(|state| predicate(state)).await;
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::new()
    }
}
