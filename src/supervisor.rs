//! Reconnect supervisor.
//!
//! Runs sessions back to back until quit. Reconnection is unconditional and
//! unbounded: the transmitter may be power-cycled or cut off for any length
//! of time, and the client keeps trying until an operator quits.
//!
//! The delay between attempts is fixed by default. With a backoff multiplier
//! above 1 it grows after each attempt that failed before login, up to the
//! configured maximum, and resets once a session gets logged in again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::client::ClientConfig;
use crate::control::ControlFlags;
use crate::error::Result;
use crate::protocol::{Message, PageIntent};
use crate::session::{LinkEvent, Session};

/// Totals reported when the supervisor exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorSummary {
    /// Sessions started.
    pub attempts: u32,
    /// Sessions that reached the active state.
    pub logins: u32,
    /// Page requests sent across all sessions.
    pub pages_sent: u64,
}

/// Outer retry loop around [`Session`].
pub struct Supervisor {
    config: Arc<ClientConfig>,
    control: ControlFlags,
    events: broadcast::Sender<Message>,
    status: Option<broadcast::Sender<LinkEvent>>,
}

impl Supervisor {
    /// Create a supervisor.
    pub fn new(
        config: Arc<ClientConfig>,
        control: ControlFlags,
        events: broadcast::Sender<Message>,
    ) -> Self {
        Self {
            config,
            control,
            events,
            status: None,
        }
    }

    /// Publish [`LinkEvent`]s from every session on `status`.
    pub fn with_status(mut self, status: broadcast::Sender<LinkEvent>) -> Self {
        self.status = Some(status);
        self
    }

    /// Run sessions until quit.
    ///
    /// # Errors
    ///
    /// Only if a socket cannot be created at all; the caller should exit.
    pub async fn run(self, mut intents: mpsc::Receiver<PageIntent>) -> Result<SupervisorSummary> {
        let mut summary = SupervisorSummary::default();
        let mut delay = self.config.reconnect_delay;

        while !self.control.is_quit() {
            self.control.clear_reconnect();
            summary.attempts += 1;

            let mut session = Session::new(
                self.config.clone(),
                self.control.clone(),
                self.events.clone(),
            );
            if let Some(status) = &self.status {
                session = session.with_status(status.clone());
            }
            let outcome = session.run(&mut intents).await?;

            summary.pages_sent += outcome.pages_sent;
            if outcome.reached_active() {
                summary.logins += 1;
                delay = self.config.reconnect_delay;
            }

            if self.control.is_quit() {
                break;
            }
            if !self.control.is_reconnect() {
                tracing::warn!("Session ended without a stop request");
            }

            match &outcome.error {
                Some(e) => tracing::info!("Session ended: {}. Reconnecting in {:?}", e, delay),
                None => tracing::info!("Session ended. Reconnecting in {:?}", delay),
            }

            if let Some(status) = &self.status {
                let _ = status.send(LinkEvent::Reconnecting(delay));
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.control.quit_requested() => break,
            }

            if !outcome.reached_active() {
                delay = self.next_delay(delay);
            }
            tracing::info!("Reconnecting...");
        }

        tracing::info!(
            attempts = summary.attempts,
            logins = summary.logins,
            pages_sent = summary.pages_sent,
            "Supervisor stopped"
        );
        Ok(summary)
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let multiplier = self.config.backoff_multiplier.max(1);
        current
            .saturating_mul(multiplier)
            .min(self.config.max_reconnect_delay.max(self.config.reconnect_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientBuilder;
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    fn supervisor(builder: ClientBuilder, control: &ControlFlags) -> Supervisor {
        let (events, _) = broadcast::channel(16);
        Supervisor::new(Arc::new(builder.config()), control.clone(), events)
    }

    async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_fixed_delay_by_default() {
        let control = ControlFlags::new();
        let sup = supervisor(ClientBuilder::new("127.0.0.1"), &control);

        let delay = Duration::from_secs(5);
        assert_eq!(sup.next_delay(delay), delay);
    }

    #[test]
    fn test_backoff_is_capped() {
        let control = ControlFlags::new();
        let sup = supervisor(
            ClientBuilder::new("127.0.0.1")
                .reconnect_delay(Duration::from_secs(5))
                .backoff_multiplier(2)
                .max_reconnect_delay(Duration::from_secs(30)),
            &control,
        );

        let mut delay = Duration::from_secs(5);
        let mut seen = Vec::new();
        for _ in 0..5 {
            delay = sup.next_delay(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![10, 20, 30, 30, 30]);
    }

    #[tokio::test]
    async fn test_quit_before_start_runs_nothing() {
        let control = ControlFlags::new();
        control.request_quit();
        let (_tx, rx) = mpsc::channel(1);

        let summary = supervisor(ClientBuilder::new("127.0.0.1"), &control)
            .run(rx)
            .await
            .unwrap();

        assert_eq!(summary.attempts, 0);
    }

    #[tokio::test]
    async fn test_retries_unreachable_until_quit() {
        let port = unused_port().await;
        let control = ControlFlags::new();
        let (_tx, rx) = mpsc::channel(1);

        let sup = supervisor(
            ClientBuilder::new("127.0.0.1")
                .port(port)
                .reconnect_delay(Duration::from_millis(50)),
            &control,
        );
        let task = tokio::spawn(sup.run(rx));

        tokio::time::sleep(Duration::from_millis(400)).await;
        control.request_quit();

        let summary = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(summary.attempts >= 2, "attempts = {}", summary.attempts);
        assert_eq!(summary.logins, 0);
    }

    #[tokio::test]
    async fn test_reports_connect_failure_and_retry() {
        let port = unused_port().await;
        let control = ControlFlags::new();
        let (_tx, rx) = mpsc::channel(1);
        let (status_tx, mut status_rx) = broadcast::channel(16);

        let sup = supervisor(
            ClientBuilder::new("127.0.0.1")
                .port(port)
                .reconnect_delay(Duration::from_secs(30)),
            &control,
        )
        .with_status(status_tx);
        let task = tokio::spawn(sup.run(rx));

        let first = tokio::time::timeout(Duration::from_secs(2), status_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, LinkEvent::ConnectFailed(_)));
        assert!(first.to_string().starts_with("Unable to connect to 127.0.0.1:"));

        let second = tokio::time::timeout(Duration::from_secs(2), status_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, LinkEvent::Reconnecting(Duration::from_secs(30)));

        control.request_quit();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_quit_cuts_backoff_short() {
        let port = unused_port().await;
        let control = ControlFlags::new();
        let (_tx, rx) = mpsc::channel(1);

        let sup = supervisor(
            ClientBuilder::new("127.0.0.1")
                .port(port)
                .reconnect_delay(Duration::from_secs(60)),
            &control,
        );
        let task = tokio::spawn(sup.run(rx));

        // Let the first attempt fail and the 60s wait begin
        tokio::time::sleep(Duration::from_millis(200)).await;
        let quit_at = Instant::now();
        control.request_quit();

        let summary = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(summary.attempts, 1);
        assert!(quit_at.elapsed() < Duration::from_secs(2));
    }
}
