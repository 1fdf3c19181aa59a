//! Session state machine.
//!
//! One [`Session`] is one connect-login-active-close attempt:
//!
//! ```text
//! Connecting ─► LoggingIn ─► Active ─► Draining ─► Closed
//!      │             │                                ▲
//!      └─────────────┴────────────────────────────────┘
//! ```
//!
//! Failures never escape as errors (except being unable to create a socket
//! at all). Instead the session logs them, sets `reconnect` on the shared
//! [`ControlFlags`], and reports how far it got in a [`SessionOutcome`].
//!
//! While active, two paths share the socket:
//! - the listener task owns the read half (framing, decoding, watchdog)
//! - the foreground path assigns sequence ids to page intents and hands the
//!   encoded lines to the writer task, which owns the write half
//!
//! Teardown always joins the listener before the write half is released, so
//! the socket is never closed under a pending read.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};

use crate::client::ClientConfig;
use crate::codec::XmlCodec;
use crate::control::ControlFlags;
use crate::error::{LrsnError, Result};
use crate::listener::{Listener, ListenerExit};
use crate::protocol::{
    attrs, LineBuffer, LoginRequest, Message, MessageKind, PageIntent, PageRequest, LOGIN_SUCCESS,
};
use crate::transport::{self, FramedReader, ReadOutcome};
use crate::writer::{spawn_writer_task, write_with_timeout, WriterHandle};

/// Capacity of the listener → session message channel.
const MESSAGE_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Opening the TCP connection.
    Connecting,
    /// Greeting, `Login`, `LoginAck`.
    LoggingIn,
    /// Listener running, page requests accepted.
    Active,
    /// Stopping the listener and writer.
    Draining,
    /// Terminal for this attempt.
    Closed,
}

/// How a session attempt ended.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Furthest state reached before teardown.
    pub reached: SessionState,
    /// Page requests handed to the writer.
    pub pages_sent: u64,
    /// Why the session ended; `None` only if it was stopped from outside
    /// by a reconnect request.
    pub error: Option<LrsnError>,
}

impl SessionOutcome {
    fn new() -> Self {
        Self {
            reached: SessionState::Connecting,
            pages_sent: 0,
            error: None,
        }
    }

    /// Whether the login succeeded.
    pub fn reached_active(&self) -> bool {
        self.reached >= SessionState::Active
    }
}

/// Link status changes, for showing the operator what the client is doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The transmitter could not be reached.
    ConnectFailed(String),
    /// Login was rejected or the handshake failed.
    LoginFailed(String),
    /// Logged in; page requests are being sent.
    Active,
    /// An active session ended.
    Lost(String),
    /// Waiting before the next attempt.
    Reconnecting(Duration),
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEvent::ConnectFailed(reason) => write!(f, "{}", reason),
            LinkEvent::LoginFailed(reason) => write!(f, "Cannot log in ({}). Retrying...", reason),
            LinkEvent::Active => write!(f, "Logged in to transmitter"),
            LinkEvent::Lost(reason) => write!(f, "Connection lost: {}", reason),
            LinkEvent::Reconnecting(delay) => write!(f, "Reconnecting in {:?}...", delay),
        }
    }
}

/// Page request sequence ids: 1, 2, 3, ... within one session.
#[derive(Debug)]
pub struct PageSequence {
    next: u64,
}

impl PageSequence {
    /// Start a fresh sequence at 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Take the next id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Id the next request will get.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for PageSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// One connection attempt against the transmitter.
pub struct Session {
    config: Arc<ClientConfig>,
    control: ControlFlags,
    events: broadcast::Sender<Message>,
    status: Option<broadcast::Sender<LinkEvent>>,
    state: SessionState,
    logged_in: bool,
    sequence: PageSequence,
    outcome: SessionOutcome,
}

impl Session {
    /// Create a session. Messages received while active are published on
    /// `events`.
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
            state: SessionState::Connecting,
            logged_in: false,
            sequence: PageSequence::new(),
            outcome: SessionOutcome::new(),
        }
    }

    /// Publish [`LinkEvent`]s on `status`.
    pub fn with_status(mut self, status: broadcast::Sender<LinkEvent>) -> Self {
        self.status = Some(status);
        self
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connect to the configured transmitter and run the session to
    /// completion.
    ///
    /// # Errors
    ///
    /// Only [`LrsnError::Socket`]: the local socket could not be created.
    /// Every other failure is reported in the outcome with `reconnect` set.
    pub async fn run(
        self,
        intents: &mut mpsc::Receiver<PageIntent>,
    ) -> Result<SessionOutcome> {
        let host = self.config.host.clone();
        let port = self.config.port;
        tracing::info!("Connecting to {}:{}", host, port);

        match transport::connect(&host, port, self.config.connect_timeout).await {
            Ok(stream) => {
                tracing::info!("Connected to {}:{}", host, port);
                Ok(self.run_on(stream, intents).await)
            }
            Err(e @ LrsnError::Socket(_)) => {
                tracing::error!("{}", e);
                Err(e)
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.notify(LinkEvent::ConnectFailed(e.to_string()));
                if !self.control.request_reconnect() {
                    tracing::debug!("Quit already requested; not reconnecting");
                }
                Ok(self.close(Some(e)))
            }
        }
    }

    /// Run the session over an already-connected stream.
    pub async fn run_on<S>(
        mut self,
        stream: S,
        intents: &mut mpsc::Receiver<PageIntent>,
    ) -> SessionOutcome
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);

        let mut reader = FramedReader::with_buffer(
            read_half,
            LineBuffer::with_max_line_length(self.config.max_line_length),
        )
        .with_poll_interval(self.config.poll_interval)
        .with_control(self.control.clone());

        self.transition(SessionState::LoggingIn);
        if let Err(e) = self.login(&mut reader, &mut write_half).await {
            match e {
                LrsnError::UserQuit => tracing::info!("Quit during login"),
                ref e => {
                    tracing::error!("Unable to log in: {}. Retrying...", e);
                    self.notify(LinkEvent::LoginFailed(e.to_string()));
                    self.control.request_reconnect();
                }
            }
            return self.close(Some(e));
        }

        self.logged_in = true;
        self.transition(SessionState::Active);
        self.notify(LinkEvent::Active);

        let (messages_tx, mut messages_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let mut listener = Listener::new(
            reader,
            self.control.clone(),
            messages_tx,
            self.config.read_timeout,
        )
        .spawn();
        let (writer, writer_task) =
            spawn_writer_task(write_half, self.config.writer.clone(), self.control.clone());

        let finished = self
            .foreground(&writer, intents, &mut messages_rx, &mut listener)
            .await;

        self.transition(SessionState::Draining);
        drop(messages_rx);
        self.drain(listener, finished, writer, writer_task).await;

        let error = self.outcome.error.take();
        match &error {
            Some(LrsnError::UserQuit) => {}
            Some(e) => self.notify(LinkEvent::Lost(e.to_string())),
            None => self.notify(LinkEvent::Lost("reconnect requested".to_string())),
        }
        self.close(error)
    }

    /// Greeting, login request, login acknowledgment.
    async fn login<R, W>(&mut self, reader: &mut FramedReader<R>, writer: &mut W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let read_timeout = self.config.read_timeout;

        // The greeting is informational only
        match self.expect_line(reader, read_timeout).await? {
            Some(greeting) => {
                if greeting.kind() != MessageKind::Greeting {
                    tracing::warn!("Expected <LRSN> greeting, got <{}>", greeting.tag());
                }
                tracing::info!(
                    device = greeting.attr(attrs::DEVICE).unwrap_or("?"),
                    swver = greeting.attr(attrs::SWVER).unwrap_or("?"),
                    serno = greeting.attr(attrs::SERNO).unwrap_or("?"),
                    "Got: {}",
                    greeting
                );
            }
            None => tracing::warn!("No greeting from transmitter within {:?}", read_timeout),
        }

        let login = LoginRequest::new(self.config.services.clone());
        write_with_timeout(writer, &login.encode(), self.config.writer.write_timeout)
            .await
            .map_err(LrsnError::Send)?;
        tracing::debug!("Sent login for services {}", login.services);

        let ack = self
            .expect_line(reader, read_timeout)
            .await?
            .ok_or_else(|| LrsnError::Login(format!("no LoginAck within {:?}", read_timeout)))?;
        tracing::info!("Got: {}", ack);

        check_login_ack(&ack)?;
        tracing::info!("Logged in to {}:{}", self.config.host, self.config.port);
        Ok(())
    }

    /// Read and decode one line during the handshake. `None` on timeout.
    async fn expect_line<R>(
        &self,
        reader: &mut FramedReader<R>,
        max_wait: Duration,
    ) -> Result<Option<Message>>
    where
        R: AsyncRead + Unpin,
    {
        match reader.read_message(max_wait).await? {
            ReadOutcome::Line(line) => XmlCodec::decode(&line).map(Some),
            ReadOutcome::Timeout => Ok(None),
            ReadOutcome::Closed => Err(LrsnError::ConnectionClosed),
            ReadOutcome::Cancelled if self.control.is_quit() => Err(LrsnError::UserQuit),
            ReadOutcome::Cancelled => Err(LrsnError::ConnectionClosed),
        }
    }

    /// Accept page intents until quit or reconnect, or until the listener
    /// ends on its own. Returns the listener's result in the latter case.
    async fn foreground(
        &mut self,
        writer: &WriterHandle,
        intents: &mut mpsc::Receiver<PageIntent>,
        messages: &mut mpsc::Receiver<Message>,
        listener: &mut JoinHandle<ListenerExit>,
    ) -> Option<std::result::Result<ListenerExit, JoinError>> {
        let control = self.control.clone();
        loop {
            tokio::select! {
                biased;

                _ = control.stopped() => return None,

                // A listener that died without setting a flag would leave
                // the link unwatched
                joined = &mut *listener => {
                    if let Err(e) = &joined {
                        tracing::error!("Listener task failed: {}. Attempting to reconnect.", e);
                    }
                    control.request_reconnect();
                    return Some(joined);
                }

                intent = intents.recv() => match intent {
                    Some(intent) => self.submit(writer, intent).await,
                    None => {
                        tracing::info!("Page input closed, quitting");
                        control.request_quit();
                        return None;
                    }
                },

                Some(message) = messages.recv() => {
                    // No subscribers is fine
                    let _ = self.events.send(message);
                }
            }
        }
    }

    /// Assign a sequence id, encode, and queue one page request.
    async fn submit(&mut self, writer: &WriterHandle, intent: PageIntent) {
        let id = self.sequence.next_id();
        let request = PageRequest::from_intent(id, intent, self.config.system_id);

        tracing::info!(id, pager = %request.pager(), "Sending PageRequest");

        match writer.send(request.encode()).await {
            Ok(()) => self.outcome.pages_sent += 1,
            Err(e) => {
                tracing::error!("Unable to send PageRequest {}: {}. Attempting to reconnect.", id, e);
                self.control.request_reconnect();
                self.outcome.error.get_or_insert(e);
            }
        }
    }

    /// Stop the listener, then the writer. Flags are already set.
    ///
    /// `finished` is the listener's result if it was already joined.
    async fn drain(
        &mut self,
        mut listener: JoinHandle<ListenerExit>,
        finished: Option<std::result::Result<ListenerExit, JoinError>>,
        writer: WriterHandle,
        mut writer_task: JoinHandle<Result<()>>,
    ) {
        let join_timeout = self.config.join_timeout;

        let joined = match finished {
            Some(joined) => Some(joined),
            None => match tokio::time::timeout(join_timeout, &mut listener).await {
                Ok(joined) => Some(joined),
                Err(_) => {
                    tracing::warn!("Listener did not stop within {:?}; aborting", join_timeout);
                    listener.abort();
                    let _ = listener.await;
                    None
                }
            },
        };
        let error = match joined {
            Some(Ok(exit)) => exit.into_error(),
            Some(Err(e)) => Some(LrsnError::TaskFailed(format!("listener: {}", e))),
            None => None,
        };
        if let Some(error) = error {
            self.outcome.error.get_or_insert(error);
        }

        drop(writer);
        match tokio::time::timeout(join_timeout, &mut writer_task).await {
            Ok(Ok(Err(e))) => {
                self.outcome.error.get_or_insert(e);
            }
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("Writer did not stop within {:?}; aborting", join_timeout);
                writer_task.abort();
                let _ = writer_task.await;
            }
        }

        if self.control.is_quit() && self.outcome.error.is_none() {
            self.outcome.error = Some(LrsnError::UserQuit);
        }
    }

    fn notify(&self, event: LinkEvent) {
        if let Some(status) = &self.status {
            // No subscribers is fine
            let _ = status.send(event);
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
        if next > self.outcome.reached && next <= SessionState::Active {
            self.outcome.reached = next;
        }
    }

    fn close(mut self, error: Option<LrsnError>) -> SessionOutcome {
        self.transition(SessionState::Closed);
        if self.logged_in {
            tracing::info!(
                "Session closed after {} page request(s)",
                self.sequence.peek() - 1
            );
        }
        let mut outcome = self.outcome;
        outcome.error = error;
        outcome
    }
}

/// Validate a `LoginAck`. Only `ret="0"` is success; every other code is
/// treated the same.
fn check_login_ack(ack: &Message) -> Result<()> {
    if ack.kind() != MessageKind::LoginAck {
        return Err(LrsnError::Login(format!("expected <LoginAck>, got <{}>", ack.tag())));
    }

    let ret: i64 = ack
        .attr_parse(attrs::RET)
        .map_err(|e| LrsnError::Login(format!("malformed LoginAck: {}", e)))?;

    if ret != LOGIN_SUCCESS {
        return Err(LrsnError::Login(format!("transmitter returned {}", ret)));
    }
    Ok(())
}
