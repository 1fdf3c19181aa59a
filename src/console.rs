//! Interactive page prompt.
//!
//! Asks for a pager number, a pager type and (for alphanumeric pagers) a
//! message, then queues the page on the client. Typing `quit` or closing the
//! input requests shutdown.
//!
//! When given a status feed, connect and login problems are printed between
//! prompts so the operator knows why pages are not going out.
//!
//! The console is generic over its input and output so it can be driven by
//! stdin/stdout in the binary and by in-memory streams in tests.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use crate::client::PageSender;
use crate::control::ControlFlags;
use crate::error::Result;
use crate::protocol::{PageIntent, PagerType};
use crate::session::LinkEvent;

/// Message sent to pagers that cannot display text.
pub const VIBE_MESSAGE: &str = "Vibe1";

const QUIT_COMMAND: &str = "quit";

const NUMBER_PROMPT: &str = "Type a page number or type quit: ";
const INVALID_NUMBER: &str = "Invalid number. Try again.";
const TYPE_PROMPT: &str = "Enter pager type by number (e.g. 0=>AlphaPager): ";
const INVALID_TYPE: &str = "Invalid pager type. Try again.";
const MESSAGE_PROMPT: &str = "Type a message: ";

/// Prompt loop feeding a [`PageSender`].
pub struct Console<R, W> {
    input: R,
    output: W,
    control: ControlFlags,
    pages: PageSender,
    status: Option<broadcast::Receiver<LinkEvent>>,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W, control: ControlFlags, pages: PageSender) -> Self {
        Self {
            input,
            output,
            control,
            pages,
            status: None,
        }
    }

    /// Print link status changes while waiting for input.
    pub fn with_status(mut self, status: broadcast::Receiver<LinkEvent>) -> Self {
        self.status = Some(status);
        self
    }

    /// Prompt until quit, end of input, or the client stops.
    ///
    /// # Errors
    ///
    /// Only if writing a prompt fails.
    pub async fn run(mut self) -> Result<()> {
        while let Some(intent) = self.prompt_page().await? {
            if self.pages.send_page(intent).await.is_err() {
                tracing::debug!("Client stopped; leaving console");
                return Ok(());
            }
        }
        Ok(())
    }

    /// Collect one page. `None` means stop prompting.
    async fn prompt_page(&mut self) -> Result<Option<PageIntent>> {
        let number = loop {
            let Some(line) = self.ask(NUMBER_PROMPT).await? else {
                return Ok(None);
            };
            if line.is_empty() {
                continue;
            }
            if line == QUIT_COMMAND {
                tracing::info!("Quit requested from console");
                self.control.request_quit();
                return Ok(None);
            }
            match line.parse::<u64>() {
                Ok(number) => break number,
                Err(_) => self.write_line(INVALID_NUMBER).await?,
            }
        };

        let pager_type = loop {
            let Some(line) = self.ask(TYPE_PROMPT).await? else {
                return Ok(None);
            };
            match line.parse::<PagerType>() {
                Ok(pager_type) => break pager_type,
                Err(_) => self.write_line(INVALID_TYPE).await?,
            }
        };

        let message = if pager_type.takes_text() {
            match self.ask(MESSAGE_PROMPT).await? {
                Some(message) => message,
                None => return Ok(None),
            }
        } else {
            VIBE_MESSAGE.to_string()
        };

        Ok(Some(PageIntent::new(pager_type, number, message)))
    }

    /// Write a prompt and read the trimmed reply. `None` on end of input or
    /// quit; end of input also requests quit.
    async fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        if self.control.is_quit() {
            return Ok(None);
        }
        self.output.write_all(prompt.as_bytes()).await?;
        self.output.flush().await?;

        let mut line = String::new();
        let read = {
            let Self {
                input,
                output,
                control,
                status,
                ..
            } = &mut *self;
            let read_line = input.read_line(&mut line);
            tokio::pin!(read_line);

            loop {
                tokio::select! {
                    read = &mut read_line => break read?,
                    _ = control.quit_requested() => return Ok(None),
                    event = next_status(status) => {
                        output
                            .write_all(format!("\n{}\n{}", event, prompt).as_bytes())
                            .await?;
                        output.flush().await?;
                    }
                }
            }
        };

        if read == 0 {
            tracing::info!("Console input closed, quitting");
            self.control.request_quit();
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.output.write_all(line.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }
}

/// Next status event; pends forever without a feed.
async fn next_status(status: &mut Option<broadcast::Receiver<LinkEvent>>) -> LinkEvent {
    loop {
        let Some(rx) = status.as_mut() else {
            return std::future::pending().await;
        };
        match rx.recv().await {
            Ok(event) => return event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => *status = None,
        }
    }
}
