//! `lrsn` - send pages through an LRSN transmitter from the command line.
//!
//! Connects to the transmitter, keeps the session alive across link loss,
//! and prompts for pages on stdin. Logs go to a file so they do not
//! interleave with the prompts.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use lrsn_client::console::Console;
use lrsn_client::control::ControlFlags;
use lrsn_client::protocol::LRSN_PORT;
use lrsn_client::ClientBuilder;

/// Stdin reads park a blocking thread until a line arrives; do not wait on
/// it at exit.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "lrsn", version, about = "Send pages through an LRSN paging transmitter")]
struct Args {
    /// Transmitter IP address or host name.
    #[arg(value_name = "IPADDRESS")]
    ipaddress: String,

    /// System id attached to every page request.
    #[arg(short = 's', long)]
    system_id: Option<u32>,

    /// Transmitter TCP port.
    #[arg(long, default_value_t = LRSN_PORT)]
    port: u16,

    /// Log file, appended to.
    #[arg(long, default_value = "lrsn.log")]
    log_file: PathBuf,

    /// Seconds to wait between reconnect attempts.
    #[arg(long, default_value_t = 5)]
    reconnect_delay: u64,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file, args.verbose)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let result = runtime.block_on(run(args));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let control = ControlFlags::new();

    let interrupt = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, quitting");
            interrupt.request_quit();
        }
    });

    let mut builder = ClientBuilder::new(args.ipaddress.as_str())
        .port(args.port)
        .reconnect_delay(Duration::from_secs(args.reconnect_delay))
        .control(control.clone());
    if let Some(system_id) = args.system_id {
        builder = builder.system_id(system_id);
    }

    tracing::info!(
        host = %args.ipaddress,
        port = args.port,
        system_id = ?args.system_id,
        "Starting LRSN client"
    );
    let client = builder.start();

    let console = Console::new(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        control.clone(),
        client.pages(),
    )
    .with_status(client.status());
    let console_control = control.clone();
    tokio::spawn(async move {
        if let Err(e) = console.run().await {
            tracing::error!("Console error: {}", e);
            console_control.request_quit();
        }
    });

    let summary = client
        .wait_for_shutdown()
        .await
        .with_context(|| format!("LRSN client for {}:{} failed", args.ipaddress, args.port))?;

    tracing::info!(
        attempts = summary.attempts,
        pages_sent = summary.pages_sent,
        "Exiting"
    );
    Ok(())
}

fn init_logging(path: &Path, verbose: bool) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
