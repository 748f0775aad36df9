//! serial-snoop - Serial port sniffer and bridge
//!
//! This binary drives the bridge engine from the command line:
//! - `ports` lists the serial ports on this machine
//! - `bridge` relays between two ports (plus an optional mirror) and prints
//!   every relayed frame until Ctrl-C or a fatal fault

mod console;
mod crash;
mod sink;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use serial_snoop_bridge::{
    default_save_file_name, list_ports, BridgeConfig, DiagnosticsLogger, EndpointConfig,
    EventForwarder, Handshake, LogHistory, Parity, RelayFileLogger, SerialBridge,
    SerialTransportOpener, StopBits, DEFAULT_BAUD_RATE, DEFAULT_DATA_BITS,
    DEFAULT_DIAGNOSTICS_PATH, DEFAULT_QUEUE_CAPACITY,
};

use console::{ports_status, running_status, stopped_status};
use sink::SessionSink;

#[derive(Parser, Debug)]
#[command(name = "serial-snoop")]
#[command(about = "Bridge two serial ports and watch the traffic between them")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports
    Ports {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Relay between two ports until interrupted
    Bridge(BridgeArgs),
}

#[derive(Args, Debug)]
struct BridgeArgs {
    /// Upstream port (its traffic is logged as TX)
    #[arg(long, short)]
    upstream: String,

    /// Downstream port (its traffic is logged as RX)
    #[arg(long, short)]
    downstream: String,

    /// Optional port that receives a copy of all traffic
    #[arg(long, short)]
    mirror: Option<String>,

    /// Baud rate for every port
    #[arg(long, short, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Data bits (5-8)
    #[arg(long, default_value_t = DEFAULT_DATA_BITS)]
    data_bits: u8,

    /// Parity: none, odd, even, mark, space
    #[arg(long, default_value = "none")]
    parity: Parity,

    /// Stop bits: 1, 1.5, 2
    #[arg(long, default_value = "1")]
    stop_bits: StopBits,

    /// Flow control: none, xonxoff, rts, rts-xonxoff
    #[arg(long, default_value = "none")]
    handshake: Handshake,

    /// Assert DTR after opening
    #[arg(long)]
    dtr: bool,

    /// Assert RTS after opening
    #[arg(long)]
    rts: bool,

    /// Append relay-log lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Diagnostics log file
    #[arg(long, default_value = DEFAULT_DIAGNOSTICS_PATH)]
    diagnostics_log: PathBuf,

    /// Write at most one diagnostics line per interval ("0s" logs every read)
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    diagnostics_interval: Duration,

    /// Save the session's log history here on exit (file or directory)
    #[arg(long)]
    save_on_exit: Option<PathBuf>,

    /// Do not print relayed frames
    #[arg(long, short)]
    quiet: bool,

    /// Frames buffered per direction before dropping
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Per-write deadline (e.g. "2s", "500ms")
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    write_timeout: Duration,

    /// Pause after a read that returned no data
    #[arg(long, default_value = "10ms", value_parser = humantime::parse_duration)]
    idle_backoff: Duration,
}

impl BridgeArgs {
    fn endpoint(&self, port: &str) -> EndpointConfig {
        EndpointConfig::new(port)
            .with_baud_rate(self.baud)
            .with_data_bits(self.data_bits)
            .with_parity(self.parity)
            .with_stop_bits(self.stop_bits)
            .with_handshake(self.handshake)
            .with_lines(self.dtr, self.rts)
    }

    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig::default()
            .with_queue_capacity(self.queue_capacity)
            .with_write_timeout(self.write_timeout)
            .with_idle_read_backoff(self.idle_backoff)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    crash::install();

    // Initialize logging; RUST_LOG overrides the default level
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Ports { json } => run_ports(json),
        Command::Bridge(args) => run_bridge(args).await,
    }
}

fn run_ports(json: bool) -> anyhow::Result<ExitCode> {
    let ports = list_ports().context("Error listing ports")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
    } else {
        for port in &ports {
            println!("{}", port);
        }
        eprintln!("{}", ports_status(ports.len()));
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_bridge(args: BridgeArgs) -> anyhow::Result<ExitCode> {
    let upstream = args.endpoint(&args.upstream);
    let downstream = args.endpoint(&args.downstream);
    let mirror = args.mirror.as_deref().map(|port| args.endpoint(port));

    let diagnostics = DiagnosticsLogger::open(&args.diagnostics_log)
        .with_context(|| {
            format!(
                "Failed to open diagnostics log {}",
                args.diagnostics_log.display()
            )
        })?
        .with_min_interval(args.diagnostics_interval);
    let mut sink = SessionSink::new().with_diagnostics(diagnostics);

    if !args.quiet {
        sink = sink.with_console(Box::new(BufWriter::new(std::io::stdout())));
    }
    if let Some(path) = &args.log_file {
        let logger = RelayFileLogger::open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        sink = sink.with_relay_log(logger);
    }
    let history = args.save_on_exit.as_ref().map(|_| Arc::new(LogHistory::new()));
    if let Some(history) = &history {
        sink = sink.with_history(history.clone());
    }

    // The engine only feeds the channel; all output happens in the sink
    let (forwarder, events) = EventForwarder::channel();
    let bridge = SerialBridge::with_config(
        Arc::new(SerialTransportOpener),
        Arc::new(forwarder.with_diagnostics(true)),
        args.bridge_config(),
    );

    let status = running_status(&upstream, &downstream, mirror.as_ref());
    if let Err(e) = bridge.start(upstream, downstream, mirror).await {
        eprintln!("Start failed: {}", e);
        return Ok(ExitCode::FAILURE);
    }
    eprintln!("{}", status);

    let mut drained = tokio::task::spawn_blocking(move || sink.drain(events));
    let mut stop_requested = false;
    let fault = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !stop_requested => {
                match signal {
                    Ok(()) => info!("Interrupted"),
                    Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C; stopping"),
                }
                stop_requested = true;
                bridge.stop();
            }
            fault = &mut drained => break fault.context("Event sink failed")?,
        }
    };

    if let (Some(history), Some(target)) = (&history, &args.save_on_exit) {
        let path = save_target(target);
        match history.save_as(&path) {
            Ok(lines) => eprintln!("Saved log to {} ({} lines)", path.display(), lines),
            Err(e) => eprintln!("Save failed: {}", e),
        }
    }

    let stats = bridge.stats();
    info!(%stats, "Session totals");
    eprintln!("{}", stopped_status(fault.as_ref().map(|f| f.message.as_str())));

    Ok(if fault.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// A directory target gets a timestamped file name inside it
fn save_target(target: &Path) -> PathBuf {
    if target.is_dir() {
        target.join(default_save_file_name(chrono::Local::now().naive_local()))
    } else {
        target.to_path_buf()
    }
}
