//! rate-limit — active-response entry point
//!
//! stdin carries the event (and the handshake response), stdout carries the
//! handshake request. Diagnostics go to stderr; the audit trail goes to the
//! configured log file.

use anyhow::{Context, Result};
use std::io;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use ar_rate_limit::config::{self, Config};
use ar_rate_limit::firewall::iptables::IptablesBackend;
use ar_rate_limit::input::{ChannelLines, LineSource, StreamLines};
use ar_rate_limit::sink::FileLogSink;
use ar_rate_limit::{run, Options};

fn main() -> ExitCode {
    let config = match setup() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: rate-limit failed to start: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let options = Options::from(&config);
    let backend = IptablesBackend::new(&config.firewall.binary);
    let sink = FileLogSink::new(&config.log.file);
    let mut stdout = io::stdout().lock();

    // The stdin reader thread is only needed to bound the handshake wait
    let mut input: Box<dyn LineSource> = if options.handshake_timeout.is_some() {
        Box::new(ChannelLines::spawn(io::BufReader::new(io::stdin())))
    } else {
        Box::new(StreamLines::new(io::stdin().lock()))
    };

    ExitCode::from(run(&mut input, &mut stdout, &backend, &sink, &options))
}

fn setup() -> Result<Config> {
    let config = config::load_config()?;
    init_logging(&config.log.level)?;
    tracing::debug!("Loaded configuration: {config:?}");
    Ok(config)
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    // stdout belongs to the orchestrator
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}
