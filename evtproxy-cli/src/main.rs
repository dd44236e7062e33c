//! evtproxy - launch a program and forward intercepted bus messages to it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use evtproxy::{BusLayout, DatagramBus, LaunchSpec, ProxyLoop, ShutdownReason};
use tracing_subscriber::EnvFilter;

/// Exit status for unrecoverable setup or launch failures.
const FATAL_EXIT: u8 = 255;
/// Exit status for invalid invocations.
const USAGE_EXIT: u8 = 1;

/// Message-forwarding proxy front for another program.
#[derive(Parser, Debug)]
#[command(name = "evtproxy", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Print each forwarded event's identity tag
    #[arg(short = 'v')]
    verbose: bool,

    /// Path of the program to launch
    path: PathBuf,
}

fn print_usage() {
    println!("Usage: evtproxy [-v] <path>");
    println!();
    println!("Options: -v : Verbose");
    println!();
    println!("  Starts the program at <path> and forwards all bus events sent to the");
    println!("  current process to the launched program, relaying replies back.");
    println!("  The launched program inherits the bus directory via EVTPROXY_BUS_DIR;");
    println!("  when a first event is pending at launch it is handed over in the file");
    println!("  named by EVTPROXY_STARTUP_EVENT.");
}

fn init_tracing() {
    // Diagnostics go to stderr only; stdout is reserved for usage text and
    // the verbose per-forward line.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false)
        .init();
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(_) => {
            print_usage();
            return ExitCode::from(USAGE_EXIT);
        }
    };

    init_tracing();

    match run(cli) {
        Ok(reason) => {
            tracing::debug!(?reason, "proxy finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("evtproxy: {e:#}");
            ExitCode::from(FATAL_EXIT)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ShutdownReason> {
    let spec = LaunchSpec::resolve(&cli.path)
        .with_context(|| format!("could not resolve '{}'", cli.path.display()))?;

    // One event loop dispatches both messages and liveness ticks, so the
    // whole proxy runs on a single thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("could not build the event loop")?;

    runtime.block_on(async {
        let bus = DatagramBus::join(BusLayout::from_env())
            .context("could not join the message bus")?;
        let proxy = ProxyLoop::standard(Arc::new(bus), spec, cli.verbose);
        let reason = proxy.run().await?;
        Ok(reason)
    })
}
