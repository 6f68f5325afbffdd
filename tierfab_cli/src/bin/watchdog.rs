//! Root of the process tree.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use tierfab_cli::{exit_code, init_tracing};
use tierfab_supervisor::{run_watchdog, FabricConfig};

/// Spawn the Load Balancers and supervise the tree. SIGTSTP tears the whole tree
/// down; SIGTERM stops only this process.
#[derive(Debug, Parser)]
#[command(name = "tierfab-watchdog", version)]
struct Cli {}

fn main() -> ExitCode {
    let _cli = Cli::parse();
    init_tracing();

    let span = tracing::info_span!("watchdog", pid = std::process::id());
    let _enter = span.enter();
    exit_code(run())
}

fn run() -> anyhow::Result<()> {
    let cfg = FabricConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        load_balancers = cfg.topology.load_balancers,
        reverse_proxies = cfg.topology.reverse_proxies_per_balancer,
        workers = cfg.topology.workers_per_proxy,
        bin_dir = %cfg.bin_dir.display(),
        "starting tree"
    );
    run_watchdog(&cfg).context("watchdog failed")
}
