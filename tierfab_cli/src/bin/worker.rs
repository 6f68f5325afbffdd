use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use tierfab_cli::{exit_code, init_tracing, ChildArgs};
use tierfab_supervisor::run_worker;

/// Worker leaf. Started by a Reverse Proxy.
#[derive(Debug, Parser)]
#[command(name = "tierfab-worker", version)]
struct Cli {
    #[command(flatten)]
    child: ChildArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let span = tracing::info_span!("worker", index = cli.child.index);
    let _enter = span.enter();
    exit_code(run(&cli.child))
}

fn run(args: &ChildArgs) -> anyhow::Result<()> {
    let upward = args.upward()?;
    run_worker(args.index, upward).context("worker failed")
}
