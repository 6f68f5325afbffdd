use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use tierfab_cli::{exit_code, init_tracing, ChildArgs};
use tierfab_supervisor::{run_reverse_proxy, FabricConfig};

/// Reverse Proxy tier. Started by a Load Balancer.
#[derive(Debug, Parser)]
#[command(name = "tierfab-reverse-proxy", version)]
struct Cli {
    #[command(flatten)]
    child: ChildArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let span = tracing::info_span!("reverse_proxy", index = cli.child.index);
    let _enter = span.enter();
    exit_code(run(&cli.child))
}

fn run(args: &ChildArgs) -> anyhow::Result<()> {
    let cfg = FabricConfig::from_env().context("invalid configuration")?;
    let upward = args.upward()?;
    run_reverse_proxy(&cfg, args.index, upward).context("reverse proxy failed")
}
