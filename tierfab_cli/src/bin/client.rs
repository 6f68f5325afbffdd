//! Send one request to a Load Balancer's ingress socket.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::Parser;

use tierfab_cli::{exit_code, init_tracing, parse_value};
use tierfab_core::Request;
use tierfab_supervisor::{send_request, FabricConfig};

#[derive(Debug, Parser)]
#[command(name = "tierfab-client", version)]
struct Cli {
    /// Client id; picks the Reverse Proxy (`client_id mod count`)
    #[arg(allow_negative_numbers = true)]
    client_id: i32,

    /// Non-negative payload. Prompted on stdin when omitted
    #[arg(long, value_parser = parse_value)]
    value: Option<f32>,

    /// Load Balancer to send to
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i32).range(0..))]
    balancer: i32,

    /// Ingress socket path; overrides TIERFAB_INGRESS_PATH and --balancer
    #[arg(long)]
    ingress: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    exit_code(run(cli))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let value = match cli.value {
        Some(v) => v,
        None => prompt_value()?,
    };
    let path = match cli.ingress {
        Some(path) => path,
        None => FabricConfig::from_env()
            .context("invalid configuration")?
            .ingress_path_for(cli.balancer),
    };

    send_request(&path, &Request::new(cli.client_id, value))
        .with_context(|| format!("could not deliver request to {}", path.display()))?;
    tracing::info!(client_id = cli.client_id, value, path = %path.display(), "request sent");
    Ok(())
}

fn prompt_value() -> anyhow::Result<f32> {
    let mut stdout = io::stdout();
    write!(stdout, "Enter a value: ")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    parse_value(&line).map_err(|e| anyhow!("invalid value {:?}: {e}", line.trim()))
}
