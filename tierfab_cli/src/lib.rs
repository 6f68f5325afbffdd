//! Shared plumbing for the tierfab executables: logging setup, the two-argument
//! child contract, and exit-code mapping.

use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use tracing_subscriber::EnvFilter;

use tierfab_supervisor::Channel;

/// Log to stderr, filtered by `RUST_LOG` (default `info`). Colour only on a terminal.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

/// Positional arguments every spawned tier receives from its parent.
#[derive(Debug, Clone, Args)]
pub struct ChildArgs {
    /// Global index assigned by the parent
    #[arg(value_parser = clap::value_parser!(i32).range(0..))]
    pub index: i32,

    /// Inherited channel descriptor
    pub fd: i32,
}

impl ChildArgs {
    /// Take ownership of the inherited channel end.
    pub fn upward(&self) -> anyhow::Result<Channel> {
        Channel::from_inherited(self.fd)
            .with_context(|| format!("cannot adopt channel descriptor {}", self.fd))
    }
}

/// Validate a request payload: finite and non-negative.
pub fn parse_value(raw: &str) -> Result<f32, String> {
    let value: f32 = raw
        .trim()
        .parse()
        .map_err(|e| format!("not a number: {e}"))?;
    if !value.is_finite() {
        return Err("must be finite".to_string());
    }
    if value < 0.0 {
        return Err("must not be negative".to_string());
    }
    Ok(value)
}

/// Log a fatal error and map the outcome to a process exit code.
pub fn exit_code(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct ChildCli {
        #[command(flatten)]
        child: ChildArgs,
    }

    #[test]
    fn child_contract_is_two_positionals() {
        let p = ChildCli::try_parse_from(["tier", "4", "7"]).unwrap();
        assert_eq!(p.child.index, 4);
        assert_eq!(p.child.fd, 7);

        assert!(ChildCli::try_parse_from(["tier", "4"]).is_err());
        assert!(ChildCli::try_parse_from(["tier", "4", "7", "9"]).is_err());
        assert!(ChildCli::try_parse_from(["tier", "--", "-1", "7"]).is_err());
    }

    #[test]
    fn payload_must_be_non_negative() {
        assert_eq!(parse_value(" 2.25\n"), Ok(2.25));
        assert_eq!(parse_value("0"), Ok(0.0));
        assert!(parse_value("-1").is_err());
        assert!(parse_value("abc").is_err());
        assert!(parse_value("NaN").is_err());
    }
}
