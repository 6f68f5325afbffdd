//! Process-level errors. Anything returned from a tier's `run` entry point is
//! fatal to that process.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::signals::SignalError;
use crate::spawn::SpawnError;

#[derive(Debug, Error)]
pub enum FabricError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Ingress socket could not be bound or put into listening state.
    #[error("failed to bind ingress socket {path}: {source}")]
    Bind { path: PathBuf, source: io::Error },

    #[error("failed to connect to {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },

    #[error("readiness wait failed: {0}")]
    Poll(#[source] Errno),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        source: io::Error,
    },
}
