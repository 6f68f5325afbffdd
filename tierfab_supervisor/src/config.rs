//! Runtime configuration, read from the environment.
//!
//! Children inherit the environment of the process that spawned them, so one
//! export at the root configures the whole tree consistently.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

use tierfab_core::{Role, Topology};

pub const ENV_INGRESS_PATH: &str = "TIERFAB_INGRESS_PATH";
pub const ENV_BIN_DIR: &str = "TIERFAB_BIN_DIR";
pub const ENV_LOAD_BALANCERS: &str = "TIERFAB_LOAD_BALANCERS";
pub const ENV_REVERSE_PROXIES: &str = "TIERFAB_REVERSE_PROXIES";
pub const ENV_WORKERS: &str = "TIERFAB_WORKERS";

pub const DEFAULT_INGRESS_PATH: &str = "/tmp/cl-lb";

pub const LOAD_BALANCER_BIN: &str = "tierfab-load-balancer";
pub const REVERSE_PROXY_BIN: &str = "tierfab-reverse-proxy";
pub const WORKER_BIN: &str = "tierfab-worker";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("cannot locate executable directory: {0}")]
    BinDir(#[source] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct FabricConfig {
    /// Ingress socket of Load Balancer 0; others derive from it.
    pub ingress_path: PathBuf,
    /// Directory holding the tier executables.
    pub bin_dir: PathBuf,
    pub topology: Topology,
}

impl FabricConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Topology::default();
        let topology = Topology {
            load_balancers: fanout_env(ENV_LOAD_BALANCERS, defaults.load_balancers)?,
            reverse_proxies_per_balancer: fanout_env(
                ENV_REVERSE_PROXIES,
                defaults.reverse_proxies_per_balancer,
            )?,
            workers_per_proxy: fanout_env(ENV_WORKERS, defaults.workers_per_proxy)?,
        };
        let topology = check_topology(topology)?;

        let ingress_path = optional_env(ENV_INGRESS_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INGRESS_PATH));

        let bin_dir = match optional_env(ENV_BIN_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => current_exe_dir()?,
        };

        Ok(Self {
            ingress_path,
            bin_dir,
            topology,
        })
    }

    /// Ingress socket for Load Balancer `index`.
    ///
    /// Index 0 owns the well-known path; every other instance appends `-<index>`.
    pub fn ingress_path_for(&self, index: i32) -> PathBuf {
        if index == 0 {
            return self.ingress_path.clone();
        }
        let mut name = self.ingress_path.as_os_str().to_owned();
        name.push(format!("-{index}"));
        PathBuf::from(name)
    }

    /// Executable that plays `role`.
    pub fn program(&self, role: Role) -> PathBuf {
        let name = match role {
            Role::LoadBalancer => LOAD_BALANCER_BIN,
            Role::ReverseProxy => REVERSE_PROXY_BIN,
            Role::Worker => WORKER_BIN,
        };
        self.bin_dir.join(name)
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn fanout_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => parse_fanout(key, &raw),
    }
}

fn parse_fanout(key: &str, raw: &str) -> Result<usize, ConfigError> {
    let n: usize = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("must be a positive integer: {e}"),
    })?;
    if n == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    if n > i32::MAX as usize {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be at most {}", i32::MAX),
        });
    }
    Ok(n)
}

fn check_topology(topology: Topology) -> Result<Topology, ConfigError> {
    if !topology.fits_wire_index() {
        return Err(ConfigError::InvalidValue {
            key: format!("{ENV_LOAD_BALANCERS}/{ENV_REVERSE_PROXIES}/{ENV_WORKERS}"),
            message: format!("tree must hold at most {} workers", i32::MAX),
        });
    }
    Ok(topology)
}

fn current_exe_dir() -> Result<PathBuf, ConfigError> {
    let exe = env::current_exe().map_err(ConfigError::BinDir)?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FabricConfig {
        FabricConfig {
            ingress_path: PathBuf::from("/tmp/cl-lb"),
            bin_dir: PathBuf::from("/opt/tierfab/bin"),
            topology: Topology::default(),
        }
    }

    #[test]
    fn first_balancer_owns_well_known_path() {
        let cfg = config();
        assert_eq!(cfg.ingress_path_for(0), PathBuf::from("/tmp/cl-lb"));
        assert_eq!(cfg.ingress_path_for(2), PathBuf::from("/tmp/cl-lb-2"));
    }

    #[test]
    fn programs_resolve_in_bin_dir() {
        let cfg = config();
        assert_eq!(
            cfg.program(Role::Worker),
            PathBuf::from("/opt/tierfab/bin/tierfab-worker")
        );
    }

    #[test]
    fn fanout_must_be_positive() {
        assert_eq!(parse_fanout(ENV_WORKERS, " 4 ").unwrap(), 4);
        assert!(matches!(
            parse_fanout(ENV_WORKERS, "0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_fanout(ENV_WORKERS, "three"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_fanout(ENV_WORKERS, "3000000000"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn tree_must_fit_wire_index() {
        assert!(check_topology(Topology::default()).is_ok());

        let too_wide = Topology {
            load_balancers: 4,
            reverse_proxies_per_balancer: 100_000,
            workers_per_proxy: 100_000,
        };
        assert!(matches!(
            check_topology(too_wide),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
