//! Watchdog tier: root of the tree.
//!
//! Spawns the Load Balancers, collects every identity report that reaches it, and
//! is the only process that can take the whole tree down (SIGTSTP). SIGTERM only
//! stops the Watchdog itself.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, error, info, warn};

use tierfab_core::{IdentityFrame, IdentityRegistry, RecordOutcome, Role, Topology};

use crate::config::FabricConfig;
use crate::error::FabricError;
use crate::signals::SignalPipe;
use crate::spawn::{spawn_children, SpawnSpec};
use crate::supervisor::{Flow, Links, Supervisor, Tier};

/// Global index the root passes as parent index to its own children.
const ROOT_INDEX: i32 = 0;

#[derive(Debug)]
pub struct Watchdog {
    registry: IdentityRegistry,
}

impl Watchdog {
    pub fn new(topology: &Topology) -> Self {
        Self {
            registry: IdentityRegistry::new(topology),
        }
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut IdentityRegistry {
        &mut self.registry
    }

    /// Send SIGTERM to every recorded pid, children first. Returns how many
    /// signals were delivered.
    pub fn tear_down_tree(&self) -> usize {
        match serde_json::to_string(&self.registry.snapshot()) {
            Ok(json) => info!(registry = %json, "tearing down tree"),
            Err(e) => warn!(error = %e, "could not serialize registry snapshot"),
        }

        let mut sent = 0;
        for target in self.registry.shutdown_order() {
            match kill(Pid::from_raw(target.pid), Signal::SIGTERM) {
                Ok(()) => {
                    sent += 1;
                    debug!(role = %target.role, index = target.index, pid = target.pid, "terminated");
                }
                Err(e) => warn!(
                    role = %target.role,
                    index = target.index,
                    pid = target.pid,
                    error = %e,
                    "could not signal process"
                ),
            }
        }
        info!(sent, "termination signals sent");
        sent
    }
}

impl Tier for Watchdog {
    fn name(&self) -> &'static str {
        "watchdog"
    }

    fn on_identity(&mut self, slot: usize, frame: IdentityFrame, _links: &mut Links) {
        let report = match frame.decode() {
            Ok(report) => report,
            Err(e) => {
                warn!(slot, error = %e, "malformed identity report ignored");
                return;
            }
        };
        match self.registry.record(&report) {
            RecordOutcome::Recorded { .. } => info!(
                role = %report.role,
                index = report.index,
                pid = report.pid,
                "{} {} informed their pid {}",
                report.role,
                report.index,
                report.pid
            ),
            RecordOutcome::OutOfRange => warn!(
                role = %report.role,
                index = report.index,
                capacity = self.registry.capacity(report.role),
                "identity report index out of range; ignored"
            ),
        }
    }

    fn on_signal(&mut self, signal: Signal, _links: &mut Links) -> Flow {
        match signal {
            Signal::SIGTSTP => {
                self.tear_down_tree();
                Flow::Exit
            }
            Signal::SIGTERM => Flow::Exit,
            _ => Flow::Continue,
        }
    }
}

/// Entry point of the root process.
pub fn run_watchdog(cfg: &FabricConfig) -> Result<(), FabricError> {
    let signals = SignalPipe::install(&[Signal::SIGTSTP, Signal::SIGTERM, Signal::SIGCHLD])?;

    let spec = SpawnSpec::new(
        cfg.program(Role::LoadBalancer),
        cfg.topology.load_balancers,
        ROOT_INDEX,
    );
    let children = spawn_children(&spec)?;

    let mut tier = Watchdog::new(&cfg.topology);
    for slot in 0..children.fanout() {
        let Some(pid) = children.pid(slot) else {
            continue;
        };
        let index = spec.child_index(slot);
        if tier.registry_mut().record_pid(Role::LoadBalancer, index, pid as i32)
            == RecordOutcome::OutOfRange
        {
            error!(slot, index, "spawned load balancer does not fit the registry");
        }
    }

    let tier = Supervisor::new(tier, Links::new(None, children), signals).run()?;
    info!(
        load_balancers = tier.registry().known(Role::LoadBalancer),
        reverse_proxies = tier.registry().known(Role::ReverseProxy),
        workers = tier.registry().known(Role::Worker),
        "watchdog stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;

    use tierfab_core::{IdentityReport, SlotTable};

    fn no_links() -> Links {
        Links::new(None, SlotTable::new(0))
    }

    #[test]
    fn relayed_reports_fill_registry() {
        let mut wd = Watchdog::new(&Topology::default());
        let mut links = no_links();

        wd.on_identity(0, IdentityReport::new(Role::Worker, 5, 4242).encode(), &mut links);
        wd.on_identity(0, IdentityReport::new(Role::ReverseProxy, 1, 4241).encode(), &mut links);

        assert_eq!(wd.registry().pid(Role::Worker, 5), Some(4242));
        assert_eq!(wd.registry().pid(Role::ReverseProxy, 1), Some(4241));
    }

    #[test]
    fn out_of_range_and_garbage_reports_are_ignored() {
        let mut wd = Watchdog::new(&Topology::default());
        let mut links = no_links();

        wd.on_identity(0, IdentityReport::new(Role::Worker, 6, 1).encode(), &mut links);
        let mut bytes = *IdentityReport::new(Role::Worker, 0, 1).encode().as_bytes();
        bytes[0] = 7;
        wd.on_identity(0, IdentityFrame::from(bytes), &mut links);

        assert_eq!(wd.registry().known(Role::Worker), 0);
    }

    #[test]
    fn sigterm_exits_without_cascade() {
        let mut wd = Watchdog::new(&Topology::default());
        let mut links = no_links();
        assert_eq!(wd.on_signal(Signal::SIGTERM, &mut links), Flow::Exit);
        assert_eq!(wd.on_signal(Signal::SIGUSR1, &mut links), Flow::Continue);
    }

    #[test]
    fn sigtstp_terminates_recorded_processes() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let mut wd = Watchdog::new(&Topology::default());
        wd.registry_mut()
            .record_pid(Role::Worker, 0, child.id() as i32);

        let mut links = no_links();
        assert_eq!(wd.on_signal(Signal::SIGTSTP, &mut links), Flow::Exit);

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));
    }
}
