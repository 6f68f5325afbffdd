use serde::{Deserialize, Serialize};

use crate::role::Role;
use crate::topology::Topology;
use crate::wire::IdentityReport;

// ---------------------------------------------------------------------
// Root-side identity tables: index -> pid for every role in the tree.
// Populated from direct spawns (Load Balancers) and from relayed reports.
// ---------------------------------------------------------------------

/// What happened to one incoming report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Stored. `previous` is the pid that was there before, if any.
    Recorded { previous: Option<i32> },
    /// Index outside the table for that role; ignored.
    OutOfRange,
}

/// One process the root will signal during tree teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownTarget {
    pub role: Role,
    pub index: usize,
    pub pid: i32,
}

/// Plain-data copy of the three tables, for logging.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub load_balancers: Vec<Option<i32>>,
    pub reverse_proxies: Vec<Option<i32>>,
    pub workers: Vec<Option<i32>>,
}

#[derive(Clone, Debug)]
pub struct IdentityRegistry {
    load_balancers: Vec<Option<i32>>,
    reverse_proxies: Vec<Option<i32>>,
    workers: Vec<Option<i32>>,
}

impl IdentityRegistry {
    /// Tables sized to the tree-wide totals of `topology`.
    pub fn new(topology: &Topology) -> Self {
        Self {
            load_balancers: vec![None; topology.total(Role::LoadBalancer)],
            reverse_proxies: vec![None; topology.total(Role::ReverseProxy)],
            workers: vec![None; topology.total(Role::Worker)],
        }
    }

    fn table(&self, role: Role) -> &[Option<i32>] {
        match role {
            Role::LoadBalancer => &self.load_balancers,
            Role::ReverseProxy => &self.reverse_proxies,
            Role::Worker => &self.workers,
        }
    }

    fn table_mut(&mut self, role: Role) -> &mut Vec<Option<i32>> {
        match role {
            Role::LoadBalancer => &mut self.load_balancers,
            Role::ReverseProxy => &mut self.reverse_proxies,
            Role::Worker => &mut self.workers,
        }
    }

    /// Store a pid learned either from a report or from our own spawn call.
    pub fn record_pid(&mut self, role: Role, index: i32, pid: i32) -> RecordOutcome {
        if index < 0 {
            return RecordOutcome::OutOfRange;
        }
        match self.table_mut(role).get_mut(index as usize) {
            Some(entry) => {
                let previous = entry.replace(pid);
                RecordOutcome::Recorded { previous }
            }
            None => RecordOutcome::OutOfRange,
        }
    }

    pub fn record(&mut self, report: &IdentityReport) -> RecordOutcome {
        self.record_pid(report.role, report.index, report.pid)
    }

    pub fn pid(&self, role: Role, index: usize) -> Option<i32> {
        self.table(role).get(index).copied().flatten()
    }

    pub fn capacity(&self, role: Role) -> usize {
        self.table(role).len()
    }

    pub fn known(&self, role: Role) -> usize {
        self.table(role).iter().filter(|p| p.is_some()).count()
    }

    /// Every recorded pid, children first: Workers, then Reverse Proxies, then
    /// Load Balancers. Each table entry appears at most once.
    pub fn shutdown_order(&self) -> Vec<ShutdownTarget> {
        let mut out = Vec::new();
        for role in [Role::Worker, Role::ReverseProxy, Role::LoadBalancer] {
            for (index, pid) in self.table(role).iter().enumerate() {
                if let Some(pid) = *pid {
                    out.push(ShutdownTarget { role, index, pid });
                }
            }
        }
        out
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            load_balancers: self.load_balancers.clone(),
            reverse_proxies: self.reverse_proxies.clone(),
            workers: self.workers.clone(),
        }
    }
}
