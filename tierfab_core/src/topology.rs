use serde::{Deserialize, Serialize};

use crate::role::Role;

/// Fan-out of each tier. Fixed for the lifetime of a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Load Balancers under the Watchdog.
    pub load_balancers: usize,
    /// Reverse Proxies under each Load Balancer.
    pub reverse_proxies_per_balancer: usize,
    /// Workers under each Reverse Proxy.
    pub workers_per_proxy: usize,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            load_balancers: 1,
            reverse_proxies_per_balancer: 2,
            workers_per_proxy: 3,
        }
    }
}

impl Topology {
    /// How many children of `role` a single parent spawns.
    pub fn fanout(&self, role: Role) -> usize {
        match role {
            Role::LoadBalancer => self.load_balancers,
            Role::ReverseProxy => self.reverse_proxies_per_balancer,
            Role::Worker => self.workers_per_proxy,
        }
    }

    /// Tree-wide number of processes holding `role`. Saturates on overflow.
    pub fn total(&self, role: Role) -> usize {
        self.checked_total(role).unwrap_or(usize::MAX)
    }

    fn checked_total(&self, role: Role) -> Option<usize> {
        match role {
            Role::LoadBalancer => Some(self.load_balancers),
            Role::ReverseProxy => self
                .load_balancers
                .checked_mul(self.reverse_proxies_per_balancer),
            Role::Worker => self
                .checked_total(Role::ReverseProxy)?
                .checked_mul(self.workers_per_proxy),
        }
    }

    /// Whether every global index in the tree fits the signed 32-bit wire field.
    ///
    /// Each tier is at least as wide as the one above it, so checking the Worker
    /// total covers all three.
    pub fn fits_wire_index(&self) -> bool {
        self.load_balancers > 0
            && self.reverse_proxies_per_balancer > 0
            && self.workers_per_proxy > 0
            && self
                .checked_total(Role::Worker)
                .is_some_and(|n| n <= i32::MAX as usize)
    }
}

/// Role-unique index of the child in `slot` of the parent whose own index is
/// `parent_index`.
///
/// Only meaningful for topologies that pass `Topology::fits_wire_index`.
#[inline]
pub fn global_index(slot: usize, parent_index: i32, fanout: usize) -> i32 {
    slot as i32 + parent_index * fanout as i32
}
