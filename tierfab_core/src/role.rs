use std::fmt;

use serde::{Deserialize, Serialize};

/// Tree role carried in identity reports.
///
/// The Watchdog is never reported: it is the root and has no parent to tell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    LoadBalancer,
    ReverseProxy,
    Worker,
}

impl Role {
    #[inline]
    pub fn tag(self) -> u32 {
        match self {
            Role::LoadBalancer => 0,
            Role::ReverseProxy => 1,
            Role::Worker => 2,
        }
    }

    #[inline]
    pub fn from_tag(tag: u32) -> Option<Role> {
        match tag {
            0 => Some(Role::LoadBalancer),
            1 => Some(Role::ReverseProxy),
            2 => Some(Role::Worker),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::LoadBalancer => "Load Balancer",
            Role::ReverseProxy => "Reverse Proxy",
            Role::Worker => "Worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
