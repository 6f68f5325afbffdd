//! Reverse Proxy tier: requests from the parent Load Balancer are spread over the
//! Worker slots with a round-robin cursor.

use std::io;

use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

use tierfab_core::{Delivery, Request, Role, RoundRobin, REQUEST_FRAME_LEN};

use crate::channel::{Channel, Recv};
use crate::config::FabricConfig;
use crate::error::FabricError;
use crate::signals::SignalPipe;
use crate::spawn::{spawn_children, SpawnSpec};
use crate::supervisor::{announce, Flow, Links, Supervisor, Tier};

#[derive(Debug)]
pub struct ReverseProxy {
    index: i32,
    cursor: RoundRobin,
}

impl ReverseProxy {
    pub fn new(index: i32, workers: usize) -> Self {
        Self {
            index,
            cursor: RoundRobin::new(workers),
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor.cursor()
    }

    /// Offer `request` to the Worker under the cursor, then advance the cursor.
    ///
    /// A dead slot drops the request without retrying elsewhere. A failed write
    /// retires the slot, unless it was cut short by SIGTERM.
    pub fn dispatch(&mut self, request: &Request, links: &mut Links) -> (usize, Delivery) {
        let slot = self.cursor.next_slot();
        let Some(link) = links.children.channel_mut(slot) else {
            debug!(slot, client_id = request.client_id, "worker slot closed; request dropped");
            return (slot, Delivery::Dropped);
        };
        match link.channel.send_request(request) {
            Ok(()) => {
                info!(
                    client_id = request.client_id,
                    slot,
                    "forwarding request to Worker"
                );
                (slot, Delivery::Delivered)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                debug!(slot, "write to worker abandoned on termination");
                (slot, Delivery::Failed)
            }
            Err(e) => {
                warn!(slot, error = %e, "write to worker failed; closing slot");
                links.retire(slot);
                (slot, Delivery::Failed)
            }
        }
    }
}

impl Tier for ReverseProxy {
    fn name(&self) -> &'static str {
        "reverse-proxy"
    }

    fn watches_upward(&self) -> bool {
        true
    }

    fn on_upward(&mut self, links: &mut Links) -> Flow {
        let Some(up) = links.upward.as_mut() else {
            return Flow::Exit;
        };
        match up.recv_request() {
            Ok(Recv::Record(request)) => {
                self.dispatch(&request, links);
                Flow::Continue
            }
            Ok(Recv::Closed) => {
                info!(index = self.index, "load balancer disconnected");
                Flow::Exit
            }
            Ok(Recv::Partial(got)) => {
                warn!(got, expected = REQUEST_FRAME_LEN, "incomplete request discarded");
                Flow::Continue
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Flow::Continue,
            Err(e) => {
                warn!(error = %e, "read from load balancer failed");
                Flow::Continue
            }
        }
    }

    fn on_signal(&mut self, signal: Signal, _links: &mut Links) -> Flow {
        match signal {
            Signal::SIGTERM => Flow::Exit,
            _ => Flow::Continue,
        }
    }
}

/// Entry point of a Reverse Proxy process at global `index`.
pub fn run_reverse_proxy(
    cfg: &FabricConfig,
    index: i32,
    mut upward: Channel,
) -> Result<(), FabricError> {
    let signals = SignalPipe::install(&[Signal::SIGTERM, Signal::SIGCHLD])?;
    announce(&mut upward, Role::ReverseProxy, index);

    let workers = cfg.topology.workers_per_proxy;
    let spec = SpawnSpec::new(cfg.program(Role::Worker), workers, index);
    let children = spawn_children(&spec)?;

    let tier = ReverseProxy::new(index, workers);
    Supervisor::new(tier, Links::new(Some(upward), children), signals).run()?;
    Ok(())
}
