//! Worker leaf: consumes requests and logs a derived value. Never replies.

use std::io;

use nix::sys::signal::Signal;
use tracing::{info, warn};

use tierfab_core::{Request, Role, SlotTable};

use crate::channel::{Channel, Recv};
use crate::error::FabricError;
use crate::signals::SignalPipe;
use crate::supervisor::{announce, Flow, Links, Supervisor, Tier};

#[derive(Debug)]
pub struct Worker {
    index: i32,
    processed: u64,
    fatal: Option<io::Error>,
}

impl Worker {
    pub fn new(index: i32) -> Self {
        Self {
            index,
            processed: 0,
            fatal: None,
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// The stand-in for real work.
    pub fn handle(&mut self, request: &Request) -> f32 {
        let result = request.value.sqrt();
        self.processed += 1;
        info!(
            index = self.index,
            client_id = request.client_id,
            value = request.value,
            result,
            "processed request"
        );
        result
    }
}

impl Tier for Worker {
    fn name(&self) -> &'static str {
        "worker"
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
                self.handle(&request);
                Flow::Continue
            }
            Ok(Recv::Closed) => {
                info!(index = self.index, processed = self.processed, "reverse proxy disconnected");
                Flow::Exit
            }
            Ok(Recv::Partial(got)) => {
                warn!(got, "incomplete packet received - discarding");
                Flow::Continue
            }
            // SIGTERM cut the read short; the loop picks it up next.
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Flow::Continue,
            Err(e) => {
                self.fatal = Some(e);
                Flow::Exit
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

/// Entry point of a Worker process at global `index`.
///
/// End-of-stream and SIGTERM are normal exits; a read error is returned.
pub fn run_worker(index: i32, mut upward: Channel) -> Result<(), FabricError> {
    let signals = SignalPipe::install(&[Signal::SIGTERM])?;
    announce(&mut upward, Role::Worker, index);

    let links = Links::new(Some(upward), SlotTable::new(0));
    let worker = Supervisor::new(Worker::new(index), links, signals).run()?;
    match worker.fatal {
        Some(source) => Err(FabricError::Io {
            context: "read from reverse proxy failed",
            source,
        }),
        None => Ok(()),
    }
}
