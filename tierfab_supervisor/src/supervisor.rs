//! The shared supervisor loop.
//!
//! One `Supervisor` per process. It owns the process's channels and its child slot
//! table, blocks in `poll(2)` over a small fixed set of sources, and services each
//! ready source once before waiting again:
//! - the signal pipe
//! - the upward channel (only for tiers that take requests from their parent)
//! - the ingress listener (Load Balancer only)
//! - every live child channel
//!
//! What a tier does with each event is supplied through the `Tier` trait; the
//! loop itself, child end-of-stream handling and identity relay are shared.
//!
//! A child's channel reaches end-of-stream slightly before the child becomes
//! waitable, so retired children are kept until SIGCHLD says they can be reaped.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::Signal;
use std::os::fd::{AsFd, BorrowedFd};
use std::process::Child;
use tracing::{debug, info, warn};

use tierfab_core::{IdentityFrame, IdentityReport, Role, SlotTable, IDENTITY_FRAME_LEN};

use crate::channel::{Channel, Recv};
use crate::error::FabricError;
use crate::signals::SignalPipe;
use crate::spawn::ChildLink;

/// Whether the loop keeps going after an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Channels owned by one process.
#[derive(Debug)]
pub struct Links {
    /// Channel to our parent. `None` at the root.
    pub upward: Option<Channel>,
    pub children: SlotTable<ChildLink>,
    /// Retired children that have not been waited for yet, by slot.
    unreaped: Vec<(usize, Child)>,
}

impl Links {
    pub fn new(upward: Option<Channel>, children: SlotTable<ChildLink>) -> Self {
        Self {
            upward,
            children,
            unreaped: Vec::new(),
        }
    }

    /// Forward a frame from below to our parent, unmodified.
    ///
    /// A failed write is logged; the upward channel is not torn down for it.
    pub fn relay_upward(&mut self, frame: &IdentityFrame) {
        match self.upward.as_mut() {
            Some(up) => {
                if let Err(e) = up.send_identity(frame) {
                    warn!(error = %e, "failed to relay identity report upward");
                }
            }
            None => debug!("no upward channel; identity report not relayed"),
        }
    }

    /// Permanently close a child slot. The child is reaped now if it has
    /// exited, otherwise on a later `reap_exited`.
    pub fn retire(&mut self, slot: usize) {
        let Some(ChildLink { channel, process }) = self.children.mark_dead(slot) else {
            return;
        };
        drop(channel);
        if let Some(child) = process {
            self.unreaped.push((slot, child));
        }
        self.reap_exited();
    }

    /// Wait for every retired child that has exited since the last call.
    pub fn reap_exited(&mut self) {
        self.unreaped.retain_mut(|(slot, child)| match child.try_wait() {
            Ok(Some(status)) => {
                info!(slot = *slot, pid = child.id(), %status, "child exited");
                false
            }
            Ok(None) => {
                debug!(slot = *slot, pid = child.id(), "child channel closed; process not yet exited");
                true
            }
            Err(e) => {
                warn!(slot = *slot, pid = child.id(), error = %e, "cannot wait for child");
                false
            }
        });
    }

    /// Retired children still waiting to be reaped.
    pub fn unreaped(&self) -> usize {
        self.unreaped.len()
    }

    /// Drop every channel we hold, upward included.
    pub fn close_all(&mut self) {
        self.children.close_all();
        self.upward = None;
    }
}

/// Send this process's own identity report to its parent.
///
/// A failed write is logged but not fatal: the process can still serve requests.
pub fn announce(upward: &mut Channel, role: Role, index: i32) {
    let pid = std::process::id() as i32;
    let frame = IdentityReport::new(role, index, pid).encode();
    match upward.send_identity(&frame) {
        Ok(()) => debug!(%role, index, pid, "identity report sent"),
        Err(e) => warn!(%role, index, error = %e, "failed to send identity report"),
    }
}

/// Tier-specific behavior plugged into the shared loop.
pub trait Tier {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the upward channel is part of the poll set.
    fn watches_upward(&self) -> bool {
        false
    }

    /// Extra listening socket, if the tier has one.
    fn ingress(&self) -> Option<BorrowedFd<'_>> {
        None
    }

    fn on_ingress(&mut self, _links: &mut Links) -> Flow {
        Flow::Continue
    }

    fn on_upward(&mut self, _links: &mut Links) -> Flow {
        Flow::Continue
    }

    /// A complete identity report arrived from child `slot`.
    ///
    /// Intermediate tiers relay it as-is; the root overrides this.
    fn on_identity(&mut self, _slot: usize, frame: IdentityFrame, links: &mut Links) {
        links.relay_upward(&frame);
    }

    fn on_signal(&mut self, signal: Signal, links: &mut Links) -> Flow;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Signals,
    Upward,
    Ingress,
    Child(usize),
}

pub struct Supervisor<T: Tier> {
    tier: T,
    links: Links,
    signals: SignalPipe,
}

impl<T: Tier> Supervisor<T> {
    pub fn new(tier: T, links: Links, signals: SignalPipe) -> Self {
        Self {
            tier,
            links,
            signals,
        }
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    /// Run until the tier asks to exit. Channels are closed before returning the
    /// tier to the caller.
    pub fn run(mut self) -> Result<T, FabricError> {
        info!(tier = self.tier.name(), "event loop started");
        while self.step()? == Flow::Continue {}
        self.links.close_all();
        info!(tier = self.tier.name(), "event loop finished");
        Ok(self.tier)
    }

    /// Wait once, then service every ready source once.
    pub fn step(&mut self) -> Result<Flow, FabricError> {
        for source in self.wait()? {
            let flow = match source {
                Source::Signals => self.service_signals(),
                Source::Upward => self.tier.on_upward(&mut self.links),
                Source::Ingress => self.tier.on_ingress(&mut self.links),
                Source::Child(slot) => {
                    self.service_child(slot);
                    Flow::Continue
                }
            };
            if flow == Flow::Exit {
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    fn wait(&self) -> Result<Vec<Source>, FabricError> {
        let interest = PollFlags::POLLIN;
        let mut sources = vec![Source::Signals];
        let mut fds = vec![PollFd::new(self.signals.as_fd(), interest)];

        if self.tier.watches_upward() {
            if let Some(up) = &self.links.upward {
                sources.push(Source::Upward);
                fds.push(PollFd::new(up.as_fd(), interest));
            }
        }
        if let Some(fd) = self.tier.ingress() {
            sources.push(Source::Ingress);
            fds.push(PollFd::new(fd, interest));
        }
        for (slot, link) in self.links.children.live() {
            sources.push(Source::Child(slot));
            fds.push(PollFd::new(link.channel.as_fd(), interest));
        }

        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => break,
                // The signal pipe is readable now; the next poll returns at once.
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(FabricError::Poll(e)),
            }
        }

        // Hang-up and error count as readable: the read that follows reports them.
        let ready = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
        Ok(fds
            .iter()
            .zip(sources)
            .filter(|(fd, _)| fd.revents().is_some_and(|r| r.intersects(ready)))
            .map(|(_, source)| source)
            .collect())
    }

    fn service_signals(&mut self) -> Flow {
        for signal in self.signals.drain() {
            if signal == Signal::SIGCHLD {
                self.links.reap_exited();
                continue;
            }
            info!(tier = self.tier.name(), %signal, "signal received");
            if self.tier.on_signal(signal, &mut self.links) == Flow::Exit {
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    fn service_child(&mut self, slot: usize) {
        // The slot may have been retired earlier in this round.
        let Some(link) = self.links.children.channel_mut(slot) else {
            return;
        };
        let received = link.channel.recv_identity();
        match received {
            Ok(Recv::Record(frame)) => self.tier.on_identity(slot, frame, &mut self.links),
            Ok(Recv::Closed) => {
                info!(tier = self.tier.name(), slot, "child disconnected");
                self.links.retire(slot);
            }
            Ok(Recv::Partial(got)) => warn!(
                slot,
                got,
                expected = IDENTITY_FRAME_LEN,
                "incomplete identity report discarded"
            ),
            Err(e) => warn!(slot, error = %e, "read from child failed"),
        }
    }
}
