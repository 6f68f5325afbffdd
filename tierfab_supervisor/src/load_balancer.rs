//! Load Balancer tier: the public ingress.
//!
//! Each client connection carries exactly one Request. It is read to completion,
//! placed on a Reverse Proxy by `client_id mod count`, and the connection is closed
//! whatever happened. Nothing is ever sent back to the client.

use std::fs;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use nix::sys::signal::Signal;
use tracing::{debug, info, warn};

use tierfab_core::{route_by_client, Delivery, Request, Role, REQUEST_FRAME_LEN};

use crate::channel::{read_record, Channel, Recv};
use crate::config::FabricConfig;
use crate::error::FabricError;
use crate::signals::SignalPipe;
use crate::spawn::{spawn_children, SpawnSpec};
use crate::supervisor::{announce, Flow, Links, Supervisor, Tier};

#[derive(Debug)]
pub struct LoadBalancer {
    index: i32,
    ingress: UnixListener,
    ingress_path: PathBuf,
}

impl LoadBalancer {
    /// Bind the ingress socket at `path`, replacing a stale one from an earlier run.
    pub fn bind(index: i32, path: impl Into<PathBuf>) -> Result<Self, FabricError> {
        let path = path.into();
        remove_stale(&path);
        let ingress = UnixListener::bind(&path).map_err(|source| FabricError::Bind {
            path: path.clone(),
            source,
        })?;
        info!(index, path = %path.display(), "ingress listening");
        Ok(Self {
            index,
            ingress,
            ingress_path: path,
        })
    }

    pub fn ingress_path(&self) -> &Path {
        &self.ingress_path
    }

    /// Place `request` on its Reverse Proxy. Dead slots drop; a failed write is
    /// logged and leaves the slot open.
    pub fn forward(&self, request: &Request, links: &mut Links) -> (usize, Delivery) {
        let slot = route_by_client(request.client_id, links.children.fanout());
        let Some(link) = links.children.channel_mut(slot) else {
            warn!(
                client_id = request.client_id,
                slot,
                "socket closed, cannot forward"
            );
            return (slot, Delivery::Dropped);
        };
        match link.channel.send_request(request) {
            Ok(()) => {
                info!(
                    index = self.index,
                    client_id = request.client_id,
                    slot,
                    "Request from Client {}. Forwarding to Reverse Proxy {}",
                    request.client_id,
                    slot
                );
                (slot, Delivery::Delivered)
            }
            Err(e) => {
                warn!(slot, error = %e, "write to reverse proxy failed");
                (slot, Delivery::Failed)
            }
        }
    }
}

fn remove_stale(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale ingress socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove stale ingress socket"),
    }
}

impl Tier for LoadBalancer {
    fn name(&self) -> &'static str {
        "load-balancer"
    }

    fn ingress(&self) -> Option<BorrowedFd<'_>> {
        Some(self.ingress.as_fd())
    }

    fn on_ingress(&mut self, links: &mut Links) -> Flow {
        let mut conn = match self.ingress.accept() {
            Ok((conn, _)) => conn,
            Err(e) => {
                warn!(error = %e, "accept failed");
                return Flow::Continue;
            }
        };
        match read_record::<_, REQUEST_FRAME_LEN>(&mut conn) {
            Ok(Recv::Record(bytes)) => {
                self.forward(&Request::decode(&bytes), links);
            }
            Ok(Recv::Closed) => debug!("client closed without sending a request"),
            Ok(Recv::Partial(got)) => {
                debug!(got, expected = REQUEST_FRAME_LEN, "short request discarded")
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                debug!("request read abandoned on termination")
            }
            Err(e) => debug!(error = %e, "unreadable request discarded"),
        }
        // `conn` drops here: one request per connection.
        Flow::Continue
    }

    fn on_signal(&mut self, signal: Signal, _links: &mut Links) -> Flow {
        match signal {
            Signal::SIGTERM => Flow::Exit,
            _ => Flow::Continue,
        }
    }
}

/// Entry point of a Load Balancer process at global `index`.
pub fn run_load_balancer(
    cfg: &FabricConfig,
    index: i32,
    mut upward: Channel,
) -> Result<(), FabricError> {
    let signals = SignalPipe::install(&[Signal::SIGTERM, Signal::SIGCHLD])?;
    let tier = LoadBalancer::bind(index, cfg.ingress_path_for(index))?;
    announce(&mut upward, Role::LoadBalancer, index);

    let spec = SpawnSpec::new(
        cfg.program(Role::ReverseProxy),
        cfg.topology.reverse_proxies_per_balancer,
        index,
    );
    let children = spawn_children(&spec)?;

    Supervisor::new(tier, Links::new(Some(upward), children), signals).run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    use crate::spawn::ChildLink;
    use tierfab_core::SlotTable;

    fn proxies(n: usize) -> (Links, Vec<Channel>) {
        let mut table = SlotTable::new(n);
        let mut far = Vec::new();
        for slot in 0..n {
            let (near, other) = Channel::pair().unwrap();
            other
                .set_read_timeout(Some(std::time::Duration::from_millis(200)))
                .unwrap();
            table.open(slot, ChildLink::new(near, None), None).unwrap();
            far.push(other);
        }
        (Links::new(None, table), far)
    }

    fn connect_and_send(path: &Path, bytes: &[u8]) {
        let mut client = UnixStream::connect(path).unwrap();
        client.write_all(bytes).unwrap();
    }

    #[test]
    fn clients_land_on_their_proxy() {
        let dir = tempfile::tempdir().unwrap();
        let mut lb = LoadBalancer::bind(0, dir.path().join("lb")).unwrap();
        let (mut links, mut far) = proxies(2);

        connect_and_send(lb.ingress_path(), &Request::new(4, 1.0).encode());
        assert_eq!(lb.on_ingress(&mut links), Flow::Continue);
        connect_and_send(lb.ingress_path(), &Request::new(5, 2.0).encode());
        assert_eq!(lb.on_ingress(&mut links), Flow::Continue);

        assert_eq!(far[0].recv_request().unwrap(), Recv::Record(Request::new(4, 1.0)));
        assert_eq!(far[1].recv_request().unwrap(), Recv::Record(Request::new(5, 2.0)));
    }

    #[test]
    fn truncated_request_is_not_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut lb = LoadBalancer::bind(0, dir.path().join("lb")).unwrap();
        let (mut links, mut far) = proxies(2);

        // Client sends 5 of 8 bytes and hangs up.
        connect_and_send(lb.ingress_path(), &Request::new(4, 1.0).encode()[..5]);
        assert_eq!(lb.on_ingress(&mut links), Flow::Continue);

        for end in &mut far {
            let err = end.recv_request().unwrap_err();
            assert!(matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ));
        }
        assert_eq!(links.children.live_count(), 2);
    }

    #[test]
    fn dead_proxy_drops_request() {
        let dir = tempfile::tempdir().unwrap();
        let lb = LoadBalancer::bind(0, dir.path().join("lb")).unwrap();
        let (mut links, _far) = proxies(2);
        links.retire(1);

        assert_eq!(lb.forward(&Request::new(7, 3.0), &mut links), (1, Delivery::Dropped));
        assert_eq!(lb.forward(&Request::new(6, 3.0), &mut links), (0, Delivery::Delivered));
    }

    #[test]
    fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lb");
        let first = LoadBalancer::bind(0, &path).unwrap();
        drop(first);
        assert!(path.exists());
        LoadBalancer::bind(0, &path).unwrap();
    }

    #[test]
    fn failed_write_keeps_slot_open() {
        let dir = tempfile::tempdir().unwrap();
        let lb = LoadBalancer::bind(0, dir.path().join("lb")).unwrap();
        let (mut links, mut far) = proxies(1);
        drop(far.remove(0));

        assert_eq!(lb.forward(&Request::new(0, 1.0), &mut links), (0, Delivery::Failed));
        assert!(links.children.is_live(0));
    }
}
