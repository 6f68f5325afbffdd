//! tierfab_supervisor
//!
//! Outside-world layer for `tierfab_core`.
//!
//! Responsibilities:
//! - spawn children and hand each one its end of a duplex channel
//! - run one single-threaded `poll(2)` loop per process
//! - relay identity reports upward, route requests downward
//! - turn signals into loop events (local exit, or tree teardown at the root)
//!
//! Non-goals:
//! - no threads
//! - no async
//! - no respawn of dead children

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod load_balancer;
pub mod reverse_proxy;
pub mod signals;
pub mod spawn;
pub mod supervisor;
pub mod watchdog;
pub mod worker;

pub use channel::{read_record, Channel, ChannelError, Recv};
pub use client::send_request;
pub use config::{ConfigError, FabricConfig};
pub use error::FabricError;
pub use load_balancer::{run_load_balancer, LoadBalancer};
pub use reverse_proxy::{run_reverse_proxy, ReverseProxy};
pub use signals::{SignalError, SignalPipe};
pub use spawn::{spawn_children, spawn_one, ChildLink, SpawnError, SpawnSpec};
pub use supervisor::{announce, Flow, Links, Supervisor, Tier};
pub use watchdog::{run_watchdog, Watchdog};
pub use worker::{run_worker, Worker};
