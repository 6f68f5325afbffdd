pub mod role;
pub mod wire;

pub mod topology;
pub mod slots;
pub mod route;
pub mod registry;

pub use role::Role;
pub use wire::{IdentityFrame, IdentityReport, Request, WireError, IDENTITY_FRAME_LEN, REQUEST_FRAME_LEN};

pub use topology::{Topology, global_index};
pub use slots::{SlotError, SlotState, SlotTable};
pub use route::{Delivery, RoundRobin, route_by_client};
pub use registry::{IdentityRegistry, RecordOutcome, RegistrySnapshot, ShutdownTarget};
