//! Instance/device/link primitives and the distance-vector routing table
//! for a BLE mesh runtime.
//!
//! This crate is the foundation of the workspace: it owns the domain types
//! (`Instance`, `Device`, `Link`) and the routing table that decides, for
//! any destination, which device a packet should go out on next. Nothing
//! here knows about the wire format or the network protocol state machine
//! built on top of it — those live in `meshnet-proto` and `meshnet-core`.

mod device;
mod error;
mod instance;
mod link;
mod table;

pub use device::{Device, DeviceId, StreamId};
pub use error::MeshError;
pub use instance::{Instance, INSTANCE_ID_LEN};
pub use link::{Link, HOP_COUNT_INFINITY, MAX_HOP_COUNT};
pub use table::{RoutingDelegate, RoutingTable};
