//! Top-level orchestrator for the mesh network controller (spec §4.D/§4.E):
//! handshake and neighbor registration, distance-vector update propagation,
//! the send/relay/acknowledge pipeline, and the Internet-proxy fallback.
//!
//! This crate sits above `meshnet-routing`, `meshnet-proto`, and
//! `meshnet-io`; it's the only one that knows the protocol's state machine.
//! No observer/facade API, app bootstrap, or permission checks live here —
//! those are explicitly out of scope (spec §1) and belong to whatever
//! embeds this crate.

mod config;
mod controller;
mod delegate;
mod internet;
mod ticket;

pub use config::NetworkConfig;
pub use controller::NetworkController;
pub use delegate::{Delegate, InternetRequestDelegate};
pub use internet::{HttpInternetClient, InternetClient, RequestContext};
pub use ticket::Ticket;

pub use meshnet_io::Transport;
pub use meshnet_routing::{Device, DeviceId, Instance, Link, MeshError, StreamId};
