//! Per-device ordered outbound dispatch and inbound frame assembly for the
//! mesh network controller (spec §4.C).
//!
//! This crate is the only place that touches the [`Transport`] capability:
//! the network controller (`meshnet-core`) never serializes a frame or
//! calls `write`/`close` itself, it only ever builds an [`IoPacket`] and
//! hands it to an [`IoController`].

mod controller;
mod inbound;
mod io_packet;
mod transport;

pub use controller::IoController;
pub use inbound::{InboundAssembler, InboundDelegate};
pub use io_packet::IoPacket;
pub use transport::Transport;
