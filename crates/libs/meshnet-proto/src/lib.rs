//! Wire codec for the six mesh packet kinds, plus the shared sequence
//! generator and its wraparound arithmetic.
//!
//! Builds directly on [`meshnet_routing`] for the `Instance` type; the
//! network controller (`meshnet-core`) and the I/O controller
//! (`meshnet-io`) both depend on this crate rather than parsing frames
//! themselves.

mod codec;
mod constants;
mod packet;
mod sequence;

pub use codec::{decode, encode, is_newer, try_decode};
pub use constants::{HOP_COUNT_INFINITY, INSTANCE_WIRE_LEN, MAX_HOP_COUNT, SEQUENCE_MODULUS};
pub use packet::{kind, Packet};
pub use sequence::SequenceGenerator;

pub use meshnet_routing::MeshError;
