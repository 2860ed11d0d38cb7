/// Sentinel hop count marking a destination unreachable.
pub use meshnet_routing::HOP_COUNT_INFINITY;
/// Hop counts at or above this are never propagated.
pub use meshnet_routing::MAX_HOP_COUNT;

/// Width of the wraparound sequence space shared by every packet kind.
pub const SEQUENCE_MODULUS: u32 = 65536;

/// Length in bytes of the fixed-width instance identifier on the wire.
pub const INSTANCE_WIRE_LEN: usize = meshnet_routing::INSTANCE_ID_LEN;
