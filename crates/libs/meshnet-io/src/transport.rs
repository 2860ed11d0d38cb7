use async_trait::async_trait;
use meshnet_routing::{DeviceId, MeshError};

/// The only capability the core consumes from the radio layer: framed
/// writes to a device's stream, and the ability to close one. Everything
/// else — scanning, advertising, MTU negotiation, characteristic
/// subscription — is the transport driver's problem, out of scope here
/// (§1).
///
/// Inbound notifications run the other direction: the transport calls into
/// [`crate::controller::IoController`]'s `on_packet_bytes`/
/// `on_device_lost` methods directly; there is no trait for that side
/// because the core is always the callee, never the caller, of those
/// notifications.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write a complete, already-encoded frame to `device`. Implementations
    /// should not fragment or buffer beyond what the radio link itself
    /// requires — framing is this crate's job, not the transport's.
    async fn write(&self, device: &DeviceId, bytes: Vec<u8>) -> Result<(), MeshError>;

    /// Best-effort teardown of a device's underlying connection. No result:
    /// a transport that can't close cleanly has nothing left for the core
    /// to act on.
    async fn close(&self, device: &DeviceId);
}
