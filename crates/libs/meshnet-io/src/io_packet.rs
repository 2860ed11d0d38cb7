use meshnet_proto::Packet;
use meshnet_routing::{DeviceId, MeshError};

/// An outbound packet together with everything the I/O controller needs
/// to dispatch it without the network controller staying involved:
///
/// - `select` is re-evaluated right before the write, not when the packet
///   is enqueued, so a route that changes while the packet is queued
///   behind others is picked up rather than stale.
/// - `on_written`/`on_write_failure` are one-shot completion callbacks;
///   the controller owns the packet until exactly one of them fires.
pub struct IoPacket {
    packet: Packet,
    select: Box<dyn Fn() -> Option<DeviceId> + Send + Sync>,
    on_written: Box<dyn FnOnce() + Send>,
    on_write_failure: Box<dyn FnOnce(MeshError) + Send>,
}

impl IoPacket {
    pub fn new(
        packet: Packet,
        select: impl Fn() -> Option<DeviceId> + Send + Sync + 'static,
        on_written: impl FnOnce() + Send + 'static,
        on_write_failure: impl FnOnce(MeshError) + Send + 'static,
    ) -> Self {
        Self { packet, select: Box::new(select), on_written: Box::new(on_written), on_write_failure: Box::new(on_write_failure) }
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub(crate) fn select(&self) -> Option<DeviceId> {
        (self.select)()
    }

    pub(crate) fn complete(self) {
        (self.on_written)()
    }

    pub(crate) fn fail(self, error: MeshError) {
        (self.on_write_failure)(error)
    }
}
