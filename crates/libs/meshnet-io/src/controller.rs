use std::collections::HashMap;
use std::sync::{Mutex, Arc};

use log::{trace, warn};
use tokio::sync::mpsc;

use meshnet_proto::encode;
use meshnet_routing::{DeviceId, MeshError};

use crate::io_packet::IoPacket;
use crate::transport::Transport;

/// Per-device ordered outbound dispatch.
///
/// Each registered device gets its own unbounded channel and a dedicated
/// worker task that drains it one packet at a time: that single consumer
/// is what gives the §4.C ordering guarantee ("for two `add` calls
/// targeting the same device in program order, the second writes only
/// after the first's write completion") without any queue-wide lock held
/// across an `.await`. Two different devices' workers run fully
/// independently, so a slow write on one link never stalls another.
pub struct IoController<T> {
    transport: Arc<T>,
    senders: Mutex<HashMap<DeviceId, mpsc::UnboundedSender<IoPacket>>>,
}

impl<T: Transport + 'static> IoController<T> {
    pub fn new(transport: Arc<T>) -> Arc<Self> {
        Arc::new(Self { transport, senders: Mutex::new(HashMap::new()) })
    }

    /// Start this device's outbound worker, if it isn't already running.
    /// Idempotent: calling it twice for a still-registered device is a
    /// no-op, matching the routing table's own idempotent `register`.
    pub fn register_device(self: &Arc<Self>, device_id: DeviceId) {
        let mut senders = self.senders.lock().expect("io controller senders lock poisoned");
        if senders.contains_key(&device_id) {
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(device_id.clone(), tx);
        drop(senders);

        let controller = Arc::clone(self);
        tokio::spawn(controller.drain(device_id, rx));
    }

    /// Stop accepting new work for this device. Anything already queued
    /// drains normally; the worker task exits once the channel empties
    /// and the sender half is gone.
    pub fn unregister_device(&self, device_id: &DeviceId) {
        self.senders.lock().expect("io controller senders lock poisoned").remove(device_id);
    }

    /// Best-effort teardown of a device's underlying connection, used when
    /// the inbound assembler hits a malformed frame (§4.C: "a decode
    /// failure closes the stream with `ErrorKind::ProtocolViolation`").
    pub async fn close(&self, device_id: &DeviceId) {
        self.transport.close(device_id).await;
    }

    /// Enqueue a packet for dispatch. The device selector is evaluated
    /// immediately to choose which device's queue the packet joins; it is
    /// evaluated again right before the write itself, so a route that
    /// changes while the packet is queued behind others is picked up
    /// rather than stale. If the selector yields no device at either
    /// point, the packet fails with [`MeshError::NoRoute`].
    pub fn add(&self, io_packet: IoPacket) {
        let Some(device_id) = io_packet.select() else {
            io_packet.fail(MeshError::NoRoute);
            return;
        };

        let sender = self.senders.lock().expect("io controller senders lock poisoned").get(&device_id).cloned();
        match sender {
            Some(sender) => {
                if let Err(mpsc::error::SendError(packet)) = sender.send(io_packet) {
                    packet.fail(MeshError::NoRoute);
                }
            }
            None => io_packet.fail(MeshError::NoRoute),
        }
    }

    async fn drain(self: Arc<Self>, device_id: DeviceId, mut rx: mpsc::UnboundedReceiver<IoPacket>) {
        while let Some(packet) = rx.recv().await {
            let target = match packet.select() {
                Some(device) => device,
                None => {
                    packet.fail(MeshError::NoRoute);
                    continue;
                }
            };

            let bytes = encode(packet.packet());
            match self.transport.write(&target, bytes).await {
                Ok(()) => {
                    trace!("io: wrote {} to {target}", packet.packet().kind_name());
                    packet.complete();
                }
                Err(err) => {
                    warn!("io: write to {target} failed: {err}");
                    packet.fail(err);
                }
            }
        }
        trace!("io: worker for {device_id} exiting (queue empty, device unregistered)");
    }
}
