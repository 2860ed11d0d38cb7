use std::collections::HashMap;
use std::sync::Mutex;

use log::warn;

use meshnet_proto::{try_decode, Packet};
use meshnet_routing::{MeshError, StreamId};

/// Receives fully-framed inbound packets, or a note that a stream must be
/// torn down because it sent something the codec can't parse.
pub trait InboundDelegate: Send + Sync {
    fn on_packet(&self, stream_id: StreamId, packet: Packet);
    fn on_protocol_violation(&self, stream_id: StreamId, error: MeshError);
}

/// Accumulates raw bytes per inbound stream until a complete frame can be
/// parsed out of the front of the buffer, per §4.C: "for each input stream,
/// accumulate bytes until a complete frame is parsed, decode via 4.A, and
/// hand `(stream_id, packet)` to the network controller". A decode failure
/// closes the stream rather than attempting to resynchronize.
#[derive(Default)]
pub struct InboundAssembler {
    buffers: Mutex<HashMap<StreamId, Vec<u8>>>,
}

impl InboundAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed freshly-arrived bytes for `stream_id` and dispatch every
    /// complete frame they produce (there may be more than one per call,
    /// or none, depending on how the transport chunks writes).
    pub fn feed(&self, stream_id: StreamId, bytes: &[u8], delegate: &dyn InboundDelegate) {
        let mut decoded = Vec::new();
        let violation = {
            let mut buffers = self.buffers.lock().expect("inbound assembler lock poisoned");
            let buffer = buffers.entry(stream_id.clone()).or_default();
            buffer.extend_from_slice(bytes);

            let mut violation = None;
            loop {
                match try_decode(buffer) {
                    Ok(Some((packet, consumed))) => {
                        buffer.drain(..consumed);
                        decoded.push(packet);
                    }
                    Ok(None) => break,
                    Err(err) => {
                        violation = Some(err);
                        break;
                    }
                }
            }
            if violation.is_some() {
                buffers.remove(&stream_id);
            }
            violation
        };

        for packet in decoded {
            delegate.on_packet(stream_id.clone(), packet);
        }

        if let Some(err) = violation {
            warn!("io: closing stream after malformed frame: {err}");
            delegate.on_protocol_violation(stream_id, err);
        }
    }

    /// Drop any partially-buffered bytes for a stream whose device went
    /// away (e.g. via `on_device_lost`).
    pub fn forget(&self, stream_id: &StreamId) {
        self.buffers.lock().expect("inbound assembler lock poisoned").remove(stream_id);
    }
}
