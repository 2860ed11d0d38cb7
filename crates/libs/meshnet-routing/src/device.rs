use std::fmt;
use std::sync::Arc;

/// Opaque handle for a single transport/radio endpoint, scoped by whatever
/// naming the transport driver uses (a BLE peripheral address, a session id,
/// ...). Cheap to clone since routing state and I/O queues both key off it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one inbound byte stream belonging to a device. A device has
/// exactly one input stream in this runtime; the distinction exists so the
/// I/O controller can resolve "bytes arrived on stream X" back to a device
/// without the routing table exposing its internals.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StreamId(Arc<str>);

impl StreamId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

/// A registered transport endpoint, as handed to the routing table by
/// `on_device_available`.
#[derive(Clone, Debug)]
pub struct Device {
    id: DeviceId,
    stream_id: StreamId,
}

impl Device {
    pub fn new(id: DeviceId, stream_id: StreamId) -> Self {
        Self { id, stream_id }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }
}
