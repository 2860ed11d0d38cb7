use thiserror::Error;

use crate::instance::Instance;

/// Error taxonomy shared by every layer of the mesh controller: the routing
/// table, the packet codec, the I/O controller, and the network controller
/// all produce (and consume) these same variants rather than each minting
/// their own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// No link exists to `instance` at all (routing-table level).
    #[error("no route to instance {0}")]
    Unreachable(Instance),

    /// A link existed when the packet was enqueued but none remained once
    /// the I/O controller evaluated the device selector at dispatch time.
    #[error("no route at dispatch time")]
    NoRoute,

    /// An unexpected packet kind, or a well-formed frame out of context
    /// (e.g. a handshake from an unregistered device).
    #[error("protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    /// The codec could not decode a frame: truncation, an unknown kind
    /// tag, or a length prefix that overflows the remaining bytes.
    #[error("malformed packet: {reason}")]
    Malformed { reason: String },

    /// The transport's `write` failed for a device.
    #[error("transport write failed: {reason}")]
    TransportFailure { reason: String },

    /// The blocking external HTTP call for the Internet proxy flow failed.
    #[error("external http call failed: {reason}")]
    ExternalHttpFailure { reason: String },
}

impl MeshError {
    pub fn protocol_violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation { reason: reason.into() }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed { reason: reason.into() }
    }

    pub fn transport_failure(reason: impl Into<String>) -> Self {
        Self::TransportFailure { reason: reason.into() }
    }

    pub fn external_http_failure(reason: impl Into<String>) -> Self {
        Self::ExternalHttpFailure { reason: reason.into() }
    }
}
