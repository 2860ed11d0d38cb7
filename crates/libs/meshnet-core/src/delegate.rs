use meshnet_routing::{Instance, MeshError};

use crate::ticket::Ticket;

/// Observer capability the network controller reports to. Held non-owning
/// ([`std::sync::Weak`]) by the controller: if the delegate has gone away
/// between a notification being queued and it firing, the notification is
/// silently dropped rather than the controller tolerating a panic or a
/// dangling reference.
pub trait Delegate: Send + Sync {
    fn on_instance_found(&self, instance: Instance);
    fn on_instance_lost(&self, instance: Instance, error: MeshError);
    fn on_received(&self, payload: Vec<u8>, origin: Instance);
    fn on_sent(&self, ticket: Ticket);
    fn on_send_failure(&self, ticket: Ticket, error: MeshError);
    fn on_acknowledgement(&self, ticket: Ticket);
}

/// Separate observer for the Internet-proxy flow (spec §4.D.5), kept apart
/// from [`Delegate`] because an embedder may want request/response handling
/// on a different object than mesh delivery events.
pub trait InternetRequestDelegate: Send + Sync {
    fn on_internet_response(&self, code: u16, body: Vec<u8>);
    fn on_internet_request_failure(&self, sequence: u16);
}
