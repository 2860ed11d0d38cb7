use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::warn;

use meshnet_io::{IoController, IoPacket, Transport};
use meshnet_proto::{Packet, SequenceGenerator};
use meshnet_routing::{Device, DeviceId, Instance, Link, MeshError, RoutingDelegate, RoutingTable, StreamId};
use meshnet_routing::{HOP_COUNT_INFINITY, MAX_HOP_COUNT};

use crate::config::NetworkConfig;
use crate::delegate::{Delegate, InternetRequestDelegate};
use crate::internet::{InternetClient, RequestContext};
use crate::ticket::Ticket;

/// The mesh protocol's state machine (spec §4.D): handshake and neighbor
/// registration, distance-vector update propagation, the send/relay/ack
/// pipeline, and the Internet-proxy fallback. Owns the routing table, the
/// I/O controller, and the shared sequence generator; every packet kind is
/// handled here.
pub struct NetworkController<T, C> {
    config: NetworkConfig,
    table: Arc<RoutingTable>,
    io: Arc<IoController<T>>,
    inbound: meshnet_io::InboundAssembler,
    internet_client: Arc<C>,
    sequence: SequenceGenerator,
    delegate: Mutex<Option<Weak<dyn Delegate>>>,
    internet_delegate: Mutex<Option<Weak<dyn InternetRequestDelegate>>>,
    has_direct_internet: AtomicBool,
    self_weak: Mutex<Weak<Self>>,
}

impl<T, C> NetworkController<T, C>
where
    T: Transport + 'static,
    C: InternetClient + 'static,
{
    pub fn new(config: NetworkConfig, io: Arc<IoController<T>>, internet_client: Arc<C>) -> Arc<Self> {
        let host = config.host();
        let controller = Arc::new(Self {
            config,
            table: Arc::new(RoutingTable::new(host)),
            io,
            inbound: meshnet_io::InboundAssembler::new(),
            internet_client,
            sequence: SequenceGenerator::new(),
            delegate: Mutex::new(None),
            internet_delegate: Mutex::new(None),
            has_direct_internet: AtomicBool::new(false),
            self_weak: Mutex::new(Weak::new()),
        });

        *controller.self_weak.lock().expect("self-weak lock poisoned") = Arc::downgrade(&controller);
        controller.table.set_delegate(Arc::downgrade(&controller) as Weak<dyn RoutingDelegate>);
        controller
    }

    pub fn set_delegate(&self, delegate: Weak<dyn Delegate>) {
        *self.delegate.lock().expect("delegate lock poisoned") = Some(delegate);
    }

    pub fn set_internet_delegate(&self, delegate: Weak<dyn InternetRequestDelegate>) {
        *self.internet_delegate.lock().expect("internet delegate lock poisoned") = Some(delegate);
    }

    /// Declares whether the host itself has direct external connectivity,
    /// for `internet_hops = 0` in the handshake. The radio/network
    /// reachability check itself is the embedding application's job (§1);
    /// a successful direct [`Self::send_internet`] call also flips this on
    /// opportunistically.
    pub fn set_direct_internet_access(&self, available: bool) {
        self.has_direct_internet.store(available, Ordering::Relaxed);
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.table
    }

    fn arc_self(&self) -> Arc<Self> {
        self.self_weak.lock().expect("self-weak lock poisoned").upgrade().expect("network controller dropped while still dispatching")
    }

    fn notify_delegate(&self, f: impl FnOnce(&dyn Delegate)) {
        let delegate = self.delegate.lock().expect("delegate lock poisoned").clone();
        if let Some(delegate) = delegate.and_then(|d| d.upgrade()) {
            f(delegate.as_ref());
        }
    }

    fn notify_internet_delegate(&self, f: impl FnOnce(&dyn InternetRequestDelegate)) {
        let delegate = self.internet_delegate.lock().expect("internet delegate lock poisoned").clone();
        if let Some(delegate) = delegate.and_then(|d| d.upgrade()) {
            f(delegate.as_ref());
        }
    }

    /// Enqueue `packet` addressed to a fixed device, bypassing routing-table
    /// lookup entirely (used for handshakes, table-dump updates, and
    /// same-path Internet responses).
    fn enqueue_to(&self, device_id: DeviceId, packet: Packet, on_failure: impl FnOnce(MeshError) + Send + 'static) {
        let target = device_id;
        self.io.add(IoPacket::new(packet, move || Some(target.clone()), || {}, on_failure));
    }

    /// Enqueue `packet` to whatever the routing table resolves as the best
    /// link to `dest` at dispatch time, excluding `split_horizon`.
    fn enqueue_via_best_link(
        &self,
        dest: Instance,
        split_horizon: Option<DeviceId>,
        packet: Packet,
        on_failure: impl FnOnce(MeshError) + Send + 'static,
    ) {
        let table = Arc::clone(&self.table);
        let selector = move || table.best_link(dest, split_horizon.as_ref()).map(|link| link.next_hop().clone());
        self.io.add(IoPacket::new(packet, selector, || {}, on_failure));
    }

    // ---- §4.D.1 handshake and neighbor registration --------------------

    /// Registers the device before anything else runs, exactly as spec §9
    /// requires: an inbound handshake that somehow raced ahead of
    /// registration would otherwise be dropped as a protocol violation.
    pub fn on_device_available(self: &Arc<Self>, device: Device) {
        let device_id = device.id().clone();
        self.table.register(device.clone());
        self.io.register_device(device_id.clone());

        let internet_hops = self.local_internet_hops();
        let handshake = Packet::Handshake { sequence: self.sequence.generate(), originator: self.config.host(), internet_hops };
        let log_target = device_id.clone();
        let component = self.config.component().to_string();
        self.enqueue_to(device_id.clone(), handshake, move |err| {
            warn!("{component}: handshake to {log_target} failed: {err}");
        });

        self.dump_routing_table(&device_id);
    }

    fn local_internet_hops(&self) -> u8 {
        if self.has_direct_internet.load(Ordering::Relaxed) {
            return 0;
        }
        match self.table.best_internet_link_any(None) {
            Some(link) => link.internet_hop_count().saturating_add(1).min(HOP_COUNT_INFINITY),
            None => HOP_COUNT_INFINITY,
        }
    }

    /// Routing-table dump sent to a freshly handshaken device: one `Update`
    /// per destination already known, propagated one hop further out and
    /// with that device excluded as its own teacher (it can't be yet, but
    /// the split horizon call keeps this path identical to ordinary
    /// propagation).
    fn dump_routing_table(&self, new_device: &DeviceId) {
        for dest in self.table.destinations() {
            let Some(link) = self.table.best_link(dest, Some(new_device)) else { continue };
            let (hop_count, internet_hops) = link.propagated_metrics();
            if hop_count >= MAX_HOP_COUNT {
                continue;
            }
            let update =
                Packet::Update { sequence: self.sequence.generate(), instance: dest, hop_count, reachable: true, internet_hops };
            self.enqueue_to(new_device.clone(), update, |_err| {});
        }
    }

    pub fn on_device_lost(&self, device_id: DeviceId) {
        if let Some(device) = self.table.device(&device_id) {
            self.inbound.forget(device.stream_id());
        }
        self.table.unregister(&device_id);
        self.io.unregister_device(&device_id);
    }

    fn handle_handshake(&self, device_id: &DeviceId, originator: Instance, internet_hops: u8) {
        if self.table.device(device_id).is_none() {
            warn!("{}: protocol violation, handshake from unregistered device {device_id}", self.config.component());
            return;
        }
        self.table.register_or_update(device_id.clone(), originator, 1, internet_hops);
    }

    // ---- §4.D.2 update propagation --------------------------------------

    fn handle_update(&self, device_id: &DeviceId, instance: Instance, hop_count: u8, reachable: bool, internet_hops: u8) {
        if instance == self.config.host() {
            return;
        }
        // §9 open question: honor either signal as withdrawal on receive,
        // even though we only ever emit the infinity sentinel ourselves.
        let hop_count = if reachable { hop_count } else { HOP_COUNT_INFINITY };
        self.table.register_or_update(device_id.clone(), instance, hop_count, internet_hops);
    }

    // ---- §4.D.3 sending application data ---------------------------------

    pub fn send(self: &Arc<Self>, payload: Vec<u8>, destination: Instance) -> Ticket {
        let sequence = self.sequence.generate();
        let host = self.config.host();
        let ticket = Ticket::new(sequence, destination);
        let data = Packet::Data { sequence, origin: host, destination, payload };

        let table = Arc::clone(&self.table);
        let selector = move || table.best_link(destination, None).map(|link| link.next_hop().clone());

        let on_sent = Arc::clone(self);
        let on_fail = Arc::clone(self);
        self.io.add(IoPacket::new(
            data,
            selector,
            move || on_sent.notify_delegate(|d| d.on_sent(ticket)),
            move |err| on_fail.notify_delegate(|d| d.on_send_failure(ticket, err)),
        ));

        ticket
    }

    // ---- §4.D.4 relay, acknowledgement -----------------------------------

    fn handle_data(&self, previous_hop: &DeviceId, sequence: u16, origin: Instance, destination: Instance, payload: Vec<u8>) {
        if destination == self.config.host() {
            self.notify_delegate(|d| d.on_received(payload, origin));
            let ack = Packet::Ack { sequence, origin: self.config.host(), destination: origin };
            self.enqueue_via_best_link(origin, None, ack, |_err| {});
        } else {
            let data = Packet::Data { sequence, origin, destination, payload };
            self.enqueue_via_best_link(destination, Some(previous_hop.clone()), data, |_err| {});
        }
    }

    fn handle_ack(&self, previous_hop: &DeviceId, sequence: u16, origin: Instance, destination: Instance) {
        if destination == self.config.host() {
            let ticket = Ticket::new(sequence, origin);
            self.notify_delegate(|d| d.on_acknowledgement(ticket));
        } else {
            let ack = Packet::Ack { sequence, origin, destination };
            self.enqueue_via_best_link(destination, Some(previous_hop.clone()), ack, |_err| {});
        }
    }

    // ---- §4.D.5 Internet proxy flow --------------------------------------

    /// Tries a direct external call first; only falls back to the mesh on
    /// failure. Returns the sequence number assigned to this request so
    /// callers can correlate it with a later `on_internet_request_failure`.
    pub async fn send_internet(self: &Arc<Self>, url: String, body: Vec<u8>, test_id: u32) -> u16 {
        let sequence = self.sequence.generate();
        let host = self.config.host();
        let ctx = RequestContext { sequence, hop_count: 0, proxy: host, originator: host, test_id };

        match self.internet_client.call(&url, body.clone(), ctx).await {
            Ok((code, body)) => {
                self.has_direct_internet.store(true, Ordering::Relaxed);
                self.notify_internet_delegate(|d| d.on_internet_response(code, body));
            }
            Err(err) => {
                warn!("{}: direct internet call failed, falling back to mesh: {err}", self.config.component());
                let table = Arc::clone(&self.table);
                let selector = move || table.best_internet_link_any(None).map(|link| link.next_hop().clone());
                let packet = Packet::Internet { sequence, originator: host, url, body, test_id, hop_count: 0 };

                let on_fail = Arc::clone(self);
                self.io.add(IoPacket::new(packet, selector, || {}, move |_err| {
                    on_fail.notify_internet_delegate(|d| d.on_internet_request_failure(sequence));
                }));
            }
        }

        sequence
    }

    async fn handle_internet(
        self: Arc<Self>,
        previous_hop: DeviceId,
        sequence: u16,
        originator: Instance,
        url: String,
        body: Vec<u8>,
        test_id: u32,
        hop_count: u8,
    ) {
        let ctx = RequestContext { sequence, hop_count: hop_count.saturating_add(1), proxy: self.config.host(), originator, test_id };
        match self.internet_client.call(&url, body, ctx).await {
            Ok((code, body)) => {
                let response = Packet::InternetResponse { sequence: self.sequence.generate(), originator, code, body };
                if self.config.reverse_path_via_best_link() {
                    self.enqueue_via_best_link(originator, None, response, |_err| {});
                } else {
                    self.enqueue_to(previous_hop, response, |_err| {});
                }
            }
            Err(err) => {
                warn!("{}: proxy call on behalf of {originator} failed: {err}", self.config.component());
            }
        }
    }

    fn handle_internet_response(&self, previous_hop: &DeviceId, sequence: u16, originator: Instance, code: u16, body: Vec<u8>) {
        if originator == self.config.host() {
            self.notify_internet_delegate(|d| d.on_internet_response(code, body));
        } else {
            let response = Packet::InternetResponse { sequence, originator, code, body };
            self.enqueue_via_best_link(originator, Some(previous_hop.clone()), response, |_err| {});
        }
    }

    // ---- inbound entry point ---------------------------------------------

    pub fn on_packet_bytes(self: &Arc<Self>, stream_id: StreamId, bytes: &[u8]) {
        let this = Arc::clone(self);
        self.inbound.feed(stream_id, bytes, this.as_ref());
    }
}

impl<T, C> meshnet_io::InboundDelegate for NetworkController<T, C>
where
    T: Transport + 'static,
    C: InternetClient + 'static,
{
    fn on_packet(&self, stream_id: StreamId, packet: Packet) {
        let Some(device) = self.table.device_for_stream(&stream_id) else {
            warn!("{}: dropping packet from an unregistered stream", self.config.component());
            return;
        };
        let previous_hop = device.id().clone();

        match packet {
            Packet::Handshake { originator, internet_hops, .. } => self.handle_handshake(&previous_hop, originator, internet_hops),
            Packet::Update { instance, hop_count, reachable, internet_hops, .. } => {
                self.handle_update(&previous_hop, instance, hop_count, reachable, internet_hops)
            }
            Packet::Data { sequence, origin, destination, payload } => {
                self.handle_data(&previous_hop, sequence, origin, destination, payload)
            }
            Packet::Ack { sequence, origin, destination } => self.handle_ack(&previous_hop, sequence, origin, destination),
            Packet::Internet { sequence, originator, url, body, test_id, hop_count } => {
                let controller = self.arc_self();
                tokio::spawn(controller.handle_internet(previous_hop, sequence, originator, url, body, test_id, hop_count));
            }
            Packet::InternetResponse { sequence, originator, code, body } => {
                self.handle_internet_response(&previous_hop, sequence, originator, code, body)
            }
        }
    }

    fn on_protocol_violation(&self, stream_id: StreamId, error: MeshError) {
        warn!("{}: closing stream after protocol violation: {error}", self.config.component());
        if let Some(device) = self.table.device_for_stream(&stream_id) {
            let io = Arc::clone(&self.io);
            let device_id = device.id().clone();
            self.table.unregister(&device_id);
            self.io.unregister_device(&device_id);
            tokio::spawn(async move { io.close(&device_id).await });
        }
    }
}

impl<T, C> RoutingDelegate for NetworkController<T, C>
where
    T: Transport + 'static,
    C: InternetClient + 'static,
{
    fn instance_found(&self, instance: Instance) {
        self.notify_delegate(|d| d.on_instance_found(instance));
    }

    fn instance_lost(&self, instance: Instance, error: MeshError) {
        self.notify_delegate(|d| d.on_instance_lost(instance, error));
    }

    /// On a link change, synthesize an `Update` one hop further out and
    /// send it to every device *except* the one that taught us the route
    /// (split horizon), per §4.D.2. A withdrawal (`link.is_withdrawn()`)
    /// carries the raw `HOP_COUNT_INFINITY` sentinel instead of the
    /// incremented metric and bypasses the near-ceiling suppression below:
    /// that suppression exists to stop near-useless routes from
    /// circulating forever, not to swallow the notice that a route is gone.
    fn link_update(&self, link: Link) {
        let packet = if link.is_withdrawn() {
            Packet::Update {
                sequence: self.sequence.generate(),
                instance: link.destination(),
                hop_count: HOP_COUNT_INFINITY,
                reachable: true,
                internet_hops: HOP_COUNT_INFINITY,
            }
        } else {
            let (hop_count, internet_hops) = link.propagated_metrics();
            if hop_count >= MAX_HOP_COUNT {
                return;
            }
            Packet::Update { sequence: self.sequence.generate(), instance: link.destination(), hop_count, reachable: true, internet_hops }
        };

        for device in self.table.devices() {
            if device.id() == link.next_hop() {
                continue;
            }
            self.enqueue_to(device.id().clone(), packet.clone(), |_err| {});
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use meshnet_io::InboundDelegate;
    use meshnet_routing::{DeviceId, StreamId};

    fn inst(b: u8) -> Instance {
        Instance::from_bytes([b; 16])
    }

    struct InMemoryTransport {
        writes: StdMutex<Vec<(DeviceId, Vec<u8>)>>,
    }

    impl InMemoryTransport {
        fn new() -> Self {
            Self { writes: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Transport for InMemoryTransport {
        async fn write(&self, device: &DeviceId, bytes: Vec<u8>) -> Result<(), MeshError> {
            self.writes.lock().unwrap().push((device.clone(), bytes));
            Ok(())
        }
        async fn close(&self, _device: &DeviceId) {}
    }

    struct NeverCallInternet;

    #[async_trait]
    impl InternetClient for NeverCallInternet {
        async fn call(&self, _url: &str, _body: Vec<u8>, _ctx: RequestContext) -> Result<(u16, Vec<u8>), MeshError> {
            Err(MeshError::external_http_failure("no direct connectivity in test"))
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        found: StdMutex<Vec<Instance>>,
        received: StdMutex<Vec<(Vec<u8>, Instance)>>,
        sent: StdMutex<Vec<Ticket>>,
        acked: StdMutex<Vec<Ticket>>,
        failed: StdMutex<Vec<(Ticket, MeshError)>>,
    }

    impl Delegate for RecordingDelegate {
        fn on_instance_found(&self, instance: Instance) {
            self.found.lock().unwrap().push(instance);
        }
        fn on_instance_lost(&self, _instance: Instance, _error: MeshError) {}
        fn on_received(&self, payload: Vec<u8>, origin: Instance) {
            self.received.lock().unwrap().push((payload, origin));
        }
        fn on_sent(&self, ticket: Ticket) {
            self.sent.lock().unwrap().push(ticket);
        }
        fn on_send_failure(&self, ticket: Ticket, error: MeshError) {
            self.failed.lock().unwrap().push((ticket, error));
        }
        fn on_acknowledgement(&self, ticket: Ticket) {
            self.acked.lock().unwrap().push(ticket);
        }
    }

    fn new_controller(
        host: Instance,
    ) -> (Arc<NetworkController<InMemoryTransport, NeverCallInternet>>, Arc<InMemoryTransport>, Arc<RecordingDelegate>) {
        let transport = Arc::new(InMemoryTransport::new());
        let io = IoController::new(Arc::clone(&transport));
        let controller = NetworkController::new(NetworkConfig::new(host), io, Arc::new(NeverCallInternet));
        let delegate = Arc::new(RecordingDelegate::default());
        controller.set_delegate(Arc::downgrade(&delegate) as Weak<dyn Delegate>);
        (controller, transport, delegate)
    }

    fn dev(id: &str) -> Device {
        Device::new(DeviceId::new(id), StreamId::new(id))
    }

    #[tokio::test]
    async fn handshake_emits_exactly_one_frame_and_registers_the_peer() {
        let (controller, transport, _delegate) = new_controller(inst(0));
        controller.on_device_available(dev("b"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let writes = transport.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let packet = meshnet_proto::decode(&writes[0].1).unwrap();
        assert!(matches!(packet, Packet::Handshake { internet_hops, .. } if internet_hops == HOP_COUNT_INFINITY));
    }

    #[tokio::test]
    async fn receiving_a_handshake_populates_the_routing_table_with_hop_count_one() {
        let (controller, _transport, delegate) = new_controller(inst(0));
        controller.on_device_available(dev("b"));

        let handshake = Packet::Handshake { sequence: 0, originator: inst(1), internet_hops: HOP_COUNT_INFINITY };
        controller.on_packet(StreamId::new("b"), handshake);

        assert_eq!(delegate.found.lock().unwrap().as_slice(), &[inst(1)]);
        let link = controller.routing_table().best_link(inst(1), None).unwrap();
        assert_eq!(link.hop_count(), 1);
    }

    #[tokio::test]
    async fn data_destined_locally_is_delivered_and_acked() {
        let (controller, transport, delegate) = new_controller(inst(0));
        controller.on_device_available(dev("b"));
        controller.routing_table().register_or_update(DeviceId::new("b"), inst(1), 1, 0);

        controller.on_packet(
            StreamId::new("b"),
            Packet::Data { sequence: 5, origin: inst(1), destination: inst(0), payload: b"hi".to_vec() },
        );
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(delegate.received.lock().unwrap().as_slice(), &[(b"hi".to_vec(), inst(1))]);
        let writes = transport.writes.lock().unwrap();
        let ack = writes.iter().find_map(|(_, bytes)| match meshnet_proto::decode(bytes) {
            Ok(Packet::Ack { sequence, .. }) => Some(sequence),
            _ => None,
        });
        assert_eq!(ack, Some(5));
    }

    #[tokio::test]
    async fn data_for_another_destination_is_relayed_with_split_horizon() {
        let (controller, transport, _delegate) = new_controller(inst(0));
        controller.on_device_available(dev("a"));
        controller.on_device_available(dev("c"));
        controller.routing_table().register_or_update(DeviceId::new("c"), inst(2), 1, 0);

        controller.on_packet(
            StreamId::new("a"),
            Packet::Data { sequence: 1, origin: inst(9), destination: inst(2), payload: b"relay".to_vec() },
        );
        tokio::time::sleep(Duration::from_millis(10)).await;

        let writes = transport.writes.lock().unwrap();
        let relayed_to_c = writes.iter().any(|(device, bytes)| {
            device == &DeviceId::new("c") && matches!(meshnet_proto::decode(bytes), Ok(Packet::Data { .. }))
        });
        assert!(relayed_to_c);
    }

    #[tokio::test]
    async fn send_with_no_route_fails_with_no_route() {
        let (controller, _transport, delegate) = new_controller(inst(0));
        let ticket = controller.send(b"x".to_vec(), inst(9));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let failed = delegate.failed.lock().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, ticket);
        assert!(matches!(failed[0].1, MeshError::NoRoute));
    }

    #[tokio::test]
    async fn send_then_ack_reuses_the_same_ticket() {
        let (controller, _transport, delegate) = new_controller(inst(0));
        controller.on_device_available(dev("b"));
        controller.routing_table().register_or_update(DeviceId::new("b"), inst(1), 1, 0);

        let ticket = controller.send(b"x".to_vec(), inst(1));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(delegate.sent.lock().unwrap().as_slice(), &[ticket]);

        controller.on_packet(StreamId::new("b"), Packet::Ack { sequence: ticket.sequence(), origin: inst(1), destination: inst(0) });
        assert_eq!(delegate.acked.lock().unwrap().as_slice(), &[ticket]);
    }

    #[tokio::test]
    async fn link_update_is_not_sent_back_over_the_teaching_device() {
        let (controller, transport, _delegate) = new_controller(inst(0));
        controller.on_device_available(dev("a"));
        controller.on_device_available(dev("b"));
        transport.writes.lock().unwrap().clear();

        controller.routing_table().register_or_update(DeviceId::new("b"), inst(2), 1, 0);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let writes = transport.writes.lock().unwrap();
        assert!(writes.iter().all(|(device, _)| device != &DeviceId::new("b")));
        assert!(writes.iter().any(|(device, _)| device == &DeviceId::new("a")));
    }

    #[tokio::test]
    async fn losing_a_device_broadcasts_a_withdrawal_update_to_surviving_neighbors() {
        let (controller, transport, _delegate) = new_controller(inst(0));
        controller.on_device_available(dev("a"));
        controller.on_device_available(dev("c"));
        controller.routing_table().register_or_update(DeviceId::new("c"), inst(2), 1, 0);
        transport.writes.lock().unwrap().clear();

        controller.on_device_lost(DeviceId::new("c"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let writes = transport.writes.lock().unwrap();
        let withdrawal = writes.iter().find_map(|(device, bytes)| match meshnet_proto::decode(bytes) {
            Ok(Packet::Update { instance, hop_count, .. }) if instance == inst(2) => Some((device.clone(), hop_count)),
            _ => None,
        });
        assert_eq!(withdrawal, Some((DeviceId::new("a"), HOP_COUNT_INFINITY)));
        assert!(writes.iter().all(|(device, _)| device != &DeviceId::new("c")));
    }

    #[tokio::test]
    async fn update_with_hop_count_at_ceiling_is_suppressed() {
        let (controller, transport, _delegate) = new_controller(inst(0));
        controller.on_device_available(dev("a"));
        transport.writes.lock().unwrap().clear();

        controller.routing_table().register_or_update(DeviceId::new("a"), inst(2), MAX_HOP_COUNT, 0);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(transport.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ticket_identity_survives_failure_then_is_distinct_per_send() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (controller, _transport, delegate) = new_controller(inst(0));
        let _ = counter;
        let first = controller.send(b"a".to_vec(), inst(9));
        let second = controller.send(b"b".to_vec(), inst(9));
        assert_ne!(first.sequence(), second.sequence());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(delegate.failed.lock().unwrap().len(), 2);
    }
}
