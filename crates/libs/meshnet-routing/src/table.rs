use std::collections::BTreeMap;
use std::sync::{Mutex, Weak};

use log::{debug, trace, warn};

use crate::device::{Device, DeviceId, StreamId};
use crate::error::MeshError;
use crate::instance::Instance;
use crate::link::{Link, HOP_COUNT_INFINITY};

/// Receives routing-table events. Held non-owning (`Weak`) by the table: a
/// delegate that has been dropped between an event firing and the table
/// reading it back is treated as "not listening" and the notification is
/// silently skipped, matching the source's weak-reference semantics.
pub trait RoutingDelegate: Send + Sync {
    fn instance_found(&self, instance: Instance);
    fn instance_lost(&self, instance: Instance, error: MeshError);
    fn link_update(&self, link: Link);
}

struct Inner {
    destinations: BTreeMap<Instance, BTreeMap<DeviceId, Link>>,
    devices: BTreeMap<DeviceId, Device>,
    input_stream_index: BTreeMap<String, DeviceId>,
}

/// Per-destination multi-link store and best-path selector.
///
/// All operations run synchronously under an internal `std::sync::Mutex`
/// and never suspend — they're meant to run on the "main context" described
/// in the network controller's concurrency model, where no routing-table
/// operation is allowed to block on I/O.
pub struct RoutingTable {
    host: Instance,
    inner: Mutex<Inner>,
    delegate: Mutex<Option<Weak<dyn RoutingDelegate>>>,
}

impl RoutingTable {
    pub fn new(host: Instance) -> Self {
        Self {
            host,
            inner: Mutex::new(Inner {
                destinations: BTreeMap::new(),
                devices: BTreeMap::new(),
                input_stream_index: BTreeMap::new(),
            }),
            delegate: Mutex::new(None),
        }
    }

    pub fn host(&self) -> Instance {
        self.host
    }

    pub fn set_delegate(&self, delegate: Weak<dyn RoutingDelegate>) {
        *self.delegate.lock().expect("routing table delegate lock poisoned") = Some(delegate);
    }

    fn notify(&self, f: impl FnOnce(&dyn RoutingDelegate)) {
        let delegate = self.delegate.lock().expect("routing table delegate lock poisoned").clone();
        if let Some(delegate) = delegate.and_then(|d| d.upgrade()) {
            f(delegate.as_ref());
        }
    }

    /// Register a newly available device. No link is created yet; the
    /// caller (the network controller) drives handshake/update traffic
    /// that eventually populates links for this device.
    pub fn register(&self, device: Device) {
        let mut inner = self.inner.lock().expect("routing table lock poisoned");
        inner.input_stream_index.insert(device.stream_id().as_str().to_string(), device.id().clone());
        inner.devices.insert(device.id().clone(), device);
    }

    /// Remove a device and every link that routed through it. A
    /// destination whose link set becomes empty as a result is reported
    /// lost.
    pub fn unregister(&self, device_id: &DeviceId) {
        let mut lost = Vec::new();
        {
            let mut inner = self.inner.lock().expect("routing table lock poisoned");
            if let Some(device) = inner.devices.remove(device_id) {
                inner.input_stream_index.remove(device.stream_id().as_str());
            }
            inner.destinations.retain(|dest, links| {
                links.remove(device_id);
                if links.is_empty() {
                    lost.push(*dest);
                    false
                } else {
                    true
                }
            });
        }
        for dest in lost {
            debug!("routing: {dest} lost (last link via {device_id} withdrawn)");
            self.notify(|d| d.instance_lost(dest, MeshError::Unreachable(dest)));
            self.notify(|d| d.link_update(Link::new(dest, device_id.clone(), HOP_COUNT_INFINITY, HOP_COUNT_INFINITY)));
        }
    }

    /// Insert or update a link learned from `next_hop` advertising
    /// `dest` at the given metrics. Emits `instance_found`/`link_update`/
    /// `instance_lost` exactly as specified by the distance-vector state
    /// machine.
    pub fn register_or_update(&self, next_hop: DeviceId, dest: Instance, hop_count: u8, internet_hops: u8) {
        if dest == self.host {
            warn!("routing: refusing to learn a route to the host instance via {next_hop}");
            return;
        }

        if hop_count >= HOP_COUNT_INFINITY {
            self.withdraw(next_hop, dest);
            return;
        }

        let link = Link::new(dest, next_hop.clone(), hop_count, internet_hops);

        enum Outcome {
            Found,
            Updated,
            Unchanged,
        }

        let outcome = {
            let mut inner = self.inner.lock().expect("routing table lock poisoned");
            let links = inner.destinations.entry(dest).or_default();
            let is_new_destination = links.is_empty();
            match links.get(&next_hop) {
                Some(existing) if *existing == link => Outcome::Unchanged,
                _ => {
                    links.insert(next_hop.clone(), link.clone());
                    if is_new_destination {
                        Outcome::Found
                    } else {
                        Outcome::Updated
                    }
                }
            }
        };

        match outcome {
            Outcome::Unchanged => {}
            Outcome::Found => {
                trace!("routing: {dest} first seen via {next_hop} ({hop_count} hops)");
                self.notify(|d| d.instance_found(dest));
                self.notify(|d| d.link_update(link));
            }
            Outcome::Updated => {
                trace!("routing: {dest} via {next_hop} now {hop_count} hops");
                self.notify(|d| d.link_update(link));
            }
        }
    }

    /// Treat `hop_count >= HOP_COUNT_INFINITY` (or an explicit withdrawal)
    /// as removing the `(dest, next_hop)` link.
    fn withdraw(&self, next_hop: DeviceId, dest: Instance) {
        let now_empty = {
            let mut inner = self.inner.lock().expect("routing table lock poisoned");
            match inner.destinations.get_mut(&dest) {
                Some(links) => {
                    links.remove(&next_hop);
                    links.is_empty()
                }
                None => return,
            }
        };
        if now_empty {
            let mut inner = self.inner.lock().expect("routing table lock poisoned");
            inner.destinations.remove(&dest);
            drop(inner);
            debug!("routing: {dest} lost (withdrawn via {next_hop})");
            self.notify(|d| d.instance_lost(dest, MeshError::Unreachable(dest)));
            self.notify(|d| d.link_update(Link::new(dest, next_hop.clone(), HOP_COUNT_INFINITY, HOP_COUNT_INFINITY)));
        }
    }

    /// Best link to `dest`, excluding any link whose next hop is
    /// `split_horizon` — the device a packet being forwarded/advertised
    /// arrived on. Ties break on the lexicographically lowest next-hop
    /// device id for determinism.
    pub fn best_link(&self, dest: Instance, split_horizon: Option<&DeviceId>) -> Option<Link> {
        let inner = self.inner.lock().expect("routing table lock poisoned");
        let links = inner.destinations.get(&dest)?;
        links
            .values()
            .filter(|link| Some(link.next_hop()) != split_horizon)
            .min_by(|a, b| a.hop_count().cmp(&b.hop_count()).then_with(|| a.next_hop().cmp(b.next_hop())))
            .cloned()
    }

    /// The best Internet link across *all* known destinations — used when
    /// the host needs "some peer with external connectivity", not a route
    /// to a particular instance.
    pub fn best_internet_link_any(&self, split_horizon: Option<&DeviceId>) -> Option<Link> {
        let inner = self.inner.lock().expect("routing table lock poisoned");
        inner
            .destinations
            .values()
            .flat_map(|links| links.values())
            .filter(|link| Some(link.next_hop()) != split_horizon && link.internet_hop_count() < HOP_COUNT_INFINITY)
            .min_by(|a, b| {
                a.internet_hop_count().cmp(&b.internet_hop_count()).then_with(|| a.next_hop().cmp(b.next_hop()))
            })
            .cloned()
    }

    pub fn device_for_stream(&self, stream_id: &StreamId) -> Option<Device> {
        let inner = self.inner.lock().expect("routing table lock poisoned");
        let device_id = inner.input_stream_index.get(stream_id.as_str())?;
        inner.devices.get(device_id).cloned()
    }

    pub fn device(&self, device_id: &DeviceId) -> Option<Device> {
        let inner = self.inner.lock().expect("routing table lock poisoned");
        inner.devices.get(device_id).cloned()
    }

    /// Every device currently registered, for handshake/update fan-out.
    pub fn devices(&self) -> Vec<Device> {
        let inner = self.inner.lock().expect("routing table lock poisoned");
        inner.devices.values().cloned().collect()
    }

    /// Every destination currently known, for the routing-table dump sent
    /// to a newly handshaken device.
    pub fn destinations(&self) -> Vec<Instance> {
        let inner = self.inner.lock().expect("routing table lock poisoned");
        inner.destinations.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    fn inst(b: u8) -> Instance {
        Instance::from_bytes([b; 16])
    }

    fn dev(id: &str) -> Device {
        Device::new(DeviceId::new(id), StreamId::new(id))
    }

    #[derive(Default)]
    struct RecordingDelegate {
        found: StdMutex<Vec<Instance>>,
        lost: StdMutex<Vec<Instance>>,
        updates: StdMutex<Vec<Link>>,
    }

    impl RoutingDelegate for RecordingDelegate {
        fn instance_found(&self, instance: Instance) {
            self.found.lock().unwrap().push(instance);
        }
        fn instance_lost(&self, instance: Instance, _error: MeshError) {
            self.lost.lock().unwrap().push(instance);
        }
        fn link_update(&self, link: Link) {
            self.updates.lock().unwrap().push(link);
        }
    }

    fn table_with_delegate() -> (RoutingTable, Arc<RecordingDelegate>) {
        let table = RoutingTable::new(inst(0));
        let delegate = Arc::new(RecordingDelegate::default());
        table.set_delegate(Arc::downgrade(&delegate) as Weak<dyn RoutingDelegate>);
        (table, delegate)
    }

    #[test]
    fn register_or_update_emits_found_then_link_update() {
        let (table, delegate) = table_with_delegate();
        table.register(dev("b"));
        table.register_or_update(DeviceId::new("b"), inst(1), 1, HOP_COUNT_INFINITY);

        assert_eq!(delegate.found.lock().unwrap().as_slice(), &[inst(1)]);
        assert_eq!(delegate.updates.lock().unwrap().len(), 1);
        assert_eq!(table.best_link(inst(1), None).unwrap().hop_count(), 1);
    }

    #[test]
    fn identical_metrics_are_a_noop() {
        let (table, delegate) = table_with_delegate();
        table.register(dev("b"));
        table.register_or_update(DeviceId::new("b"), inst(1), 2, 3);
        table.register_or_update(DeviceId::new("b"), inst(1), 2, 3);
        assert_eq!(delegate.updates.lock().unwrap().len(), 1);
    }

    #[test]
    fn host_as_destination_is_rejected() {
        let (table, delegate) = table_with_delegate();
        table.register(dev("b"));
        table.register_or_update(DeviceId::new("b"), inst(0), 1, 0);
        assert!(delegate.found.lock().unwrap().is_empty());
        assert!(table.best_link(inst(0), None).is_none());
    }

    #[test]
    fn infinity_hop_count_withdraws_and_emits_lost_when_last_link() {
        let (table, delegate) = table_with_delegate();
        table.register(dev("b"));
        table.register_or_update(DeviceId::new("b"), inst(1), 3, 0);
        table.register_or_update(DeviceId::new("b"), inst(1), HOP_COUNT_INFINITY, 0);

        assert!(table.best_link(inst(1), None).is_none());
        assert_eq!(delegate.lost.lock().unwrap().as_slice(), &[inst(1)]);
    }

    #[test]
    fn best_link_ties_break_on_lowest_device_id() {
        let (table, _delegate) = table_with_delegate();
        table.register(dev("b"));
        table.register(dev("a"));
        table.register_or_update(DeviceId::new("b"), inst(1), 2, 0);
        table.register_or_update(DeviceId::new("a"), inst(1), 2, 0);

        let best = table.best_link(inst(1), None).unwrap();
        assert_eq!(best.next_hop(), &DeviceId::new("a"));
    }

    #[test]
    fn split_horizon_excludes_the_teaching_device() {
        let (table, _delegate) = table_with_delegate();
        table.register(dev("b"));
        table.register_or_update(DeviceId::new("b"), inst(1), 1, 0);
        assert!(table.best_link(inst(1), Some(&DeviceId::new("b"))).is_none());
    }

    #[test]
    fn unregister_drops_links_and_emits_lost() {
        let (table, delegate) = table_with_delegate();
        table.register(dev("b"));
        table.register_or_update(DeviceId::new("b"), inst(1), 1, 0);
        table.unregister(&DeviceId::new("b"));
        assert!(table.best_link(inst(1), None).is_none());
        assert_eq!(delegate.lost.lock().unwrap().as_slice(), &[inst(1)]);
    }

    #[test]
    fn unregister_of_the_last_link_also_emits_a_withdrawal_link_update() {
        let (table, delegate) = table_with_delegate();
        table.register(dev("b"));
        table.register_or_update(DeviceId::new("b"), inst(1), 1, 0);
        delegate.updates.lock().unwrap().clear();

        table.unregister(&DeviceId::new("b"));

        let updates = delegate.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_withdrawn());
    }

    #[test]
    fn withdrawal_via_infinity_hop_count_also_emits_a_link_update() {
        let (table, delegate) = table_with_delegate();
        table.register(dev("b"));
        table.register_or_update(DeviceId::new("b"), inst(1), 3, 0);
        delegate.updates.lock().unwrap().clear();

        table.register_or_update(DeviceId::new("b"), inst(1), HOP_COUNT_INFINITY, 0);

        let updates = delegate.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_withdrawn());
    }

    #[test]
    fn withdrawing_one_of_several_links_does_not_emit_instance_lost_or_link_update() {
        let (table, delegate) = table_with_delegate();
        table.register(dev("a"));
        table.register(dev("b"));
        table.register_or_update(DeviceId::new("a"), inst(1), 2, 0);
        table.register_or_update(DeviceId::new("b"), inst(1), 2, 0);
        delegate.updates.lock().unwrap().clear();

        table.register_or_update(DeviceId::new("b"), inst(1), HOP_COUNT_INFINITY, 0);

        assert!(table.best_link(inst(1), None).is_some());
        assert!(delegate.lost.lock().unwrap().is_empty());
        assert!(delegate.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn device_for_stream_resolves_through_index() {
        let (table, _delegate) = table_with_delegate();
        table.register(dev("b"));
        let found = table.device_for_stream(&StreamId::new("b")).unwrap();
        assert_eq!(found.id(), &DeviceId::new("b"));
    }
}
