//! Network discovery through node profile instance lists.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::device::{DeviceListener, EchonetObject};
use crate::key::InstanceKey;
use crate::protocol::{CONTROLLER_EOJ, Esv, MessageBuilder, multicast_address};
use crate::registry::DeviceClass;
use crate::registry::classes::{INSTANCE_LIST_NOTIFICATION, NODE_PROFILE, SELF_NODE_INSTANCE_LIST};
use crate::state::State;
use crate::transport::TransactionIds;

/// Notified when a discovered device has finished initialising.
pub trait DiscoveryListener: Send + Sync {
    fn device_found(&self, identifier: &str, key: &InstanceKey, class: &'static DeviceClass);

    /// Listener attached to a newly discovered device. `None` means only
    /// [`device_found`](Self::device_found) is reported.
    fn device_listener(&self, _key: &InstanceKey) -> Option<Box<dyn DeviceListener>> {
        None
    }
}

impl DiscoveryListener for crate::device::ChannelListener {
    fn device_found(&self, identifier: &str, key: &InstanceKey, class: &'static DeviceClass) {
        self.found(identifier, key, class);
    }

    fn device_listener(&self, key: &InstanceKey) -> Option<Box<dyn DeviceListener>> {
        Some(Box::new(self.for_key(*key)))
    }
}

/// The key every discovery request is addressed to: node profile instance 1
/// on the multicast group.
pub fn discovery_key() -> InstanceKey {
    InstanceKey::new(multicast_address(), NODE_PROFILE.code, 1)
}

/// Pseudo-device bound to [`discovery_key`].
///
/// While active it multicasts a GET of the self-node instance list every
/// interval and collects the (group, class, instance) triples that come back.
#[derive(Debug)]
pub struct ProfileNode {
    key: InstanceKey,
    active: bool,
    interval: Duration,
    last_request: Option<Instant>,
    last_tid: Option<u16>,
    found: Vec<InstanceKey>,
}

impl ProfileNode {
    pub fn new(interval: Duration) -> Self {
        Self {
            key: discovery_key(),
            active: false,
            interval,
            last_request: None,
            last_tid: None,
            found: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start(&mut self) {
        if !self.active {
            tracing::info!("Discovery started");
        }
        self.active = true;
        self.last_request = None;
    }

    pub fn stop(&mut self) {
        if self.active {
            tracing::info!("Discovery stopped");
        }
        self.active = false;
        self.found.clear();
    }

    /// Objects announced since the last call.
    pub fn take_discovered(&mut self) -> Vec<InstanceKey> {
        std::mem::take(&mut self.found)
    }

    fn apply_instance_list(&mut self, source: &InstanceKey, edt: &[u8]) {
        let Some((&count, triples)) = edt.split_first() else {
            tracing::debug!("Empty instance list from {}", source.address);
            return;
        };

        let mut chunks = triples.chunks_exact(3);
        for eoj in chunks.by_ref().take(count as usize) {
            let key = InstanceKey::new(
                source.address,
                crate::key::ClassCode::new(eoj[0], eoj[1]),
                eoj[2],
            );
            tracing::debug!("Node {} announced {}", source.address, key);
            if !self.found.contains(&key) {
                self.found.push(key);
            }
        }

        let listed = triples.len() / 3;
        if listed < count as usize {
            tracing::debug!(
                "Instance list from {} declares {} objects but carries {}",
                source.address,
                count,
                listed
            );
        }
    }
}

impl EchonetObject for ProfileNode {
    fn key(&self) -> &InstanceKey {
        &self.key
    }

    fn apply_property(&mut self, source: &InstanceKey, esv: Esv, epc: u8, edt: &[u8]) {
        if !self.active || !esv.carries_values() {
            return;
        }
        match epc {
            SELF_NODE_INSTANCE_LIST | INSTANCE_LIST_NOTIFICATION => self.apply_instance_list(source, edt),
            _ => tracing::trace!("Discovery ignoring 0x{:02X} from {}", epc, source.address),
        }
    }

    fn apply_header(&mut self, esv: Esv, tid: u16, _now: Instant) -> bool {
        // Every node answers the same multicast request, so a tid match is
        // only informative.
        if esv.is_get_response() && self.last_tid != Some(tid) {
            tracing::trace!("Discovery reply tid={} (last request {:?})", tid, self.last_tid);
        }
        true
    }

    fn build_poll_message(&mut self, builder: &mut MessageBuilder, tids: &mut TransactionIds, now: Instant) -> bool {
        if !self.active {
            return false;
        }
        if let Some(last) = self.last_request {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }

        let tid = tids.next_tid();
        builder
            .start(tid, CONTROLLER_EOJ, self.key.eoj(), Esv::Get)
            .append_epc_request(SELF_NODE_INSTANCE_LIST);
        self.last_request = Some(now);
        self.last_tid = Some(tid);
        tracing::debug!("Discovery request tid={}", tid);
        true
    }

    fn build_update_message(&mut self, _builder: &mut MessageBuilder, _tids: &mut TransactionIds, _now: Instant) -> bool {
        false
    }

    fn check_timeouts(&mut self, _now: Instant) {}

    fn refresh_all(&mut self, _now: Instant) {}
}

/// Device listener for discovered devices: reports `device_found` on
/// initialisation and forwards everything else to an optional inner listener.
pub(crate) struct FoundForwarder {
    discovery: Arc<dyn DiscoveryListener>,
    class: &'static DeviceClass,
    inner: Option<Box<dyn DeviceListener>>,
}

impl FoundForwarder {
    pub(crate) fn new(discovery: Arc<dyn DiscoveryListener>, key: &InstanceKey, class: &'static DeviceClass) -> Self {
        let inner = discovery.device_listener(key);
        Self {
            discovery,
            class,
            inner,
        }
    }
}

impl DeviceListener for FoundForwarder {
    fn on_initialised(&mut self, identifier: &str, key: &InstanceKey, channels: &[&'static str]) {
        self.discovery.device_found(identifier, key, self.class);
        if let Some(inner) = self.inner.as_mut() {
            inner.on_initialised(identifier, key, channels);
        }
    }

    fn on_updated(&mut self, channel: &'static str, state: &State) {
        if let Some(inner) = self.inner.as_mut() {
            inner.on_updated(channel, state);
        }
    }

    fn on_removed(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.on_removed();
        }
    }

    fn on_offline(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.on_offline();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ClassCode;
    use crate::protocol::EchonetMessage;
    use std::net::SocketAddr;

    fn node_source() -> InstanceKey {
        let addr: SocketAddr = "192.168.1.30:3610".parse().unwrap();
        InstanceKey::new(addr, NODE_PROFILE.code, 1)
    }

    #[test]
    fn test_poll_respects_interval_and_activity() {
        let t0 = Instant::now();
        let mut tids = TransactionIds::starting_at(7);
        let mut builder = MessageBuilder::new();
        let mut node = ProfileNode::new(Duration::from_secs(10));

        assert!(!node.build_poll_message(&mut builder, &mut tids, t0));
        node.start();
        assert!(node.build_poll_message(&mut builder, &mut tids, t0));

        let mut msg = EchonetMessage::parse(builder.as_bytes()).unwrap();
        assert_eq!(msg.tid(), 7);
        assert_eq!(msg.deoj(), [0x0E, 0xF0, 0x01]);
        assert_eq!(msg.esv(), Some(Esv::Get));
        assert!(msg.move_next());
        assert_eq!(msg.current_epc(), SELF_NODE_INSTANCE_LIST);
        assert!(!msg.move_next());

        assert!(!node.build_poll_message(&mut builder, &mut tids, t0 + Duration::from_secs(5)));
        assert!(node.build_poll_message(&mut builder, &mut tids, t0 + Duration::from_secs(10)));
        assert_eq!(node.key().address, multicast_address());
    }

    #[test]
    fn test_instance_list_yields_keys() {
        let mut node = ProfileNode::new(Duration::from_secs(10));
        node.start();

        let edt = [2, 0x01, 0x30, 0x01, 0x01, 0x35, 0x02];
        node.apply_property(&node_source(), Esv::GetRes, SELF_NODE_INSTANCE_LIST, &edt);
        // Repeated announcements do not duplicate.
        node.apply_property(&node_source(), Esv::Inf, INSTANCE_LIST_NOTIFICATION, &edt);

        let found = node.take_discovered();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].class, ClassCode::new(0x01, 0x30));
        assert_eq!(found[1].instance, 2);
        assert_eq!(found[0].address, node_source().address);
        assert!(node.take_discovered().is_empty());
    }

    #[test]
    fn test_truncated_instance_list() {
        let mut node = ProfileNode::new(Duration::from_secs(10));
        node.start();
        node.apply_property(&node_source(), Esv::GetRes, SELF_NODE_INSTANCE_LIST, &[3, 0x01, 0x30, 0x01, 0x01]);
        assert_eq!(node.take_discovered().len(), 1);
        node.apply_property(&node_source(), Esv::GetRes, SELF_NODE_INSTANCE_LIST, &[]);
        assert!(node.take_discovered().is_empty());
    }

    #[test]
    fn test_inactive_node_ignores_traffic() {
        let mut node = ProfileNode::new(Duration::from_secs(10));
        node.apply_property(&node_source(), Esv::GetRes, SELF_NODE_INSTANCE_LIST, &[1, 0x01, 0x30, 0x01]);
        assert!(node.take_discovered().is_empty());
    }
}
