//! Per-device protocol state
//!
//! A [`Device`] tracks which properties still need reading, which writes are
//! waiting to go out, and the last decoded value of every property. GET and
//! SET traffic each have their own in-flight slot, so a slow write never
//! blocks polling and vice versa.

mod inflight;
mod listener;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use inflight::{InflightRequest, ResponseMatch};
pub use listener::{ChannelListener, DeviceEvent, DeviceListener};

use crate::error::{CodecError, Error, Result};
use crate::key::InstanceKey;
use crate::protocol::{CONTROLLER_EOJ, Esv, MessageBuilder};
use crate::registry::classes::{GET_PROPERTY_MAP, IDENTIFICATION_NUMBER};
use crate::registry::{DeviceClass, Property, PropertyRegistry, parse_property_map};
use crate::state::State;
use crate::transport::TransactionIds;

/// Operations the reactor drives on every addressable object.
///
/// Implemented by [`Device`] and by the discovery node.
pub trait EchonetObject {
    fn key(&self) -> &InstanceKey;

    /// Consume one property entry of an inbound frame.
    fn apply_property(&mut self, source: &InstanceKey, esv: Esv, epc: u8, edt: &[u8]);

    /// Correlate the frame header with the in-flight slots.
    ///
    /// Called once per frame, before its properties. Returns `false` when the
    /// frame is a stale or unsolicited response whose properties must be
    /// ignored.
    fn apply_header(&mut self, esv: Esv, tid: u16, now: Instant) -> bool;

    /// Write a GET for everything still unread. Returns `false` when there is
    /// nothing to send or a GET is already in flight.
    fn build_poll_message(&mut self, builder: &mut MessageBuilder, tids: &mut TransactionIds, now: Instant) -> bool;

    /// Write a SetC for every pending write. Same contract as
    /// [`build_poll_message`](Self::build_poll_message).
    fn build_update_message(&mut self, builder: &mut MessageBuilder, tids: &mut TransactionIds, now: Instant) -> bool;

    fn check_timeouts(&mut self, now: Instant);

    /// Re-queue every readable property once the poll interval has elapsed.
    fn refresh_all(&mut self, now: Instant);
}

/// Timing knobs for one device.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSettings {
    pub poll_interval: Duration,
    pub retry_timeout: Duration,
    /// Consecutive GET timeouts before the device is reported offline.
    pub offline_after: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            retry_timeout: Duration::from_secs(2),
            offline_after: 3,
        }
    }
}

pub struct Device {
    key: InstanceKey,
    class: &'static DeviceClass,
    registry: Arc<PropertyRegistry>,
    listener: Box<dyn DeviceListener>,
    settings: DeviceSettings,

    pending_gets: BTreeSet<u8>,
    /// Insertion ordered; a second write to the same code replaces the value in place.
    pending_sets: Vec<(u8, State)>,
    state_fields: BTreeMap<u8, State>,
    /// Readable, registered codes from the device's GET property map.
    readable: Option<BTreeSet<u8>>,

    inflight_get: InflightRequest,
    inflight_set: InflightRequest,
    /// Values carried by the most recent SetC, for acknowledgement matching.
    sent_values: Vec<(u8, State)>,

    last_refresh: Instant,
    initialised: bool,
    offline: bool,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("key", &self.key)
            .field("class", &self.class.name)
            .field("pending_gets", &self.pending_gets)
            .field("pending_sets", &self.pending_sets)
            .field("initialised", &self.initialised)
            .field("offline", &self.offline)
            .finish()
    }
}

impl Device {
    /// Create a device and queue a read of its GET property map.
    pub fn new(
        key: InstanceKey,
        registry: Arc<PropertyRegistry>,
        listener: Box<dyn DeviceListener>,
        settings: DeviceSettings,
        now: Instant,
    ) -> Result<Self> {
        let class = registry.class(key.class)?;
        let mut pending_gets = BTreeSet::new();
        pending_gets.insert(GET_PROPERTY_MAP);

        Ok(Self {
            key,
            class,
            registry,
            listener,
            settings,
            pending_gets,
            pending_sets: Vec::new(),
            state_fields: BTreeMap::new(),
            readable: None,
            inflight_get: InflightRequest::new("GET", settings.retry_timeout),
            inflight_set: InflightRequest::new("SET", settings.retry_timeout),
            sent_values: Vec::new(),
            last_refresh: now,
            initialised: false,
            offline: false,
        })
    }

    pub fn class(&self) -> &'static DeviceClass {
        self.class
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn state_of(&self, code: u8) -> Option<&State> {
        self.state_fields.get(&code)
    }

    pub fn pending_gets(&self) -> &BTreeSet<u8> {
        &self.pending_gets
    }

    pub fn pending_sets(&self) -> &[(u8, State)] {
        &self.pending_sets
    }

    fn channel_property(&self, channel: &str) -> Result<&'static Property> {
        self.registry
            .find_channel(self.class.code, channel)
            .ok_or_else(|| Error::UnknownChannel {
                key: self.key,
                channel: channel.to_string(),
            })
    }

    /// Queue a read of one channel for the next poll.
    pub fn queue_refresh(&mut self, channel: &str) -> Result<()> {
        let property = self.channel_property(channel)?;
        if !property.is_readable() {
            tracing::debug!("{}: refresh of write-only {} ignored", self.key, property);
            return Ok(());
        }
        self.pending_gets.insert(property.code);
        Ok(())
    }

    /// Queue a write. A pending write to the same channel is replaced.
    pub fn queue_set(&mut self, channel: &str, state: State) -> Result<()> {
        let property = self.channel_property(channel)?;
        if !property.is_writable() {
            return Err(Error::UnknownChannel {
                key: self.key,
                channel: channel.to_string(),
            });
        }

        match self.pending_sets.iter_mut().find(|(code, _)| *code == property.code) {
            Some((_, value)) => *value = state,
            None => self.pending_sets.push((property.code, state)),
        }
        Ok(())
    }

    /// Swap the callback target. An initialised device replays its current
    /// state to the new listener.
    pub fn set_listener(&mut self, listener: Box<dyn DeviceListener>) {
        self.listener = listener;
        if self.initialised {
            self.announce();
        }
    }

    /// Tell the listener the device is gone.
    pub fn remove(&mut self) {
        self.listener.on_removed();
    }

    fn identifier(&self) -> String {
        match self.state_fields.get(&IDENTIFICATION_NUMBER) {
            Some(State::Text(id)) if !id.is_empty() => id.clone(),
            _ => self.key.to_string(),
        }
    }

    fn check_initialised(&mut self) {
        if self.initialised || self.readable.is_none() || !self.pending_gets.is_empty() {
            return;
        }
        self.initialised = true;
        self.announce();
    }

    /// Fire `on_initialised` followed by one `on_updated` per known value.
    fn announce(&mut self) {
        let identifier = self.identifier();
        let channels: Vec<(&'static str, u8)> = self
            .state_fields
            .keys()
            .filter_map(|code| self.registry.resolve(self.class.code, *code).ok())
            .map(|p| (p.channel, p.code))
            .collect();
        let names: Vec<&'static str> = channels.iter().map(|(name, _)| *name).collect();

        tracing::info!(
            "{} initialised as {} with {} channels",
            self.key,
            identifier,
            names.len()
        );
        self.listener.on_initialised(&identifier, &self.key, &names);
        for (name, code) in channels {
            if let Some(state) = self.state_fields.get(&code) {
                self.listener.on_updated(name, state);
            }
        }
    }

    fn apply_property_map(&mut self, edt: &[u8]) {
        let advertised = match parse_property_map(edt) {
            Ok(codes) => codes,
            Err(e) => {
                tracing::warn!("{}: bad GET property map: {}", self.key, e);
                return;
            }
        };

        let registered = match self.registry.device_properties_of(self.class.code) {
            Ok(properties) => properties,
            Err(e) => {
                tracing::warn!("{}: {}", self.key, e);
                return;
            }
        };
        let readable: BTreeSet<u8> = registered
            .iter()
            .filter(|p| p.is_readable() && advertised.contains(&p.code))
            .map(|p| p.code)
            .collect();
        for code in advertised.iter().filter(|c| !registered.iter().any(|p| p.code == **c)) {
            tracing::debug!("{}: advertised property 0x{:02X} is not registered", self.key, code);
        }

        tracing::debug!("{}: {} readable properties advertised", self.key, readable.len());
        self.pending_gets.remove(&GET_PROPERTY_MAP);
        for code in &readable {
            if !self.state_fields.contains_key(code) {
                self.pending_gets.insert(*code);
            }
        }
        self.readable = Some(readable);
    }

    fn apply_value(&mut self, esv: Esv, epc: u8, edt: &[u8]) {
        if esv == Esv::GetSna && edt.is_empty() {
            tracing::debug!("{}: property 0x{:02X} not available", self.key, epc);
            self.pending_gets.remove(&epc);
            match self.readable.as_mut() {
                Some(readable) => {
                    readable.remove(&epc);
                }
                // No property map means nothing beyond what was already read.
                None if epc == GET_PROPERTY_MAP => {
                    self.readable = Some(self.state_fields.keys().copied().collect());
                }
                None => {}
            }
            return;
        }

        if epc == GET_PROPERTY_MAP {
            self.apply_property_map(edt);
            return;
        }

        let property = match self.registry.resolve(self.class.code, epc) {
            Ok(property) => property,
            Err(_) => {
                tracing::trace!("{}: skipping unregistered property 0x{:02X}", self.key, epc);
                self.pending_gets.remove(&epc);
                return;
            }
        };
        self.pending_gets.remove(&epc);

        let Some(decoder) = property.decoder.as_ref() else {
            return;
        };
        match decoder.decode(edt) {
            Ok(state) => {
                tracing::trace!("{}: {} = {}", self.key, property, state);
                if self.initialised {
                    self.listener.on_updated(property.channel, &state);
                }
                self.state_fields.insert(epc, state);
            }
            Err(e) => {
                tracing::warn!("{}: failed to decode {}: {}", self.key, property, e);
            }
        }
    }

    fn apply_set_ack(&mut self, esv: Esv, epc: u8, edt: &[u8]) {
        let sent = self
            .sent_values
            .iter()
            .position(|(code, _)| *code == epc)
            .map(|index| self.sent_values.swap_remove(index).1);
        let pending = self.pending_sets.iter().position(|(code, _)| *code == epc);

        // A non-empty payload in SetC_SNA echoes a rejected value.
        let rejected = esv == Esv::SetCSna && !edt.is_empty();
        if rejected {
            tracing::warn!("{}: write to 0x{:02X} rejected", self.key, epc);
        }

        match (pending, sent) {
            (Some(index), Some(sent)) if self.pending_sets[index].1 == sent => {
                self.pending_sets.remove(index);
            }
            (Some(index), Some(sent)) => {
                tracing::debug!(
                    "{}: 0x{:02X} acknowledged {} but {} is pending",
                    self.key,
                    epc,
                    sent,
                    self.pending_sets[index].1
                );
            }
            (Some(index), None) if rejected => {
                self.pending_sets.remove(index);
            }
            _ => {}
        }

        // Read back what the device actually committed.
        if let Ok(property) = self.registry.resolve(self.class.code, epc) {
            if property.is_readable() {
                self.pending_gets.insert(epc);
            }
        }
    }
}

impl EchonetObject for Device {
    fn key(&self) -> &InstanceKey {
        &self.key
    }

    fn apply_property(&mut self, _source: &InstanceKey, esv: Esv, epc: u8, edt: &[u8]) {
        if esv.carries_values() {
            self.apply_value(esv, epc, edt);
            self.check_initialised();
        } else if esv.is_set_response() {
            self.apply_set_ack(esv, epc, edt);
        } else {
            tracing::trace!("{}: ignoring {:?} for 0x{:02X}", self.key, esv, epc);
        }
    }

    fn apply_header(&mut self, esv: Esv, tid: u16, now: Instant) -> bool {
        let (slot, kind) = if esv.is_get_response() {
            (&mut self.inflight_get, "GET")
        } else if esv.is_set_response() {
            (&mut self.inflight_set, "SET")
        } else {
            if self.offline && esv.carries_values() {
                self.offline = false;
                tracing::info!("{} is back online", self.key);
            }
            return true;
        };

        match slot.handle_response(tid, now) {
            ResponseMatch::Matched(rtt) => {
                tracing::debug!("{}: {} tid={} answered in {:?}", self.key, kind, tid, rtt);
                if self.offline {
                    self.offline = false;
                    tracing::info!("{} is back online", self.key);
                }
                true
            }
            ResponseMatch::Late => {
                tracing::debug!("{}: late {} reply tid={}, ignored", self.key, kind, tid);
                false
            }
            ResponseMatch::Unexpected => {
                tracing::debug!(
                    "{}: unexpected {} reply tid={} (waiting for {:?})",
                    self.key,
                    kind,
                    tid,
                    slot.tid()
                );
                false
            }
        }
    }

    fn build_poll_message(&mut self, builder: &mut MessageBuilder, tids: &mut TransactionIds, now: Instant) -> bool {
        if self.inflight_get.is_waiting() || self.pending_gets.is_empty() {
            return false;
        }

        let tid = tids.next_tid();
        builder.start(tid, CONTROLLER_EOJ, self.key.eoj(), Esv::Get);
        for code in &self.pending_gets {
            builder.append_epc_request(*code);
        }
        self.inflight_get.start(tid, now);
        tracing::trace!("{}: GET tid={} for {:?}", self.key, tid, self.pending_gets);
        true
    }

    fn build_update_message(&mut self, builder: &mut MessageBuilder, tids: &mut TransactionIds, now: Instant) -> bool {
        if self.inflight_set.is_waiting() || self.pending_sets.is_empty() {
            return false;
        }

        let tid = tids.next_tid();
        builder.start(tid, CONTROLLER_EOJ, self.key.eoj(), Esv::SetC);
        self.sent_values.clear();

        let mut failed = Vec::new();
        for (code, state) in &self.pending_sets {
            let encoder = self
                .registry
                .resolve(self.class.code, *code)
                .ok()
                .and_then(|p| p.encoder.as_ref());
            let result = match encoder {
                Some(codec) => builder.append_encoded(*code, codec, state),
                None => Err(CodecError::TypeMismatch(state.to_string())),
            };
            match result {
                Ok(()) => self.sent_values.push((*code, state.clone())),
                Err(e) => {
                    tracing::warn!("{}: dropping write {} to 0x{:02X}: {}", self.key, state, code, e);
                    failed.push(*code);
                }
            }
        }
        self.pending_sets.retain(|(code, _)| !failed.contains(code));

        if self.sent_values.is_empty() {
            return false;
        }
        self.inflight_set.start(tid, now);
        tracing::debug!("{}: SetC tid={} with {} values", self.key, tid, self.sent_values.len());
        true
    }

    fn check_timeouts(&mut self, now: Instant) {
        if self.inflight_get.check_timeout(now).is_some() {
            let count = self.inflight_get.timeout_count();
            if count >= self.settings.offline_after && !self.offline {
                self.offline = true;
                tracing::warn!("{} offline after {} timeouts", self.key, count);
                self.listener.on_offline();
            }
        }

        if let Some(tid) = self.inflight_set.check_timeout(now) {
            tracing::debug!("{}: SetC tid={} unanswered, will resend", self.key, tid);
            self.sent_values.clear();
        }
    }

    fn refresh_all(&mut self, now: Instant) {
        let Some(readable) = self.readable.as_ref() else {
            return;
        };
        if now.saturating_duration_since(self.last_refresh) < self.settings.poll_interval {
            return;
        }
        self.last_refresh = now;
        self.pending_gets.extend(readable.iter().copied());
        tracing::trace!("{}: refreshing {} properties", self.key, readable.len());
    }
}
