//! Device callbacks and the channel-backed event bridge.

use std::sync::mpsc::Sender;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::key::InstanceKey;
use crate::registry::DeviceClass;
use crate::state::State;

/// Callbacks fired by a device on the reactor thread.
///
/// Implementations must return quickly; they run inside the reactor loop.
pub trait DeviceListener: Send {
    /// All advertised properties have been read once. Followed by one
    /// [`on_updated`](Self::on_updated) per known value.
    fn on_initialised(&mut self, identifier: &str, key: &InstanceKey, channels: &[&'static str]);

    fn on_updated(&mut self, channel: &'static str, state: &State);

    fn on_removed(&mut self);

    fn on_offline(&mut self);
}

/// Events produced by [`ChannelListener`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    Initialised {
        key: InstanceKey,
        identifier: String,
        channels: Vec<String>,
        at: DateTime<Utc>,
    },
    Updated {
        key: InstanceKey,
        channel: String,
        state: State,
        at: DateTime<Utc>,
    },
    Removed {
        key: InstanceKey,
        at: DateTime<Utc>,
    },
    Offline {
        key: InstanceKey,
        at: DateTime<Utc>,
    },
    DeviceFound {
        key: InstanceKey,
        identifier: String,
        class: String,
        at: DateTime<Utc>,
    },
}

impl DeviceEvent {
    pub fn key(&self) -> &InstanceKey {
        match self {
            DeviceEvent::Initialised { key, .. }
            | DeviceEvent::Updated { key, .. }
            | DeviceEvent::Removed { key, .. }
            | DeviceEvent::Offline { key, .. }
            | DeviceEvent::DeviceFound { key, .. } => key,
        }
    }
}

/// Forwards callbacks as [`DeviceEvent`]s into an mpsc channel.
///
/// A closed receiver is ignored; the device keeps running.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    key: InstanceKey,
    tx: Sender<DeviceEvent>,
}

impl ChannelListener {
    pub fn new(key: InstanceKey, tx: Sender<DeviceEvent>) -> Self {
        Self { key, tx }
    }

    /// Same sender, bound to another device.
    pub fn for_key(&self, key: InstanceKey) -> Self {
        Self {
            key,
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn found(&self, identifier: &str, key: &InstanceKey, class: &'static DeviceClass) {
        self.emit(DeviceEvent::DeviceFound {
            key: *key,
            identifier: identifier.to_string(),
            class: class.name.to_string(),
            at: Utc::now(),
        });
    }

    fn emit(&self, event: DeviceEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event receiver for {} dropped", self.key);
        }
    }
}

impl DeviceListener for ChannelListener {
    fn on_initialised(&mut self, identifier: &str, key: &InstanceKey, channels: &[&'static str]) {
        self.emit(DeviceEvent::Initialised {
            key: *key,
            identifier: identifier.to_string(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
            at: Utc::now(),
        });
    }

    fn on_updated(&mut self, channel: &'static str, state: &State) {
        self.emit(DeviceEvent::Updated {
            key: self.key,
            channel: channel.to_string(),
            state: state.clone(),
            at: Utc::now(),
        });
    }

    fn on_removed(&mut self) {
        self.emit(DeviceEvent::Removed {
            key: self.key,
            at: Utc::now(),
        });
    }

    fn on_offline(&mut self) {
        self.emit(DeviceEvent::Offline {
            key: self.key,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ClassCode;
    use std::sync::mpsc;

    #[test]
    fn test_channel_listener_forwards_events() {
        let key = InstanceKey::new(
            "192.168.1.20:3610".parse().unwrap(),
            ClassCode::new(0x01, 0x30),
            1,
        );
        let (tx, rx) = mpsc::channel();
        let mut listener = ChannelListener::new(key, tx);

        listener.on_initialised("fe00", &key, &["operation-status"]);
        listener.on_updated("operation-status", &State::on());
        listener.on_offline();

        let events: Vec<DeviceEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], DeviceEvent::Initialised { identifier, .. } if identifier == "fe00"));
        assert!(matches!(&events[1], DeviceEvent::Updated { state: State::OnOff(true), .. }));
        assert!(matches!(&events[2], DeviceEvent::Offline { .. }));
        assert!(events.iter().all(|e| *e.key() == key));

        let json = serde_json::to_string(&events[1]).unwrap();
        assert!(json.contains("\"event\":\"updated\""));
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let key = InstanceKey::new(
            "192.168.1.20:3610".parse().unwrap(),
            ClassCode::new(0x01, 0x30),
            1,
        );
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut listener = ChannelListener::new(key, tx);
        listener.on_removed();
    }
}
