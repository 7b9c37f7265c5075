use std::fmt;
use std::sync::Arc;

use crate::device::{DeviceListener, DeviceSettings};
use crate::discovery::DiscoveryListener;
use crate::key::InstanceKey;
use crate::state::State;

/// Commands sent from callers to the reactor thread
pub enum EngineCommand {
    /// Add a device, replacing any device already registered under the key
    Register {
        key: InstanceKey,
        listener: Box<dyn DeviceListener>,
        settings: Option<DeviceSettings>,
    },
    /// Swap the listener of a registered device
    ReplaceListener {
        key: InstanceKey,
        listener: Box<dyn DeviceListener>,
    },
    /// Read one channel on the next poll
    Refresh { key: InstanceKey, channel: String },
    /// Write one channel
    Set {
        key: InstanceKey,
        channel: String,
        state: State,
    },
    Remove { key: InstanceKey },
    StartDiscovery { listener: Arc<dyn DiscoveryListener> },
    StopDiscovery,
    /// Stop the reactor loop
    Shutdown,
}

impl fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::Register { key, settings, .. } => f
                .debug_struct("Register")
                .field("key", key)
                .field("settings", settings)
                .finish_non_exhaustive(),
            EngineCommand::ReplaceListener { key, .. } => {
                f.debug_struct("ReplaceListener").field("key", key).finish_non_exhaustive()
            }
            EngineCommand::Refresh { key, channel } => f
                .debug_struct("Refresh")
                .field("key", key)
                .field("channel", channel)
                .finish(),
            EngineCommand::Set { key, channel, state } => f
                .debug_struct("Set")
                .field("key", key)
                .field("channel", channel)
                .field("state", state)
                .finish(),
            EngineCommand::Remove { key } => f.debug_struct("Remove").field("key", key).finish(),
            EngineCommand::StartDiscovery { .. } => f.write_str("StartDiscovery"),
            EngineCommand::StopDiscovery => f.write_str("StopDiscovery"),
            EngineCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}
