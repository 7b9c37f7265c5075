use std::sync::Arc;
use std::sync::mpsc::{SyncSender, TrySendError};

use super::command::EngineCommand;
use crate::device::{DeviceListener, DeviceSettings};
use crate::discovery::DiscoveryListener;
use crate::error::{Error, Result};
use crate::key::InstanceKey;
use crate::state::State;

/// Cloneable front door to a running engine.
///
/// Every call is a non-blocking offer into the bounded mailbox. A full
/// mailbox drops the command with a warning and returns
/// [`Error::MailboxFull`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: SyncSender<EngineCommand>,
}

impl EngineHandle {
    pub(crate) fn new(tx: SyncSender<EngineCommand>) -> Self {
        Self { tx }
    }

    pub fn send(&self, command: EngineCommand) -> Result<()> {
        match self.tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                tracing::warn!("Engine mailbox full, dropping {:?}", command);
                Err(Error::MailboxFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::EngineStopped),
        }
    }

    pub fn register(&self, key: InstanceKey, listener: Box<dyn DeviceListener>) -> Result<()> {
        self.send(EngineCommand::Register {
            key,
            listener,
            settings: None,
        })
    }

    pub fn register_with(
        &self,
        key: InstanceKey,
        listener: Box<dyn DeviceListener>,
        settings: DeviceSettings,
    ) -> Result<()> {
        self.send(EngineCommand::Register {
            key,
            listener,
            settings: Some(settings),
        })
    }

    pub fn replace_listener(&self, key: InstanceKey, listener: Box<dyn DeviceListener>) -> Result<()> {
        self.send(EngineCommand::ReplaceListener { key, listener })
    }

    pub fn refresh(&self, key: InstanceKey, channel: impl Into<String>) -> Result<()> {
        self.send(EngineCommand::Refresh {
            key,
            channel: channel.into(),
        })
    }

    pub fn set(&self, key: InstanceKey, channel: impl Into<String>, state: State) -> Result<()> {
        self.send(EngineCommand::Set {
            key,
            channel: channel.into(),
            state,
        })
    }

    pub fn remove(&self, key: InstanceKey) -> Result<()> {
        self.send(EngineCommand::Remove { key })
    }

    pub fn start_discovery(&self, listener: Arc<dyn DiscoveryListener>) -> Result<()> {
        self.send(EngineCommand::StartDiscovery { listener })
    }

    pub fn stop_discovery(&self) -> Result<()> {
        self.send(EngineCommand::StopDiscovery)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(EngineCommand::Shutdown)
    }

    /// Deliver a shutdown even when the mailbox is momentarily full.
    pub(crate) fn close(&self) -> Result<()> {
        self.tx.send(EngineCommand::Shutdown).map_err(|_| Error::EngineStopped)
    }
}
