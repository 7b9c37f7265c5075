//! The single thread that owns every device.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Instant;

use super::command::EngineCommand;
use crate::device::{Device, DeviceSettings, EchonetObject};
use crate::discovery::{DiscoveryListener, FoundForwarder, ProfileNode};
use crate::key::InstanceKey;
use crate::protocol::{EchonetMessage, MessageBuilder};
use crate::registry::PropertyRegistry;
use crate::registry::classes::NODE_PROFILE;
use crate::transport::EchonetChannel;

pub(crate) struct Reactor {
    channel: EchonetChannel,
    commands: Receiver<EngineCommand>,
    registry: Arc<PropertyRegistry>,
    defaults: DeviceSettings,
    devices: HashMap<InstanceKey, Device>,
    discovery: ProfileNode,
    discovery_listener: Option<Arc<dyn DiscoveryListener>>,
    builder: MessageBuilder,
}

impl Reactor {
    pub(crate) fn new(
        channel: EchonetChannel,
        commands: Receiver<EngineCommand>,
        registry: Arc<PropertyRegistry>,
        defaults: DeviceSettings,
        discovery: ProfileNode,
    ) -> Self {
        Self {
            channel,
            commands,
            registry,
            defaults,
            devices: HashMap::new(),
            discovery,
            discovery_listener: None,
            builder: MessageBuilder::new(),
        }
    }

    /// Run until a shutdown command arrives or every handle is dropped.
    pub(crate) fn run(&mut self) {
        tracing::info!("ECHONET Lite reactor started");

        loop {
            if !self.drain_commands() {
                break;
            }

            self.service_objects(Instant::now());
            self.poll_incoming();
            self.register_discovered(Instant::now());
        }

        tracing::info!("ECHONET Lite reactor stopped with {} devices", self.devices.len());
    }

    /// Apply every queued command. Returns `false` when the loop should stop.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(EngineCommand::Shutdown) => {
                    tracing::info!("ECHONET Lite reactor shutting down");
                    return false;
                }
                Ok(command) => self.apply_command(command),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    tracing::info!("Command channel disconnected, shutting down");
                    return false;
                }
            }
        }
    }

    fn apply_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Register { key, listener, settings } => {
                let settings = settings.unwrap_or(self.defaults);
                match Device::new(key, self.registry.clone(), listener, settings, Instant::now()) {
                    Ok(device) => {
                        if self.devices.insert(key, device).is_some() {
                            tracing::info!("Replaced device {}", key);
                        } else {
                            tracing::info!("Registered device {}", key);
                        }
                    }
                    Err(e) => tracing::warn!("Cannot register {}: {}", key, e),
                }
            }
            EngineCommand::ReplaceListener { key, listener } => match self.devices.get_mut(&key) {
                Some(device) => device.set_listener(listener),
                None => tracing::warn!("Listener for unknown device {}", key),
            },
            EngineCommand::Refresh { key, channel } => match self.devices.get_mut(&key) {
                Some(device) => {
                    if let Err(e) = device.queue_refresh(&channel) {
                        tracing::warn!("Refresh rejected: {}", e);
                    }
                }
                None => tracing::warn!("Refresh for unknown device {}", key),
            },
            EngineCommand::Set { key, channel, state } => match self.devices.get_mut(&key) {
                Some(device) => {
                    if let Err(e) = device.queue_set(&channel, state) {
                        tracing::warn!("Write rejected: {}", e);
                    }
                }
                None => tracing::warn!("Write for unknown device {}", key),
            },
            EngineCommand::Remove { key } => match self.devices.remove(&key) {
                Some(mut device) => {
                    tracing::info!("Removed device {}", key);
                    device.remove();
                }
                None => tracing::debug!("Remove for unknown device {}", key),
            },
            EngineCommand::StartDiscovery { listener } => {
                self.discovery_listener = Some(listener);
                self.discovery.start();
            }
            EngineCommand::StopDiscovery => {
                self.discovery.stop();
                self.discovery_listener = None;
            }
            EngineCommand::Shutdown => {}
        }
    }

    fn service_objects(&mut self, now: Instant) {
        for device in self.devices.values_mut() {
            service(device, &mut self.builder, &mut self.channel, now);
        }
        service(&mut self.discovery, &mut self.builder, &mut self.channel, now);
    }

    /// One bounded receive, dispatched to the owning object.
    fn poll_incoming(&mut self) {
        let (frame, source) = match self.channel.recv() {
            Ok(Some(received)) => received,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Receive failed: {}", e);
                return;
            }
        };

        let mut message = match EchonetMessage::parse(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("Discarding datagram from {}: {}", source, e);
                return;
            }
        };
        let Some(esv) = message.esv() else {
            tracing::debug!("Unknown service code 0x{:02X} from {}", message.esv_code(), source);
            return;
        };

        let key = InstanceKey::new(source, message.source_class(), message.source_instance());
        let object: &mut dyn EchonetObject = if let Some(device) = self.devices.get_mut(&key) {
            device
        } else if key.class == NODE_PROFILE.code {
            &mut self.discovery
        } else {
            tracing::trace!("Dropping {:?} from unregistered {}", esv, key);
            return;
        };

        tracing::trace!(
            "{:?} tid={} from {} with {} properties",
            esv,
            message.tid(),
            key,
            message.opc()
        );
        if !object.apply_header(esv, message.tid(), Instant::now()) {
            return;
        }
        while message.move_next() {
            object.apply_property(&key, esv, message.current_epc(), message.current_edt());
        }
    }

    /// Turn instance-list entries into devices.
    fn register_discovered(&mut self, now: Instant) {
        for key in self.discovery.take_discovered() {
            if self.devices.contains_key(&key) {
                continue;
            }
            let Some(listener) = self.discovery_listener.clone() else {
                continue;
            };
            let class = match self.registry.class(key.class) {
                Ok(class) => class,
                Err(_) => {
                    tracing::debug!("Skipping discovered {}: class not supported", key);
                    continue;
                }
            };

            let forwarder = Box::new(FoundForwarder::new(listener, &key, class));
            match Device::new(key, self.registry.clone(), forwarder, self.defaults, now) {
                Ok(device) => {
                    tracing::info!("Discovered {} ({})", key, class.name);
                    self.devices.insert(key, device);
                }
                Err(e) => tracing::warn!("Cannot register discovered {}: {}", key, e),
            }
        }
    }
}

/// One reactor step for one object: SET first, then refresh and GET, and
/// timeout checks when no GET went out.
fn service(object: &mut dyn EchonetObject, builder: &mut MessageBuilder, channel: &mut EchonetChannel, now: Instant) {
    if object.build_update_message(builder, channel.tids(), now) {
        send(object.key(), builder, channel);
    }

    object.refresh_all(now);

    if object.build_poll_message(builder, channel.tids(), now) {
        send(object.key(), builder, channel);
    } else {
        object.check_timeouts(now);
    }
}

fn send(key: &InstanceKey, builder: &MessageBuilder, channel: &mut EchonetChannel) {
    if let Err(e) = channel.send(builder.as_bytes(), key.address) {
        tracing::warn!("Failed to send to {}: {}", key, e);
    }
}
