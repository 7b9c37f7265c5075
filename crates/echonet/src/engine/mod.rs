//! ECHONET Lite engine
//!
//! All protocol work happens on one dedicated `echonet-reactor` thread. Callers
//! talk to it through an [`EngineHandle`], which enqueues [`EngineCommand`]s
//! into a bounded mailbox; results come back through device and discovery
//! listeners.

mod command;
mod handle;
mod reactor;

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

pub use command::EngineCommand;
pub use handle::EngineHandle;

use crate::config::EngineConfig;
use crate::discovery::ProfileNode;
use crate::error::{Error, Result};
use crate::registry::PropertyRegistry;
use crate::transport::{Datagram, EchonetChannel, UdpDatagram};
use reactor::Reactor;

/// A running reactor thread.
///
/// Dropping the engine stops the thread and waits for it.
pub struct Engine {
    handle: EngineHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl Engine {
    /// Bind the multicast UDP socket and start the reactor.
    pub fn spawn(config: &EngineConfig, registry: Arc<PropertyRegistry>) -> Result<Self> {
        config.validate(&registry)?;
        tracing::info!(
            "Starting ECHONET Lite engine on {}:{} (group {})",
            config.interface,
            config.port,
            config.multicast_group
        );
        let socket = UdpDatagram::bind(config.interface, config.port, config.multicast_group)?;
        Self::with_transport(config, registry, Box::new(socket))
    }

    /// Start the reactor on any datagram transport.
    pub fn with_transport(
        config: &EngineConfig,
        registry: Arc<PropertyRegistry>,
        transport: Box<dyn Datagram>,
    ) -> Result<Self> {
        config.validate(&registry)?;

        let (tx, rx) = mpsc::sync_channel::<EngineCommand>(config.mailbox_capacity);
        let channel = EchonetChannel::new(transport, config.receive_timeout());
        let discovery = ProfileNode::new(config.discovery_interval());
        let mut reactor = Reactor::new(channel, rx, registry, config.device_settings(), discovery);

        let thread = thread::Builder::new()
            .name("echonet-reactor".to_string())
            .spawn(move || reactor.run())
            .map_err(Error::Io)?;

        Ok(Self {
            handle: EngineHandle::new(tx),
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stop the reactor and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Blocking send: the reactor drains the mailbox every cycle.
        if self.handle.close().is_err() {
            tracing::debug!("Reactor already gone");
        }
        if thread.join().is_err() {
            tracing::error!("ECHONET Lite reactor panicked");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ChannelListener, DeviceEvent};
    use crate::discovery::discovery_key;
    use crate::key::{ClassCode, InstanceKey};
    use crate::protocol::{CONTROLLER_EOJ, EchonetMessage, Esv, MessageBuilder, multicast_address};
    use crate::state::State;
    use crate::transport::tests::MockDatagram;
    use std::net::SocketAddr;
    use std::sync::mpsc::Receiver;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(3);

    fn test_config() -> EngineConfig {
        EngineConfig {
            receive_timeout_ms: 5,
            retry_timeout_ms: 30_000,
            discovery_interval_ms: 60_000,
            ..EngineConfig::default()
        }
    }

    fn start(mock: &MockDatagram) -> Engine {
        Engine::with_transport(&test_config(), Arc::new(PropertyRegistry::new()), Box::new(mock.clone())).unwrap()
    }

    /// Wait for the next frame the reactor sends.
    fn next_sent(mock: &MockDatagram) -> (Vec<u8>, SocketAddr) {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            {
                let mut sent = mock.sent.lock().unwrap();
                if !sent.is_empty() {
                    return sent.remove(0);
                }
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("reactor sent nothing");
    }

    fn requested_codes(frame: &[u8]) -> (Esv, Vec<(u8, Vec<u8>)>) {
        let mut msg = EchonetMessage::parse(frame).unwrap();
        let mut entries = Vec::new();
        while msg.move_next() {
            entries.push((msg.current_epc(), msg.current_edt().to_vec()));
        }
        (msg.esv().unwrap(), entries)
    }

    /// Answer a request as the addressed object would.
    fn reply_to(request: &[u8], esv: Esv, entries: &[(u8, &[u8])]) -> Vec<u8> {
        let msg = EchonetMessage::parse(request).unwrap();
        let mut builder = MessageBuilder::new();
        builder.start(msg.tid(), msg.deoj(), CONTROLLER_EOJ, esv);
        for (epc, edt) in entries {
            builder.append_epc_update(*epc, edt);
        }
        builder.as_bytes().to_vec()
    }

    fn next_event(rx: &Receiver<DeviceEvent>) -> DeviceEvent {
        rx.recv_timeout(WAIT).expect("no event from reactor")
    }

    fn ac_key() -> InstanceKey {
        InstanceKey::new("192.168.1.20:3610".parse().unwrap(), ClassCode::new(0x01, 0x30), 1)
    }

    #[test]
    fn test_register_initialise_and_write() {
        let mock = MockDatagram::default();
        let engine = start(&mock);
        let handle = engine.handle();
        let key = ac_key();
        let (tx, rx) = std::sync::mpsc::channel();

        // Junk before anything else must not stop the loop.
        mock.push_inbound(vec![0x10, 0x81, 0x00], key.address);
        handle.register(key, Box::new(ChannelListener::new(key, tx))).unwrap();

        let (request, target) = next_sent(&mock);
        assert_eq!(target, key.address);
        assert_eq!(requested_codes(&request), (Esv::Get, vec![(0x9F, vec![])]));
        mock.push_inbound(reply_to(&request, Esv::GetRes, &[(0x9F, &[2, 0x80, 0xB3])]), key.address);

        let (request, _) = next_sent(&mock);
        let (esv, entries) = requested_codes(&request);
        assert_eq!(esv, Esv::Get);
        assert_eq!(entries.iter().map(|(c, _)| *c).collect::<Vec<_>>(), vec![0x80, 0xB3]);
        mock.push_inbound(
            reply_to(&request, Esv::GetRes, &[(0x80, &[0x30]), (0xB3, &[22])]),
            key.address,
        );

        match next_event(&rx) {
            DeviceEvent::Initialised { channels, .. } => {
                assert_eq!(channels, vec!["operation-status", "set-temperature"])
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(next_event(&rx), DeviceEvent::Updated { state: State::OnOff(true), .. }));
        assert!(matches!(next_event(&rx), DeviceEvent::Updated { channel, .. } if channel == "set-temperature"));

        handle.set(key, "operation-status", State::off()).unwrap();
        let (request, target) = next_sent(&mock);
        assert_eq!(target, key.address);
        assert_eq!(requested_codes(&request), (Esv::SetC, vec![(0x80, vec![0x31])]));

        handle.remove(key).unwrap();
        assert!(matches!(next_event(&rx), DeviceEvent::Removed { .. }));

        engine.shutdown();
        assert!(handle.refresh(key, "operation-status").is_err());
    }

    #[test]
    fn test_discovery_registers_found_devices() {
        let mock = MockDatagram::default();
        let engine = start(&mock);
        let handle = engine.handle();
        let (tx, rx) = std::sync::mpsc::channel();
        let node: SocketAddr = "192.168.1.30:3610".parse().unwrap();

        handle
            .start_discovery(Arc::new(ChannelListener::new(discovery_key(), tx)))
            .unwrap();

        let (request, target) = next_sent(&mock);
        assert_eq!(target, multicast_address());
        assert_eq!(requested_codes(&request), (Esv::Get, vec![(0xD6, vec![])]));

        // One air conditioner and one class the registry does not know.
        mock.push_inbound(
            reply_to(&request, Esv::GetRes, &[(0xD6, &[2, 0x01, 0x30, 0x01, 0x02, 0x88, 0x01])]),
            node,
        );

        let (request, target) = next_sent(&mock);
        assert_eq!(target, node);
        assert_eq!(EchonetMessage::parse(&request).unwrap().deoj(), [0x01, 0x30, 0x01]);
        mock.push_inbound(reply_to(&request, Esv::GetRes, &[(0x9F, &[1, 0x83])]), node);

        let (request, _) = next_sent(&mock);
        assert_eq!(requested_codes(&request), (Esv::Get, vec![(0x83, vec![])]));
        mock.push_inbound(reply_to(&request, Esv::GetRes, &[(0x83, &[0xFE, 0x00, 0x00, 0x01])]), node);

        match next_event(&rx) {
            DeviceEvent::DeviceFound { identifier, key, class, .. } => {
                assert_eq!(identifier, "fe000001");
                assert_eq!(key, InstanceKey::new(node, ClassCode::new(0x01, 0x30), 1));
                assert_eq!(class, "home-air-conditioner");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(next_event(&rx), DeviceEvent::Initialised { .. }));

        engine.shutdown();
        assert!(mock.take_sent().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            mailbox_capacity: 0,
            ..EngineConfig::default()
        };
        let result = Engine::with_transport(
            &config,
            Arc::new(PropertyRegistry::new()),
            Box::new(MockDatagram::default()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
