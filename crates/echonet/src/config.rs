//! Engine configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `ECHONET_`-prefixed environment variables (`ECHONET_PORT=3611`).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::device::DeviceSettings;
use crate::error::{Error, Result};
use crate::key::{ClassCode, InstanceKey};
use crate::protocol::{ECHONET_PORT, MULTICAST_GROUP};
use crate::registry::PropertyRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local interface to bind and join the multicast group on.
    pub interface: Ipv4Addr,
    pub port: u16,
    pub multicast_group: Ipv4Addr,
    /// Upper bound on one blocking receive; also bounds command latency.
    pub receive_timeout_ms: u64,
    pub mailbox_capacity: usize,
    pub poll_interval_ms: u64,
    pub retry_timeout_ms: u64,
    pub offline_after_timeouts: u32,
    pub discovery_interval_ms: u64,
    /// Devices registered at startup.
    pub devices: Vec<DeviceEntry>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interface: Ipv4Addr::UNSPECIFIED,
            port: ECHONET_PORT,
            multicast_group: MULTICAST_GROUP,
            receive_timeout_ms: 250,
            mailbox_capacity: 256,
            poll_interval_ms: 60_000,
            retry_timeout_ms: 2_000,
            offline_after_timeouts: 3,
            discovery_interval_ms: 10_000,
            devices: Vec::new(),
        }
    }
}

/// A statically configured device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub address: IpAddr,
    #[serde(default = "default_device_port")]
    pub port: u16,
    pub group: u8,
    pub class: u8,
    #[serde(default = "default_instance")]
    pub instance: u8,
    pub poll_interval_ms: Option<u64>,
    pub retry_timeout_ms: Option<u64>,
}

fn default_device_port() -> u16 {
    ECHONET_PORT
}

fn default_instance() -> u8 {
    1
}

impl DeviceEntry {
    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(
            SocketAddr::new(self.address, self.port),
            ClassCode::new(self.group, self.class),
            self.instance,
        )
    }

    /// Engine-wide settings with this entry's overrides applied.
    pub fn settings(&self, defaults: DeviceSettings) -> DeviceSettings {
        DeviceSettings {
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            retry_timeout: self
                .retry_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_timeout),
            offline_after: defaults.offline_after,
        }
    }
}

impl EngineConfig {
    /// Defaults, then `path` (must exist when given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!("config file {} not found", path.display())));
            }
            figment = figment.merge(Toml::file(path));
        }
        let config: EngineConfig = figment.merge(Env::prefixed("ECHONET_")).extract()?;
        tracing::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Reject settings the reactor cannot run with.
    pub fn validate(&self, registry: &PropertyRegistry) -> Result<()> {
        let positive = [
            ("receive_timeout_ms", self.receive_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("retry_timeout_ms", self.retry_timeout_ms),
            ("discovery_interval_ms", self.discovery_interval_ms),
            ("mailbox_capacity", self.mailbox_capacity as u64),
            ("offline_after_timeouts", u64::from(self.offline_after_timeouts)),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{} must be greater than zero", name)));
        }

        for entry in &self.devices {
            let class = ClassCode::new(entry.group, entry.class);
            if !registry.contains_class(class) {
                return Err(Error::Config(format!(
                    "device {} uses unsupported class {}",
                    entry.address, class
                )));
            }
            if entry.poll_interval_ms == Some(0) || entry.retry_timeout_ms == Some(0) {
                return Err(Error::Config(format!("device {} has a zero interval", entry.address)));
            }
        }
        Ok(())
    }

    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            retry_timeout: Duration::from_millis(self.retry_timeout_ms),
            offline_after: self.offline_after_timeouts,
        }
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.port, 3610);
        assert_eq!(config.multicast_group, Ipv4Addr::new(224, 0, 23, 0));
        assert!(config.validate(&PropertyRegistry::new()).is_ok());
        assert_eq!(config.device_settings().offline_after, 3);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
receive_timeout_ms = 100
poll_interval_ms = 30000

[[devices]]
address = "192.168.1.20"
group = 0x01
class = 0x30
retry_timeout_ms = 500
"#
        )
        .unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.receive_timeout_ms, 100);
        assert_eq!(config.poll_interval_ms, 30_000);
        assert_eq!(config.retry_timeout_ms, 2_000);
        assert_eq!(config.devices.len(), 1);

        let entry = &config.devices[0];
        let key = entry.key();
        assert_eq!(key.address, "192.168.1.20:3610".parse().unwrap());
        assert_eq!(key.class, ClassCode::new(0x01, 0x30));
        assert_eq!(key.instance, 1);

        let settings = entry.settings(config.device_settings());
        assert_eq!(settings.retry_timeout, Duration::from_millis(500));
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert!(config.validate(&PropertyRegistry::new()).is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let registry = PropertyRegistry::new();

        let config = EngineConfig {
            retry_timeout_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(&registry), Err(Error::Config(msg)) if msg.contains("retry_timeout_ms")));

        let config = EngineConfig {
            devices: vec![DeviceEntry {
                address: "192.168.1.21".parse().unwrap(),
                port: 3610,
                group: 0x03,
                class: 0xB7,
                instance: 1,
                poll_interval_ms: None,
                retry_timeout_ms: None,
            }],
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(&registry), Err(Error::Config(msg)) if msg.contains("03B7")));
    }
}
