//! ECHONET Lite controller engine
//!
//! Discovers ECHONET Lite appliances on the local network, keeps a decoded
//! copy of their properties and queues writes, all from a single reactor
//! thread driven through [`engine::EngineHandle`].

pub mod config;
pub mod device;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod key;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod transport;

pub use config::{DeviceEntry, EngineConfig};
pub use device::{ChannelListener, DeviceEvent, DeviceListener, DeviceSettings};
pub use discovery::DiscoveryListener;
pub use engine::{Engine, EngineCommand, EngineHandle};
pub use error::{Error, Result};
pub use key::{ClassCode, InstanceKey};
pub use registry::PropertyRegistry;
pub use state::{State, Unit};
