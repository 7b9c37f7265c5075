//! Device identity types.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Class group code plus class code, e.g. `01 30` for a home air conditioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassCode {
    pub group: u8,
    pub class: u8,
}

impl ClassCode {
    pub const fn new(group: u8, class: u8) -> Self {
        Self { group, class }
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.group, self.class)
    }
}

/// Identifies one ECHONET object on the network.
///
/// Used as the sole lookup key for devices in the reactor. Equality and hashing
/// are purely structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub address: SocketAddr,
    pub class: ClassCode,
    pub instance: u8,
}

impl InstanceKey {
    pub const fn new(address: SocketAddr, class: ClassCode, instance: u8) -> Self {
        Self {
            address,
            class,
            instance,
        }
    }

    /// The three EOJ bytes (group, class, instance) for this object.
    pub fn eoj(&self) -> [u8; 3] {
        [self.class.group, self.class.class, self.instance]
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.address, self.class, self.instance)
    }
}
