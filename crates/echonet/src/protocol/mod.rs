//! ECHONET Lite wire format
//!
//! Frames are big-endian with a fixed 12-byte head:
//!
//! ```text
//! EHD1 EHD2 | TID(2) | SEOJ(3) | DEOJ(3) | ESV | OPC | { EPC PDC EDT[PDC] } * OPC
//! ```

mod builder;
mod message;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub use builder::MessageBuilder;
pub use message::EchonetMessage;

/// First header byte: ECHONET Lite.
pub const EHD1: u8 = 0x10;
/// Second header byte: format 1 (specified message format).
pub const EHD2: u8 = 0x81;

/// Standard UDP port for ECHONET Lite.
pub const ECHONET_PORT: u16 = 3610;
/// Standard multicast group used for discovery and announcements.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 23, 0);

/// Our own object id: controller class, instance 1.
pub const CONTROLLER_EOJ: [u8; 3] = [0x05, 0xFF, 0x01];

pub(crate) const OFFSET_TID: usize = 2;
pub(crate) const OFFSET_SEOJ: usize = 4;
pub(crate) const OFFSET_DEOJ: usize = 7;
pub(crate) const OFFSET_ESV: usize = 10;
pub(crate) const OFFSET_OPC: usize = 11;
pub(crate) const HEADER_LEN: usize = 12;

/// Upper bound for a single datagram we build or accept.
pub const MAX_FRAME_LEN: usize = 1500;

/// Multicast destination on the standard port.
pub fn multicast_address() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(MULTICAST_GROUP, ECHONET_PORT))
}

/// ECHONET Lite service codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Esv {
    SetI = 0x60,
    SetC = 0x61,
    Get = 0x62,
    InfReq = 0x63,
    SetGet = 0x6E,
    SetRes = 0x71,
    GetRes = 0x72,
    Inf = 0x73,
    InfC = 0x74,
    InfCRes = 0x7A,
    SetGetRes = 0x7E,
    SetISna = 0x50,
    SetCSna = 0x51,
    GetSna = 0x52,
    InfSna = 0x53,
    SetGetSna = 0x5E,
}

impl Esv {
    pub fn from_code(code: u8) -> Option<Self> {
        let esv = match code {
            0x60 => Esv::SetI,
            0x61 => Esv::SetC,
            0x62 => Esv::Get,
            0x63 => Esv::InfReq,
            0x6E => Esv::SetGet,
            0x71 => Esv::SetRes,
            0x72 => Esv::GetRes,
            0x73 => Esv::Inf,
            0x74 => Esv::InfC,
            0x7A => Esv::InfCRes,
            0x7E => Esv::SetGetRes,
            0x50 => Esv::SetISna,
            0x51 => Esv::SetCSna,
            0x52 => Esv::GetSna,
            0x53 => Esv::InfSna,
            0x5E => Esv::SetGetSna,
            _ => return None,
        };
        Some(esv)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Replies that close an outstanding GET.
    pub fn is_get_response(self) -> bool {
        matches!(self, Esv::GetRes | Esv::GetSna)
    }

    /// Replies that close an outstanding SetC.
    pub fn is_set_response(self) -> bool {
        matches!(self, Esv::SetRes | Esv::SetCSna)
    }

    /// Service codes whose property entries carry readable values.
    pub fn carries_values(self) -> bool {
        matches!(self, Esv::GetRes | Esv::GetSna | Esv::Inf | Esv::InfC)
    }

    /// "Service not available" variants.
    pub fn is_failure(self) -> bool {
        (self.code() & 0xF0) == 0x50
    }
}
