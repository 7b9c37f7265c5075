//! Inbound frame parsing.

use super::{EHD1, EHD2, Esv, HEADER_LEN, OFFSET_DEOJ, OFFSET_ESV, OFFSET_OPC, OFFSET_SEOJ, OFFSET_TID};
use crate::error::FrameError;
use crate::key::ClassCode;

/// Borrowed view over one received frame with a property cursor.
///
/// [`parse`](Self::parse) checks every entry against the buffer length up
/// front, so the cursor accessors never index out of bounds.
#[derive(Debug, Clone)]
pub struct EchonetMessage<'a> {
    data: &'a [u8],
    /// Offset of the entry the cursor is on, if any.
    current: Option<usize>,
    /// Offset of the next unread entry.
    next: usize,
    remaining: u8,
}

impl<'a> EchonetMessage<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, FrameError> {
        if data.len() < HEADER_LEN {
            return Err(FrameError::TooShort(data.len()));
        }
        if data[0] != EHD1 || data[1] != EHD2 {
            return Err(FrameError::BadHeader(data[0], data[1]));
        }

        let count = data[OFFSET_OPC] as usize;
        let mut offset = HEADER_LEN;
        for index in 0..count {
            if offset + 2 > data.len() {
                return Err(FrameError::Truncated { index, count });
            }
            let pdc = data[offset + 1] as usize;
            offset += 2 + pdc;
            if offset > data.len() {
                return Err(FrameError::Truncated { index, count });
            }
        }

        Ok(Self {
            data,
            current: None,
            next: HEADER_LEN,
            remaining: data[OFFSET_OPC],
        })
    }

    pub fn tid(&self) -> u16 {
        u16::from_be_bytes([self.data[OFFSET_TID], self.data[OFFSET_TID + 1]])
    }

    pub fn deoj(&self) -> [u8; 3] {
        [
            self.data[OFFSET_DEOJ],
            self.data[OFFSET_DEOJ + 1],
            self.data[OFFSET_DEOJ + 2],
        ]
    }

    pub fn source_class(&self) -> ClassCode {
        ClassCode::new(self.data[OFFSET_SEOJ], self.data[OFFSET_SEOJ + 1])
    }

    pub fn source_instance(&self) -> u8 {
        self.data[OFFSET_SEOJ + 2]
    }

    pub fn esv_code(&self) -> u8 {
        self.data[OFFSET_ESV]
    }

    pub fn esv(&self) -> Option<Esv> {
        Esv::from_code(self.esv_code())
    }

    pub fn opc(&self) -> u8 {
        self.data[OFFSET_OPC]
    }

    /// Advance to the next property entry. Returns false once all are consumed.
    pub fn move_next(&mut self) -> bool {
        if self.remaining == 0 {
            self.current = None;
            return false;
        }
        let offset = self.next;
        let pdc = self.data[offset + 1] as usize;
        self.current = Some(offset);
        self.next = offset + 2 + pdc;
        self.remaining -= 1;
        true
    }

    pub fn current_epc(&self) -> u8 {
        self.current.map(|o| self.data[o]).unwrap_or(0)
    }

    pub fn current_pdc(&self) -> u8 {
        self.current.map(|o| self.data[o + 1]).unwrap_or(0)
    }

    pub fn current_edt(&self) -> &'a [u8] {
        match self.current {
            Some(o) => {
                let pdc = self.data[o + 1] as usize;
                &self.data[o + 2..o + 2 + pdc]
            }
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GET_RES: [u8; 17] = [
        0x10, 0x81, 0x00, 0x2A, 0x01, 0x30, 0x01, 0x05, 0xFF, 0x01, 0x72, 0x02, 0x80, 0x01, 0x30,
        0xB0, 0x00,
    ];

    #[test]
    fn test_parse_get_response() {
        let mut msg = EchonetMessage::parse(&GET_RES).unwrap();
        assert_eq!(msg.tid(), 42);
        assert_eq!(msg.source_class(), ClassCode::new(0x01, 0x30));
        assert_eq!(msg.source_instance(), 1);
        assert_eq!(msg.deoj(), [0x05, 0xFF, 0x01]);
        assert_eq!(msg.esv(), Some(Esv::GetRes));
        assert_eq!(msg.opc(), 2);

        assert!(msg.move_next());
        assert_eq!(msg.current_epc(), 0x80);
        assert_eq!(msg.current_pdc(), 1);
        assert_eq!(msg.current_edt(), &[0x30]);

        assert!(msg.move_next());
        assert_eq!(msg.current_epc(), 0xB0);
        assert_eq!(msg.current_edt(), &[] as &[u8]);

        assert!(!msg.move_next());
        assert!(!msg.move_next());
    }

    #[test]
    fn test_rejects_short_and_bad_header() {
        assert_eq!(EchonetMessage::parse(&GET_RES[..5]).unwrap_err(), FrameError::TooShort(5));

        let mut bad = GET_RES;
        bad[1] = 0x82;
        assert_eq!(EchonetMessage::parse(&bad).unwrap_err(), FrameError::BadHeader(0x10, 0x82));
    }

    #[test]
    fn test_rejects_truncated_property() {
        // Second entry claims one payload byte that is missing.
        let mut truncated = GET_RES.to_vec();
        truncated[16] = 0x01;
        assert_eq!(
            EchonetMessage::parse(&truncated).unwrap_err(),
            FrameError::Truncated { index: 1, count: 2 }
        );

        // Count claims a third entry.
        let mut overcount = GET_RES.to_vec();
        overcount[11] = 3;
        assert_eq!(
            EchonetMessage::parse(&overcount).unwrap_err(),
            FrameError::Truncated { index: 2, count: 3 }
        );
    }

    #[test]
    fn test_empty_property_list() {
        let frame = [0x10, 0x81, 0x00, 0x01, 0x01, 0x30, 0x01, 0x05, 0xFF, 0x01, 0x71, 0x00];
        let mut msg = EchonetMessage::parse(&frame).unwrap();
        assert_eq!(msg.esv(), Some(Esv::SetRes));
        assert!(!msg.move_next());
    }
}
