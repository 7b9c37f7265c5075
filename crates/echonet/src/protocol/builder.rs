//! Outbound frame construction.

use bytes::{BufMut, BytesMut};

use super::{EHD1, EHD2, Esv, HEADER_LEN, MAX_FRAME_LEN, OFFSET_OPC};
use crate::error::CodecError;
use crate::registry::Codec;
use crate::state::State;

/// Reusable frame builder.
///
/// The property count byte is reserved by [`start`](Self::start) and bumped in
/// place by every `append_*` call, so it always matches the entries written.
/// Owned by the reactor thread; not shared.
pub struct MessageBuilder {
    buf: BytesMut,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Reset the buffer and write the fixed head with an empty property list.
    pub fn start(&mut self, tid: u16, seoj: [u8; 3], deoj: [u8; 3], esv: Esv) -> &mut Self {
        self.buf.clear();
        self.buf.put_u8(EHD1);
        self.buf.put_u8(EHD2);
        self.buf.put_u16(tid);
        self.buf.put_slice(&seoj);
        self.buf.put_slice(&deoj);
        self.buf.put_u8(esv.code());
        self.buf.put_u8(0);
        self
    }

    /// Append an entry with no payload (GET requests, SET acknowledgements).
    pub fn append_epc_request(&mut self, epc: u8) -> &mut Self {
        self.append_epc_update(epc, &[])
    }

    /// Append an entry carrying raw payload bytes.
    pub fn append_epc_update(&mut self, epc: u8, edt: &[u8]) -> &mut Self {
        debug_assert!(edt.len() <= u8::MAX as usize);
        self.buf.put_u8(epc);
        self.buf.put_u8(edt.len() as u8);
        self.buf.put_slice(edt);
        self.bump_count();
        self
    }

    /// Append an entry whose payload is produced by a codec.
    ///
    /// On failure nothing is written and the count is left untouched.
    pub fn append_encoded(&mut self, epc: u8, codec: &Codec, state: &State) -> Result<(), CodecError> {
        let entry_start = self.buf.len();
        self.buf.put_u8(epc);
        self.buf.put_u8(0);
        let edt_start = self.buf.len();

        if let Err(e) = codec.encode(state, &mut self.buf) {
            self.buf.truncate(entry_start);
            return Err(e);
        }

        let pdc = self.buf.len() - edt_start;
        if pdc > u8::MAX as usize {
            self.buf.truncate(entry_start);
            return Err(CodecError::OutOfRange(format!("payload of {} bytes", pdc)));
        }
        self.buf[edt_start - 1] = pdc as u8;
        self.bump_count();
        Ok(())
    }

    fn bump_count(&mut self) {
        debug_assert!(self.buf.len() >= HEADER_LEN, "append before start");
        self.buf[OFFSET_OPC] = self.buf[OFFSET_OPC].wrapping_add(1);
    }

    /// Number of property entries written so far.
    pub fn property_count(&self) -> u8 {
        self.buf.get(OFFSET_OPC).copied().unwrap_or(0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CONTROLLER_EOJ, EchonetMessage};

    #[test]
    fn test_count_tracks_every_append() {
        for n in 0..=40u8 {
            let mut builder = MessageBuilder::new();
            builder.start(7, CONTROLLER_EOJ, [0x01, 0x30, 0x01], Esv::SetC);
            for i in 0..n {
                builder.append_epc_update(0x80 + (i % 0x20), &vec![i; (i % 5) as usize]);
            }
            assert_eq!(builder.property_count(), n);
            assert_eq!(builder.as_bytes()[OFFSET_OPC], n);

            let mut msg = EchonetMessage::parse(builder.as_bytes()).unwrap();
            assert_eq!(msg.opc(), n);
            let mut seen = 0u8;
            while msg.move_next() {
                assert_eq!(msg.current_epc(), 0x80 + (seen % 0x20));
                assert_eq!(msg.current_pdc() as usize, (seen % 5) as usize);
                assert!(msg.current_edt().iter().all(|b| *b == seen));
                seen += 1;
            }
            assert_eq!(seen, n);
        }
    }

    #[test]
    fn test_head_layout() {
        let mut builder = MessageBuilder::new();
        builder
            .start(0x1234, CONTROLLER_EOJ, [0x0E, 0xF0, 0x01], Esv::Get)
            .append_epc_request(0xD6);
        assert_eq!(
            builder.as_bytes(),
            &[0x10, 0x81, 0x12, 0x34, 0x05, 0xFF, 0x01, 0x0E, 0xF0, 0x01, 0x62, 0x01, 0xD6, 0x00]
        );
    }

    #[test]
    fn test_failed_encode_leaves_frame_consistent() {
        let mut builder = MessageBuilder::new();
        builder.start(1, CONTROLLER_EOJ, [0x01, 0x30, 0x01], Esv::SetC);
        let codec = Codec::OnOff { on: 0x30, off: 0x31 };
        builder.append_encoded(0x80, &codec, &State::on()).unwrap();
        let len = builder.len();

        let err = builder.append_encoded(0x80, &codec, &State::Number(5));
        assert!(err.is_err());
        assert_eq!(builder.len(), len);
        assert_eq!(builder.property_count(), 1);
        assert_eq!(&builder.as_bytes()[HEADER_LEN..], &[0x80, 0x01, 0x30]);
    }

    #[test]
    fn test_start_reuses_buffer() {
        let mut builder = MessageBuilder::new();
        builder.start(1, CONTROLLER_EOJ, [0x01, 0x30, 0x01], Esv::Get);
        builder.append_epc_request(0x80).append_epc_request(0xB0);
        builder.start(2, CONTROLLER_EOJ, [0x01, 0x30, 0x01], Esv::Get);
        assert_eq!(builder.len(), HEADER_LEN);
        assert_eq!(builder.property_count(), 0);
    }
}
