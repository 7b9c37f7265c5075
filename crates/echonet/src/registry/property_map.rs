//! Property map payloads (EPC 0x9D/0x9E/0x9F).
//!
//! The first byte is the number of properties. Below 16 an explicit code list
//! follows; from 16 upwards a 16-byte bitmap follows instead.

use std::collections::BTreeSet;

use crate::error::CodecError;

const BITMAP_THRESHOLD: u8 = 16;
const BITMAP_LEN: usize = 16;

const fn build_property_map() -> [[u8; 8]; 16] {
    let mut table = [[0u8; 8]; 16];
    let mut i = 0;
    while i < 16 {
        let mut j = 0;
        while j < 8 {
            table[i][j] = 0x80 | ((j as u8) << 4) | i as u8;
            j += 1;
        }
        i += 1;
    }
    table
}

/// Bit `j` of bitmap byte `i` stands for property code `PROPERTY_MAP[i][j]`.
pub const PROPERTY_MAP: [[u8; 8]; 16] = build_property_map();

pub fn parse_property_map(edt: &[u8]) -> Result<BTreeSet<u8>, CodecError> {
    let Some((&count, body)) = edt.split_first() else {
        return Err(CodecError::Length {
            expected: 1,
            actual: 0,
        });
    };

    if count < BITMAP_THRESHOLD {
        let count = count as usize;
        if body.len() < count {
            return Err(CodecError::Length {
                expected: count + 1,
                actual: edt.len(),
            });
        }
        return Ok(body[..count].iter().copied().collect());
    }

    if body.len() < BITMAP_LEN {
        return Err(CodecError::Length {
            expected: BITMAP_LEN + 1,
            actual: edt.len(),
        });
    }

    let mut codes = BTreeSet::new();
    for (i, byte) in body[..BITMAP_LEN].iter().enumerate() {
        for (j, code) in PROPERTY_MAP[i].iter().enumerate() {
            if byte & (1 << j) != 0 {
                codes.insert(*code);
            }
        }
    }

    if codes.len() != count as usize {
        tracing::debug!(
            "Property map declares {} entries but bitmap has {}",
            count,
            codes.len()
        );
    }
    Ok(codes)
}
