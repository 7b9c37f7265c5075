//! Payload codecs: EDT bytes <-> [`State`].

use bytes::{BufMut, BytesMut};

use crate::error::CodecError;
use crate::state::{State, Unit};

/// How a property's payload maps onto a domain value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Codec {
    /// Single byte, one value for on and another for off.
    OnOff { on: u8, off: u8 },
    /// Single byte from a fixed option table.
    Options(&'static [(u8, &'static str)]),
    /// Signed byte in °C with the 0x7E/0x7F/0x80 sentinels.
    Temperature,
    /// Unsigned byte in °C, 0..=50, 0xFD = undefined.
    SetTemperature,
    /// Big-endian unsigned integer, optionally scaled and tagged with a unit.
    Unsigned { width: u8, unit: Option<Unit>, scale: f64 },
    /// Printable ASCII, trailing NUL and space padding trimmed.
    Ascii,
    /// Opaque bytes rendered as lowercase hex.
    Hex,
    /// Location code (upper 5 bits) and number (lower 3 bits).
    InstallationLocation,
    /// Two bytes: hour, minute.
    TimeOfDay,
    /// Four bytes: year (u16), month, day.
    Date,
    /// Unit byte followed by a u32 count, exposed in hours.
    OperatingTime,
}

pub(crate) const PERCENT: Codec = Codec::Unsigned {
    width: 1,
    unit: Some(Unit::Percent),
    scale: 1.0,
};

const LOCATIONS: [&str; 16] = [
    "unspecified",
    "living",
    "dining",
    "kitchen",
    "bathroom",
    "lavatory",
    "washroom",
    "passageway",
    "room",
    "stairway",
    "front-door",
    "storeroom",
    "garden",
    "garage",
    "veranda",
    "other",
];

fn expect_len(edt: &[u8], expected: usize) -> Result<(), CodecError> {
    if edt.len() != expected {
        return Err(CodecError::Length {
            expected,
            actual: edt.len(),
        });
    }
    Ok(())
}

fn mismatch(state: &State) -> CodecError {
    CodecError::TypeMismatch(state.to_string())
}

impl Codec {
    pub fn decode(&self, edt: &[u8]) -> Result<State, CodecError> {
        match *self {
            Codec::OnOff { on, off } => {
                expect_len(edt, 1)?;
                match edt[0] {
                    b if b == on => Ok(State::on()),
                    b if b == off => Ok(State::off()),
                    b => Err(CodecError::UnknownByte(b)),
                }
            }
            Codec::Options(table) => {
                expect_len(edt, 1)?;
                table
                    .iter()
                    .find(|(code, _)| *code == edt[0])
                    .map(|(_, name)| State::option(*name))
                    .ok_or(CodecError::UnknownByte(edt[0]))
            }
            Codec::Temperature => {
                expect_len(edt, 1)?;
                match edt[0] {
                    0x7E | 0x7F | 0x80 => Ok(State::Undefined),
                    b => Ok(State::quantity(f64::from(b as i8), Unit::Celsius)),
                }
            }
            Codec::SetTemperature => {
                expect_len(edt, 1)?;
                match edt[0] {
                    0xFD => Ok(State::Undefined),
                    b if b <= 50 => Ok(State::quantity(f64::from(b), Unit::Celsius)),
                    b => Err(CodecError::OutOfRange(format!("set temperature {}", b))),
                }
            }
            Codec::Unsigned { width, unit, scale } => {
                expect_len(edt, width as usize)?;
                let raw = edt.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
                Ok(match unit {
                    Some(unit) => State::quantity(raw as f64 * scale, unit),
                    None => State::Number(raw as i64),
                })
            }
            Codec::Ascii => {
                let text: String = edt
                    .iter()
                    .take_while(|b| **b != 0)
                    .map(|b| if b.is_ascii() { *b as char } else { '?' })
                    .collect();
                Ok(State::Text(text.trim_end().to_string()))
            }
            Codec::Hex => Ok(State::Text(hex::encode(edt))),
            Codec::InstallationLocation => {
                expect_len(edt, 1)?;
                match edt[0] {
                    0x00 => Ok(State::option("unspecified")),
                    0xFF => Ok(State::option("undetermined")),
                    b @ 0x01..=0x07 => Ok(State::option(format!("free-definition-{}", b))),
                    b @ 0x80..=0xFE => Ok(State::option(format!("position-{}", hex::encode([b])))),
                    b => Ok(State::option(format!("{}-{}", LOCATIONS[(b >> 3) as usize], b & 0x07))),
                }
            }
            Codec::TimeOfDay => {
                expect_len(edt, 2)?;
                if edt[0] > 23 || edt[1] > 59 {
                    return Err(CodecError::OutOfRange(format!("time {}:{}", edt[0], edt[1])));
                }
                Ok(State::Text(format!("{:02}:{:02}", edt[0], edt[1])))
            }
            Codec::Date => {
                expect_len(edt, 4)?;
                let year = u16::from_be_bytes([edt[0], edt[1]]);
                Ok(State::Text(format!("{:04}-{:02}-{:02}", year, edt[2], edt[3])))
            }
            Codec::OperatingTime => {
                expect_len(edt, 5)?;
                let count = u32::from_be_bytes([edt[1], edt[2], edt[3], edt[4]]) as f64;
                let hours = match edt[0] {
                    0x41 => count / 3600.0,
                    0x42 => count / 60.0,
                    0x43 => count,
                    0x44 => count * 24.0,
                    b => return Err(CodecError::UnknownByte(b)),
                };
                Ok(State::quantity(hours, Unit::Hour))
            }
        }
    }

    pub fn encode(&self, state: &State, out: &mut BytesMut) -> Result<(), CodecError> {
        match *self {
            Codec::OnOff { on, off } => match state {
                State::OnOff(true) => out.put_u8(on),
                State::OnOff(false) => out.put_u8(off),
                other => return Err(mismatch(other)),
            },
            Codec::Options(table) => {
                let State::Option(name) = state else {
                    return Err(mismatch(state));
                };
                let code = table
                    .iter()
                    .find(|(_, n)| n.eq_ignore_ascii_case(name))
                    .map(|(code, _)| *code)
                    .ok_or_else(|| CodecError::OutOfRange(format!("unknown option '{}'", name)))?;
                out.put_u8(code);
            }
            Codec::Temperature => {
                let value = numeric(state)?.round();
                if !(-127.0..=125.0).contains(&value) {
                    return Err(CodecError::OutOfRange(format!("temperature {}", value)));
                }
                out.put_i8(value as i8);
            }
            Codec::SetTemperature => {
                let value = numeric(state)?.round();
                if !(0.0..=50.0).contains(&value) {
                    return Err(CodecError::OutOfRange(format!("set temperature {}", value)));
                }
                out.put_u8(value as u8);
            }
            Codec::Unsigned { width, scale, .. } => {
                let value = (numeric(state)? / scale).round();
                let max = if width >= 8 {
                    u64::MAX as f64
                } else {
                    ((1u64 << (u32::from(width) * 8)) - 1) as f64
                };
                if value < 0.0 || value > max {
                    return Err(CodecError::OutOfRange(format!("{} does not fit {} bytes", value, width)));
                }
                let bytes = (value as u64).to_be_bytes();
                out.put_slice(&bytes[8 - width as usize..]);
            }
            Codec::Ascii => {
                let State::Text(text) = state else {
                    return Err(mismatch(state));
                };
                if !text.is_ascii() {
                    return Err(CodecError::OutOfRange("non-ASCII text".to_string()));
                }
                out.put_slice(text.as_bytes());
            }
            Codec::Hex => {
                let State::Text(text) = state else {
                    return Err(mismatch(state));
                };
                let bytes =
                    hex::decode(text).map_err(|e| CodecError::OutOfRange(format!("invalid hex '{}': {}", text, e)))?;
                out.put_slice(&bytes);
            }
            Codec::InstallationLocation => {
                let State::Option(name) = state else {
                    return Err(mismatch(state));
                };
                out.put_u8(encode_location(name)?);
            }
            Codec::TimeOfDay => {
                let State::Text(text) = state else {
                    return Err(mismatch(state));
                };
                let (h, m) = text
                    .split_once(':')
                    .and_then(|(h, m)| Some((h.parse::<u8>().ok()?, m.parse::<u8>().ok()?)))
                    .filter(|(h, m)| *h <= 23 && *m <= 59)
                    .ok_or_else(|| CodecError::OutOfRange(format!("time '{}'", text)))?;
                out.put_u8(h);
                out.put_u8(m);
            }
            Codec::Date => {
                let State::Text(text) = state else {
                    return Err(mismatch(state));
                };
                let parts: Vec<&str> = text.split('-').collect();
                let parsed = match parts.as_slice() {
                    [y, m, d] => y
                        .parse::<u16>()
                        .ok()
                        .zip(m.parse::<u8>().ok())
                        .zip(d.parse::<u8>().ok())
                        .filter(|((_, m), d)| (1..=12).contains(m) && (1..=31).contains(d)),
                    _ => None,
                };
                let ((year, month), day) =
                    parsed.ok_or_else(|| CodecError::OutOfRange(format!("date '{}'", text)))?;
                out.put_u16(year);
                out.put_u8(month);
                out.put_u8(day);
            }
            Codec::OperatingTime => return Err(mismatch(state)),
        }
        Ok(())
    }
}

fn numeric(state: &State) -> Result<f64, CodecError> {
    match state {
        State::Number(n) => Ok(*n as f64),
        State::Quantity { value, .. } => Ok(*value),
        other => Err(mismatch(other)),
    }
}

fn encode_location(name: &str) -> Result<u8, CodecError> {
    match name {
        "unspecified" => return Ok(0x00),
        "undetermined" => return Ok(0xFF),
        _ => {}
    }
    let bad = || CodecError::OutOfRange(format!("location '{}'", name));
    let (place, number) = name.rsplit_once('-').ok_or_else(bad)?;
    if place == "position" {
        return match hex::decode(number).map_err(|_| bad())?.as_slice() {
            [b @ 0x80..=0xFE] => Ok(*b),
            _ => Err(bad()),
        };
    }

    let number: u8 = number.parse().map_err(|_| bad())?;
    if place == "free-definition" {
        return if (1..=7).contains(&number) { Ok(number) } else { Err(bad()) };
    }
    let index = LOCATIONS[1..]
        .iter()
        .position(|l| *l == place)
        .map(|i| i + 1)
        .ok_or_else(bad)?;
    if number > 7 {
        return Err(bad());
    }
    Ok(((index as u8) << 3) | number)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: &[(u8, &str)] = &[(0x41, "auto"), (0x42, "cooling")];

    fn encoded(codec: Codec, state: &State) -> Vec<u8> {
        let mut out = BytesMut::new();
        codec.encode(state, &mut out).unwrap();
        out.to_vec()
    }

    #[test]
    fn test_operation_status() {
        let codec = Codec::OnOff { on: 0x30, off: 0x31 };
        assert_eq!(codec.decode(&[0x30]).unwrap(), State::on());
        assert_eq!(codec.decode(&[0x31]).unwrap(), State::off());
        assert_eq!(codec.decode(&[0x32]).unwrap_err(), CodecError::UnknownByte(0x32));
        assert_eq!(encoded(codec, &State::off()), vec![0x31]);
    }

    #[test]
    fn test_options() {
        let codec = Codec::Options(MODES);
        assert_eq!(codec.decode(&[0x42]).unwrap(), State::option("cooling"));
        assert_eq!(encoded(codec, &State::option("Auto")), vec![0x41]);
        let mut out = BytesMut::new();
        assert!(codec.encode(&State::option("turbo"), &mut out).is_err());
    }

    #[test]
    fn test_temperatures() {
        assert_eq!(
            Codec::Temperature.decode(&[0xFB]).unwrap(),
            State::quantity(-5.0, Unit::Celsius)
        );
        assert_eq!(Codec::Temperature.decode(&[0x7E]).unwrap(), State::Undefined);
        assert_eq!(encoded(Codec::SetTemperature, &State::Number(24)), vec![24]);
        assert_eq!(
            encoded(Codec::SetTemperature, &State::quantity(21.4, Unit::Celsius)),
            vec![21]
        );
        let mut out = BytesMut::new();
        assert!(Codec::SetTemperature.encode(&State::Number(60), &mut out).is_err());
    }

    #[test]
    fn test_unsigned_scaled() {
        let codec = Codec::Unsigned {
            width: 4,
            unit: Some(Unit::KilowattHour),
            scale: 0.001,
        };
        assert_eq!(
            codec.decode(&[0x00, 0x00, 0x30, 0x39]).unwrap(),
            State::quantity(12345.0 * 0.001, Unit::KilowattHour)
        );
        assert_eq!(encoded(PERCENT, &State::Number(55)), vec![55]);
        let mut out = BytesMut::new();
        assert!(PERCENT.encode(&State::Number(300), &mut out).is_err());
    }

    #[test]
    fn test_text_codecs() {
        assert_eq!(
            Codec::Ascii.decode(b"AC-100  \0\0").unwrap(),
            State::Text("AC-100".to_string())
        );
        assert_eq!(
            Codec::Hex.decode(&[0xFE, 0x00, 0x0B]).unwrap(),
            State::Text("fe000b".to_string())
        );
        assert_eq!(encoded(Codec::Hex, &State::Text("fe000b".into())), vec![0xFE, 0x00, 0x0B]);
        let mut out = BytesMut::new();
        assert!(Codec::Hex.encode(&State::Text("fe0".into()), &mut out).is_err());
        assert!(Codec::Hex.encode(&State::Text("zz".into()), &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_installation_location() {
        let codec = Codec::InstallationLocation;
        assert_eq!(codec.decode(&[0x0A]).unwrap(), State::option("living-2"));
        assert_eq!(encoded(codec, &State::option("living-2")), vec![0x0A]);
        assert_eq!(codec.decode(&[0x00]).unwrap(), State::option("unspecified"));
        assert_eq!(codec.decode(&[0x03]).unwrap(), State::option("free-definition-3"));
        assert_eq!(encoded(codec, &State::option("free-definition-3")), vec![0x03]);
        assert_eq!(codec.decode(&[0x9A]).unwrap(), State::option("position-9a"));
        assert_eq!(encoded(codec, &State::option("position-9a")), vec![0x9A]);
        assert_eq!(codec.decode(&[0x7F]).unwrap(), State::option("other-7"));
        let mut out = BytesMut::new();
        assert!(codec.encode(&State::option("unspecified-2"), &mut out).is_err());
        assert!(codec.encode(&State::option("position-12"), &mut out).is_err());
    }

    #[test]
    fn test_time_and_date() {
        assert_eq!(
            Codec::TimeOfDay.decode(&[7, 5]).unwrap(),
            State::Text("07:05".to_string())
        );
        assert_eq!(encoded(Codec::TimeOfDay, &State::Text("23:59".into())), vec![23, 59]);
        assert_eq!(
            Codec::Date.decode(&[0x07, 0xE8, 2, 29]).unwrap(),
            State::Text("2024-02-29".to_string())
        );
        assert_eq!(
            encoded(Codec::Date, &State::Text("2024-02-29".into())),
            vec![0x07, 0xE8, 2, 29]
        );
    }

    #[test]
    fn test_operating_time() {
        assert_eq!(
            Codec::OperatingTime.decode(&[0x42, 0, 0, 0, 120]).unwrap(),
            State::quantity(2.0, Unit::Hour)
        );
        assert!(Codec::OperatingTime.decode(&[0x42, 0]).is_err());
    }
}
