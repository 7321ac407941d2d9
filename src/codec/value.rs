//! Sensor value decoding.
//!
//! Payload layout after the type tag:
//!
//! | Tag | Type   | Bytes                          |
//! |-----|--------|--------------------------------|
//! | 1   | u8     | 1                              |
//! | 2   | f32    | 4, little endian               |
//! | 3   | i16    | 2, little endian               |
//! | 4   | string | 1 length byte + that many ASCII|
//! | 5   | double | 4, decoded as f32              |
//!
//! Floats outside [`FLOAT_RANGE`] are the firmware's "invalid" sentinel and
//! decode as `0.0`.

use std::fmt;
use std::ops::RangeInclusive;

use serde::Serialize;

use crate::protocol::decode_i16;

/// Type tag values.
pub mod type_tag {
    /// Unsigned byte.
    pub const U8: u8 = 1;
    /// 32-bit float.
    pub const F32: u8 = 2;
    /// Signed 16-bit integer.
    pub const I16: u8 = 3;
    /// Length-prefixed ASCII string.
    pub const STRING: u8 = 4;
    /// Double; the firmware sends 4 bytes.
    pub const DOUBLE: u8 = 5;
}

/// Valid range for float readings; anything else becomes `0.0`.
pub const FLOAT_RANGE: RangeInclusive<f32> = -255.0..=1023.0;

/// A decoded sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    /// Tag 1.
    U8(u8),
    /// Tag 3.
    I16(i16),
    /// Tags 2 and 5.
    F32(f32),
    /// Tag 4.
    Text(String),
}

impl SensorValue {
    /// Numeric view of the value, `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SensorValue::U8(v) => Some(f64::from(*v)),
            SensorValue::I16(v) => Some(f64::from(*v)),
            SensorValue::F32(v) => Some(f64::from(*v)),
            SensorValue::Text(_) => None,
        }
    }

    /// Integer view of the value, `None` for floats and text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SensorValue::U8(v) => Some(i64::from(*v)),
            SensorValue::I16(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Text view of the value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SensorValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::U8(v) => write!(f, "{}", v),
            SensorValue::I16(v) => write!(f, "{}", v),
            SensorValue::F32(v) => write!(f, "{}", v),
            SensorValue::Text(s) => f.write_str(s),
        }
    }
}

/// Decoder for data frame payloads.
pub struct ValueCodec;

impl ValueCodec {
    /// Decode `payload` according to `tag`.
    ///
    /// Returns `None` for an unknown tag or a payload too short for it.
    pub fn decode(tag: u8, payload: &[u8]) -> Option<SensorValue> {
        match tag {
            type_tag::U8 => payload.first().copied().map(SensorValue::U8),
            type_tag::F32 | type_tag::DOUBLE => Self::decode_f32(payload).map(SensorValue::F32),
            type_tag::I16 => decode_i16(payload).map(SensorValue::I16),
            type_tag::STRING => Self::decode_text(payload).map(SensorValue::Text),
            _ => None,
        }
    }

    fn decode_f32(payload: &[u8]) -> Option<f32> {
        let bytes: [u8; 4] = payload.get(..4)?.try_into().ok()?;
        let value = f32::from_le_bytes(bytes);
        if FLOAT_RANGE.contains(&value) {
            Some(value)
        } else {
            Some(0.0)
        }
    }

    fn decode_text(payload: &[u8]) -> Option<String> {
        let (&len, rest) = payload.split_first()?;
        let text = rest.get(..usize::from(len))?;
        Some(String::from_utf8_lossy(text).into_owned())
    }
}

/// Shorthand for [`ValueCodec::decode`].
#[inline]
pub fn decode_value(tag: u8, payload: &[u8]) -> Option<SensorValue> {
    ValueCodec::decode(tag, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_payload(v: f32) -> [u8; 4] {
        v.to_le_bytes()
    }

    #[test]
    fn test_decode_u8() {
        assert_eq!(decode_value(type_tag::U8, &[0xC8]), Some(SensorValue::U8(200)));
        assert_eq!(decode_value(type_tag::U8, &[]), None);
    }

    #[test]
    fn test_decode_i16_little_endian() {
        assert_eq!(
            decode_value(type_tag::I16, &[0x2A, 0x00]),
            Some(SensorValue::I16(42))
        );
        assert_eq!(
            decode_value(type_tag::I16, &[0x00, 0x2A]),
            Some(SensorValue::I16(0x2A00))
        );
        assert_eq!(
            decode_value(type_tag::I16, &[0xFE, 0xFF]),
            Some(SensorValue::I16(-2))
        );
    }

    #[test]
    fn test_decode_f32() {
        let value = decode_value(type_tag::F32, &f32_payload(23.5)).unwrap();
        assert_eq!(value, SensorValue::F32(23.5));
    }

    #[test]
    fn test_decode_f32_bounds_preserved() {
        assert_eq!(
            decode_value(type_tag::F32, &f32_payload(-255.0)),
            Some(SensorValue::F32(-255.0))
        );
        assert_eq!(
            decode_value(type_tag::F32, &f32_payload(1023.0)),
            Some(SensorValue::F32(1023.0))
        );
    }

    #[test]
    fn test_decode_f32_out_of_range_is_zero() {
        assert_eq!(
            decode_value(type_tag::F32, &f32_payload(-255.5)),
            Some(SensorValue::F32(0.0))
        );
        assert_eq!(
            decode_value(type_tag::F32, &f32_payload(1023.1)),
            Some(SensorValue::F32(0.0))
        );
        assert_eq!(
            decode_value(type_tag::F32, &f32_payload(f32::NAN)),
            Some(SensorValue::F32(0.0))
        );
    }

    #[test]
    fn test_decode_double_aliases_float() {
        assert_eq!(
            decode_value(type_tag::DOUBLE, &f32_payload(12.25)),
            Some(SensorValue::F32(12.25))
        );
        assert_eq!(
            decode_value(type_tag::DOUBLE, &f32_payload(5000.0)),
            Some(SensorValue::F32(0.0))
        );
    }

    #[test]
    fn test_decode_f32_short_payload() {
        assert_eq!(decode_value(type_tag::F32, &[0x00, 0x00, 0x80]), None);
    }

    #[test]
    fn test_decode_text() {
        let payload = [5, b'C', b'o', b'c', b'o', b'1', 0xAA];
        assert_eq!(
            decode_value(type_tag::STRING, &payload),
            Some(SensorValue::Text("Coco1".to_string()))
        );
        assert_eq!(decode_value(type_tag::STRING, &[3, b'a']), None);
        assert_eq!(
            decode_value(type_tag::STRING, &[0]),
            Some(SensorValue::Text(String::new()))
        );
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(decode_value(0, &[1, 2, 3, 4]), None);
        assert_eq!(decode_value(9, &[1, 2, 3, 4]), None);
    }

    #[test]
    fn test_views() {
        assert_eq!(SensorValue::U8(7).as_i64(), Some(7));
        assert_eq!(SensorValue::I16(-3).as_f64(), Some(-3.0));
        assert_eq!(SensorValue::F32(1.5).as_i64(), None);
        assert_eq!(SensorValue::Text("x".into()).as_str(), Some("x"));
        assert_eq!(SensorValue::Text("x".into()).as_f64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(SensorValue::I16(42).to_string(), "42");
        assert_eq!(SensorValue::Text("ok".into()).to_string(), "ok");
    }
}
