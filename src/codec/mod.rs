//! Codec module - typed values carried by data frames.
//!
//! - [`ValueCodec`] - decodes a data frame payload according to its type tag
//! - [`SensorValue`] - the decoded scalar
//!
//! # Example
//!
//! ```
//! use coconut_link::codec::{type_tag, SensorValue, ValueCodec};
//!
//! let value = ValueCodec::decode(type_tag::I16, &[0x2A, 0x00]);
//! assert_eq!(value, Some(SensorValue::I16(42)));
//! ```

mod value;

pub use value::{decode_value, type_tag, SensorValue, ValueCodec, FLOAT_RANGE};
