//! Outgoing frame builder and incoming frame classification.
//!
//! # Example
//!
//! ```
//! use coconut_link::protocol::{action, build_frame, InboundFrame, Param};
//! use bytes::Bytes;
//!
//! let frame = build_frame(action::RUN, 0x1A, 0x00, &[Param::Byte(3), Param::Byte(60)]).unwrap();
//! assert_eq!(&frame[..], &[0xFF, 0x55, 0x06, 0x00, 0x02, 0x1A, 0x00, 0x03, 0x3C]);
//!
//! let ack = InboundFrame::parse(Bytes::from_static(&[0xFF, 0x55, 0x00, 0x04])).unwrap();
//! assert!(ack.is_ack());
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{
    encode_i16, fix_length, ACK_FRAME_LEN, DEFAULT_EXT_ID, EXT_OFFSET, LEN_OFFSET,
    MIN_DATA_FRAME_LEN, PAYLOAD_OFFSET, RESET_FRAME, START_MARKER, TYPE_TAG_OFFSET,
};
use crate::error::{CoconutError, Result};

/// A single operation parameter.
///
/// Multi-byte parameters are flattened into the frame in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// One byte.
    Byte(u8),
    /// Signed 16-bit value, low byte first.
    Word(i16),
    /// Raw byte run (e.g. LED matrix rows).
    Array(Vec<u8>),
}

impl Param {
    fn put(&self, buf: &mut BytesMut) {
        match self {
            Param::Byte(b) => buf.put_u8(*b),
            Param::Word(w) => buf.put_slice(&encode_i16(*w)),
            Param::Array(bytes) => buf.put_slice(bytes),
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Param::Byte(_) => 1,
            Param::Word(_) => 2,
            Param::Array(bytes) => bytes.len(),
        }
    }
}

impl From<u8> for Param {
    fn from(value: u8) -> Self {
        Param::Byte(value)
    }
}

impl From<i16> for Param {
    fn from(value: i16) -> Self {
        Param::Word(value)
    }
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Byte(u8::from(value))
    }
}

/// Build an outgoing frame.
///
/// Produces `[FF, 55, len, 00, action, device, sub_command, params...]` with
/// `len` rewritten to `frame.len() - 3` after the parameters are appended.
pub fn build_frame(action: u8, device: u8, sub_command: u8, params: &[Param]) -> Result<Bytes> {
    let body: usize = params.iter().map(Param::encoded_len).sum();
    let mut buf = BytesMut::with_capacity(7 + body);

    buf.put_slice(&START_MARKER);
    buf.put_u8(0x00);
    buf.put_u8(DEFAULT_EXT_ID);
    buf.put_u8(action);
    buf.put_u8(device);
    buf.put_u8(sub_command);
    for param in params {
        param.put(&mut buf);
    }

    fix_length(&mut buf)?;
    Ok(buf.freeze())
}

/// The reset / stop-all frame `FF 55 02 00 04`.
pub fn build_reset_frame() -> Bytes {
    Bytes::from_static(&RESET_FRAME)
}

/// Which of the two incoming shapes a frame has (or a request expects).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameShape {
    /// Fixed 4-byte acknowledgement.
    Ack,
    /// Variable-length typed reply.
    Data,
}

/// A complete frame received from the robot, end marker stripped.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Bare acknowledgement of a run or reset command.
    Ack,
    /// Reply to a query.
    Data {
        /// Length byte as sent by the robot.
        declared_len: u8,
        /// Extension ID echoed by the robot.
        ext_id: u8,
        /// Value type tag (see [`crate::codec::decode_value`]).
        type_tag: u8,
        /// Bytes after the type tag.
        payload: Bytes,
    },
}

impl InboundFrame {
    /// Classify a frame delivered by [`super::FrameBuffer`].
    ///
    /// Exactly four bytes is an ack; five or more is a data frame.
    pub fn parse(raw: Bytes) -> Result<Self> {
        if !raw.starts_with(&START_MARKER) {
            return Err(CoconutError::Protocol(format!(
                "Frame does not start with FF 55: {:02X?}",
                &raw[..raw.len().min(8)]
            )));
        }

        match raw.len() {
            ACK_FRAME_LEN => Ok(InboundFrame::Ack),
            n if n >= MIN_DATA_FRAME_LEN => Ok(InboundFrame::Data {
                declared_len: raw[LEN_OFFSET],
                ext_id: raw[EXT_OFFSET],
                type_tag: raw[TYPE_TAG_OFFSET],
                payload: raw.slice(PAYLOAD_OFFSET..),
            }),
            n => Err(CoconutError::Protocol(format!(
                "Frame of {} bytes is neither ack nor data",
                n
            ))),
        }
    }

    /// Shape of this frame.
    #[inline]
    pub fn shape(&self) -> FrameShape {
        match self {
            InboundFrame::Ack => FrameShape::Ack,
            InboundFrame::Data { .. } => FrameShape::Data,
        }
    }

    /// Check if this is an ack.
    #[inline]
    pub fn is_ack(&self) -> bool {
        matches!(self, InboundFrame::Ack)
    }

    /// Type tag and payload of a data frame.
    pub fn data(&self) -> Option<(u8, &[u8])> {
        match self {
            InboundFrame::Data {
                type_tag, payload, ..
            } => Some((*type_tag, &payload[..])),
            InboundFrame::Ack => None,
        }
    }
}
