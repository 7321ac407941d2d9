//! Wire format constants and byte packing.
//!
//! Outgoing frames (host to robot):
//! ```text
//! ┌──────┬──────┬─────┬────────┬────────┬────────┬─────────┬───────────┐
//! │ 0xFF │ 0x55 │ len │ ext=00 │ action │ device │ sub-cmd │ params... │
//! └──────┴──────┴─────┴────────┴────────┴────────┴─────────┴───────────┘
//! ```
//! `len` counts every byte after itself (`frame.len() - 3`).
//!
//! Incoming frames (robot to host) share the start marker and are closed by
//! `0x0D 0x0A`:
//! ```text
//! ack:  FF 55 00 04                          0D 0A
//! data: FF 55 len ext type-tag payload...    0D 0A
//! ```
//!
//! Multi-byte integers are little endian.

use crate::error::{CoconutError, Result};

/// Frame start marker.
pub const START_MARKER: [u8; 2] = [0xFF, 0x55];

/// Frame end marker appended by the robot.
pub const END_MARKER: [u8; 2] = [0x0D, 0x0A];

/// Size of an ack frame (end marker excluded).
pub const ACK_FRAME_LEN: usize = 4;

/// Smallest data frame: start marker, length, extension ID, type tag.
pub const MIN_DATA_FRAME_LEN: usize = 5;

/// Default cap on the accumulation buffer before it rolls over.
pub const DEFAULT_MAX_BUFFER: usize = 1024;

/// Offset of the length byte.
pub const LEN_OFFSET: usize = 2;
/// Offset of the extension ID.
pub const EXT_OFFSET: usize = 3;
/// Offset of the action byte in outgoing frames.
pub const ACTION_OFFSET: usize = 4;
/// Offset of the device-class ID in outgoing frames.
pub const DEVICE_OFFSET: usize = 5;
/// Offset of the sub-command in outgoing frames.
pub const SUB_COMMAND_OFFSET: usize = 6;
/// Offset of the first operation parameter in outgoing frames.
pub const PARAMS_OFFSET: usize = 7;
/// Offset of the type tag in incoming data frames.
pub const TYPE_TAG_OFFSET: usize = 4;
/// Offset of the payload in incoming data frames.
pub const PAYLOAD_OFFSET: usize = 5;

/// Extension ID used by every host request.
pub const DEFAULT_EXT_ID: u8 = 0x00;

/// Reset / stop-all request. Also sent as the handshake on connect.
pub const RESET_FRAME: [u8; 5] = [0xFF, 0x55, 0x02, DEFAULT_EXT_ID, action::RESET];

/// Action byte values.
pub mod action {
    /// Query that expects a data frame.
    pub const GET: u8 = 0x01;
    /// Command that expects a bare ack.
    pub const RUN: u8 = 0x02;
    /// Reset / stop-all, acked like a run command.
    pub const RESET: u8 = 0x04;

    /// Human-readable name for logs.
    pub fn name(action: u8) -> &'static str {
        match action {
            GET => "get",
            RUN => "run",
            RESET => "reset",
            _ => "unknown",
        }
    }
}

/// Rewrite the length byte so that it equals `frame.len() - 3`.
///
/// Returns an error if the frame is shorter than the fixed prefix or
/// too long for a one-byte length.
pub fn fix_length(frame: &mut [u8]) -> Result<()> {
    if frame.len() < LEN_OFFSET + 1 {
        return Err(CoconutError::Protocol(format!(
            "Frame of {} bytes has no length byte",
            frame.len()
        )));
    }
    let len = frame.len() - 3;
    frame[LEN_OFFSET] = u8::try_from(len).map_err(|_| {
        CoconutError::Protocol(format!("Frame body of {} bytes exceeds 255", len))
    })?;
    Ok(())
}

/// Pack a signed 16-bit value, low byte first.
///
/// # Example
///
/// ```
/// use coconut_link::protocol::encode_i16;
///
/// assert_eq!(encode_i16(1500), [0xDC, 0x05]);
/// assert_eq!(encode_i16(-1), [0xFF, 0xFF]);
/// ```
#[inline]
pub fn encode_i16(value: i16) -> [u8; 2] {
    value.to_le_bytes()
}

/// Unpack a signed 16-bit value, low byte first.
///
/// Returns `None` if fewer than two bytes are available.
#[inline]
pub fn decode_i16(buf: &[u8]) -> Option<i16> {
    match buf {
        [lo, hi, ..] => Some(i16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

/// Convert a duration to whole milliseconds clamped to the 16-bit range.
pub fn millis_i16(duration: std::time::Duration) -> i16 {
    i16::try_from(duration.as_millis()).unwrap_or(i16::MAX)
}
