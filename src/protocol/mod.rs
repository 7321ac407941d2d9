//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the serial framing shared by both directions:
//! - Outgoing frame building with length rewrite
//! - Frame buffer for resynchronizing on `FF 55` and splitting on `0D 0A`
//! - Incoming frame classification (ack vs. data)

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, build_reset_frame, FrameShape, InboundFrame, Param};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    action, decode_i16, encode_i16, fix_length, millis_i16, ACK_FRAME_LEN, ACTION_OFFSET,
    DEFAULT_EXT_ID, DEFAULT_MAX_BUFFER, DEVICE_OFFSET, END_MARKER, EXT_OFFSET, LEN_OFFSET,
    MIN_DATA_FRAME_LEN, PARAMS_OFFSET, PAYLOAD_OFFSET, RESET_FRAME, START_MARKER,
    SUB_COMMAND_OFFSET, TYPE_TAG_OFFSET,
};
