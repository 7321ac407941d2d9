//! Request context carried by each pending request.
//!
//! The context is the exact frame that was written for the request. Replies
//! echo nothing about the request, so the reply decoder reads the sub-command
//! and parameters back out of this frame.
//!
//! # Example
//!
//! ```
//! use coconut_link::handler::RequestContext;
//! use coconut_link::protocol::{action, build_frame, FrameShape};
//!
//! let frame = build_frame(action::GET, 5, 0, &[1u8.into()]).unwrap();
//! let ctx = RequestContext::new(frame);
//!
//! assert_eq!(ctx.action(), Some(action::GET));
//! assert_eq!(ctx.device_id(), Some(5));
//! assert_eq!(ctx.param(0), Some(1));
//! assert_eq!(ctx.expected_shape(), FrameShape::Data);
//! ```

use bytes::Bytes;

use crate::command::DeviceClass;
use crate::protocol::{
    action, FrameShape, ACTION_OFFSET, DEVICE_OFFSET, PARAMS_OFFSET, SUB_COMMAND_OFFSET,
};

/// The outgoing frame retained for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    frame: Bytes,
}

impl RequestContext {
    /// Wrap an outgoing frame.
    pub fn new(frame: Bytes) -> Self {
        Self { frame }
    }

    /// The frame as written to the transport.
    #[inline]
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }

    /// Action byte (`GET` / `RUN` / `RESET`).
    #[inline]
    pub fn action(&self) -> Option<u8> {
        self.frame.get(ACTION_OFFSET).copied()
    }

    /// Check if this is a reset / stop-all request.
    #[inline]
    pub fn is_reset(&self) -> bool {
        self.action() == Some(action::RESET)
    }

    /// Raw device-class byte. Reset frames have none.
    #[inline]
    pub fn device_id(&self) -> Option<u8> {
        if self.is_reset() {
            return None;
        }
        self.frame.get(DEVICE_OFFSET).copied()
    }

    /// Device class, if the byte is a known one.
    pub fn device(&self) -> Option<DeviceClass> {
        self.device_id().and_then(DeviceClass::from_id)
    }

    /// Sub-command byte.
    #[inline]
    pub fn sub_command(&self) -> Option<u8> {
        self.frame.get(SUB_COMMAND_OFFSET).copied()
    }

    /// Parameter byte at `index` (0 = first byte after the sub-command).
    #[inline]
    pub fn param(&self, index: usize) -> Option<u8> {
        self.frame.get(PARAMS_OFFSET + index).copied()
    }

    /// All parameter bytes.
    pub fn params(&self) -> &[u8] {
        self.frame.get(PARAMS_OFFSET..).unwrap_or(&[])
    }

    /// Shape of the reply the robot sends for this request.
    pub fn expected_shape(&self) -> FrameShape {
        match self.action() {
            Some(action::GET) => FrameShape::Data,
            _ => FrameShape::Ack,
        }
    }
}
