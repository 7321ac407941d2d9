//! Command module - device classes, symbolic parameters and request building.
//!
//! - [`DeviceClass`] and the per-class sub-command codes
//! - Symbolic parameter domains ([`Direction`], [`Side`], [`Color`], ...)
//! - [`CorrelationKey`] - identity of an outstanding request
//! - [`CommandEncoder`] - one builder per operation, producing a [`Request`]

mod device;
mod encoder;
mod key;
mod symbol;

pub use device::{buzzer, label, line, matrix, motor, rgb, DeviceClass, DEFAULT_SUB_COMMAND};
pub use encoder::{
    CommandEncoder, Request, DEFAULT_SPEED, MAX_MATRIX_NUMBER, MAX_OCTAVE, MAX_SERVO_ANGLE,
};
pub use key::CorrelationKey;
pub use symbol::{Axis, Beat, Color, Detect, Direction, Note, RemoteCommand, Side};
