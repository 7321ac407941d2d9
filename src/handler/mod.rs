//! Handler module - reply decoding and dispatch.
//!
//! Provides:
//! - [`DispatchTable`] - maps device classes to decode functions
//! - [`RequestContext`] - the outgoing frame a reply is decoded against
//! - [`Response`] / [`Dispatch`] - what a decoded reply resolves

mod context;
mod decode;
mod registry;

pub use context::RequestContext;
pub use decode::{
    decode_buzzer, decode_external, decode_line, decode_matrix, decode_motor, decode_reset,
    decode_rgb, decode_sensor, DecodeFn, Dispatch, Response,
};
pub use registry::DispatchTable;
