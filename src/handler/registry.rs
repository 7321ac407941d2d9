//! Response dispatch table.
//!
//! Maps each device class to its decode function. Reset is checked first
//! because its reply carries no device class of its own.
//!
//! # Example
//!
//! ```
//! use coconut_link::command::{CommandEncoder, Direction};
//! use coconut_link::handler::{DispatchTable, Response};
//! use coconut_link::protocol::InboundFrame;
//!
//! let table = DispatchTable::standard();
//! let request = CommandEncoder::new().move_motor(Direction::Forward).unwrap();
//!
//! let dispatch = table.dispatch(request.context(), &InboundFrame::Ack).unwrap();
//! assert_eq!(&dispatch.key, request.key());
//! assert_eq!(dispatch.response, Response::Done);
//! ```

use std::collections::HashMap;

use tracing::debug;

use super::decode::{
    decode_buzzer, decode_external, decode_line, decode_matrix, decode_motor, decode_reset,
    decode_rgb, decode_sensor, DecodeFn, Dispatch,
};
use super::RequestContext;
use crate::command::DeviceClass;
use crate::protocol::InboundFrame;

/// Registry mapping device classes to decode functions.
#[derive(Clone)]
pub struct DispatchTable {
    decoders: HashMap<DeviceClass, DecodeFn>,
}

impl DispatchTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Table with a decoder for every known device class.
    pub fn standard() -> Self {
        let mut table = Self::new();
        for device in DeviceClass::ALL {
            let decoder: DecodeFn = match device {
                DeviceClass::Motor => decode_motor,
                DeviceClass::RgbLed => decode_rgb,
                DeviceClass::Buzzer => decode_buzzer,
                DeviceClass::LedMatrix => decode_matrix,
                DeviceClass::ExtMotor
                | DeviceClass::ExtServo
                | DeviceClass::ExtLed
                | DeviceClass::ExtSpeaker => decode_external,
                DeviceClass::LineTracer => decode_line,
                DeviceClass::IrDistance
                | DeviceClass::LightSensor
                | DeviceClass::Temperature
                | DeviceClass::Accelerometer
                | DeviceClass::RemoteControl
                | DeviceClass::ExtTouch
                | DeviceClass::ExtMic
                | DeviceClass::DigitalPin
                | DeviceClass::AnalogPin
                | DeviceClass::Heartbeat => decode_sensor,
            };
            table.register(device, decoder);
        }
        table
    }

    /// Register (or replace) the decoder for a device class.
    pub fn register(&mut self, device: DeviceClass, decoder: DecodeFn) {
        self.decoders.insert(device, decoder);
    }

    /// Check if a device class has a decoder.
    pub fn has_decoder(&self, device: DeviceClass) -> bool {
        self.decoders.contains_key(&device)
    }

    /// Number of registered decoders.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode `frame` as the reply to the request in `ctx`.
    ///
    /// Returns `None` when the request's device class has no decoder.
    pub fn dispatch(&self, ctx: &RequestContext, frame: &InboundFrame) -> Option<Dispatch> {
        if ctx.is_reset() {
            return Some(decode_reset(ctx, frame));
        }

        let device = ctx.device()?;
        match self.decoders.get(&device) {
            Some(decode) => Some(decode(device, ctx, frame)),
            None => {
                debug!(device = %device, "No decoder registered");
                None
            }
        }
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut devices: Vec<_> = self.decoders.keys().collect();
        devices.sort();
        f.debug_struct("DispatchTable")
            .field("devices", &devices)
            .finish()
    }
}
