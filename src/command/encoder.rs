//! Command encoder.
//!
//! One builder per operation. Each builder resolves its parameters to
//! protocol codes, builds the frame and returns a [`Request`] holding the
//! frame (as a [`RequestContext`]) and the [`CorrelationKey`] its reply will
//! resolve. Sending is left to the caller.
//!
//! # Example
//!
//! ```
//! use coconut_link::command::{CommandEncoder, Direction};
//!
//! let encoder = CommandEncoder::new();
//! let request = encoder.move_motor(Direction::Forward).unwrap();
//!
//! assert_eq!(
//!     &request.frame()[..],
//!     &[0xFF, 0x55, 0x06, 0x00, 0x02, 0x1A, 0x00, 0x03, 0x3C]
//! );
//! assert_eq!(request.key().to_string(), "move-motor-3");
//! ```

use std::time::Duration;

use bytes::Bytes;

use super::device::{buzzer, line, matrix, motor, rgb, DeviceClass, DEFAULT_SUB_COMMAND};
use super::key::CorrelationKey;
use super::symbol::{Axis, Beat, Color, Detect, Direction, Note, Side};
use crate::error::{CoconutError, Result};
use crate::handler::RequestContext;
use crate::protocol::{action, build_frame, build_reset_frame, millis_i16, FrameShape, Param};

/// Default drive speed.
pub const DEFAULT_SPEED: u8 = 60;

/// Highest octave the buzzer plays.
pub const MAX_OCTAVE: u8 = 8;

/// Largest servo angle.
pub const MAX_SERVO_ANGLE: u8 = 180;

/// Largest number the LED matrix shows.
pub const MAX_MATRIX_NUMBER: u8 = 99;

/// A built request: the frame to write and the key its reply resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    key: CorrelationKey,
    context: RequestContext,
}

impl Request {
    /// Create a request from its key and frame.
    pub fn new(key: CorrelationKey, frame: Bytes) -> Self {
        Self {
            key,
            context: RequestContext::new(frame),
        }
    }

    /// Correlation key.
    #[inline]
    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    /// Retained request context.
    #[inline]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Frame bytes.
    #[inline]
    pub fn frame(&self) -> &Bytes {
        self.context.frame()
    }

    /// Shape of the expected reply.
    #[inline]
    pub fn expected_shape(&self) -> FrameShape {
        self.context.expected_shape()
    }

    /// Split into key and context.
    pub fn into_parts(self) -> (CorrelationKey, RequestContext) {
        (self.key, self.context)
    }
}

/// Builds request frames for every supported operation.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    default_speed: u8,
}

impl CommandEncoder {
    /// Create an encoder with the default drive speed.
    pub fn new() -> Self {
        Self::with_default_speed(DEFAULT_SPEED)
    }

    /// Create an encoder with a custom default drive speed.
    pub fn with_default_speed(default_speed: u8) -> Self {
        Self { default_speed }
    }

    /// Speed used by [`Self::move_motor`].
    pub fn default_speed(&self) -> u8 {
        self.default_speed
    }

    fn run(device: DeviceClass, sub: u8, params: &[Param], echo: Vec<u8>) -> Result<Request> {
        let frame = build_frame(action::RUN, device.id(), sub, params)?;
        Ok(Request::new(CorrelationKey::new(device, sub, echo), frame))
    }

    fn get(device: DeviceClass, sub: u8, params: &[Param], echo: Vec<u8>) -> Result<Request> {
        let frame = build_frame(action::GET, device.id(), sub, params)?;
        Ok(Request::new(CorrelationKey::new(device, sub, echo), frame))
    }

    // ------------------------------------------------------------------
    // Drive motors
    // ------------------------------------------------------------------

    /// Move at the default speed.
    pub fn move_motor(&self, direction: Direction) -> Result<Request> {
        self.move_motor_speed(direction, self.default_speed)
    }

    /// Move at `speed`.
    pub fn move_motor_speed(&self, direction: Direction, speed: u8) -> Result<Request> {
        let dir = direction.code();
        Self::run(
            DeviceClass::Motor,
            motor::MOVE,
            &[dir.into(), speed.into()],
            vec![dir],
        )
    }

    /// Stop one or both wheels.
    pub fn stop_motor(&self, side: Side) -> Result<Request> {
        let side = side.code();
        Self::run(DeviceClass::Motor, motor::STOP, &[side.into()], vec![side])
    }

    /// Move for `duration`, then stop. Durations above 32.767 s are clamped.
    pub fn move_motor_timed(
        &self,
        direction: Direction,
        speed: u8,
        duration: Duration,
    ) -> Result<Request> {
        let dir = direction.code();
        Self::run(
            DeviceClass::Motor,
            motor::MOVE_TIMED,
            &[dir.into(), speed.into(), Param::Word(millis_i16(duration))],
            vec![dir],
        )
    }

    /// Move while lighting the LEDs.
    pub fn move_motor_color(&self, direction: Direction, speed: u8, color: Color) -> Result<Request> {
        let (dir, color) = (direction.code(), color.code());
        Self::run(
            DeviceClass::Motor,
            motor::MOVE_COLOR,
            &[dir.into(), speed.into(), color.into()],
            vec![dir, color],
        )
    }

    /// Move `cm` centimetres.
    pub fn move_motor_cm(&self, direction: Direction, cm: u8) -> Result<Request> {
        let dir = direction.code();
        Self::run(
            DeviceClass::Motor,
            motor::MOVE_CM,
            &[dir.into(), cm.into()],
            vec![dir],
        )
    }

    /// Turn by `degrees`.
    pub fn turn_motor_degree(&self, direction: Direction, degrees: i16) -> Result<Request> {
        let dir = direction.code();
        Self::run(
            DeviceClass::Motor,
            motor::TURN_DEGREE,
            &[dir.into(), Param::Word(degrees)],
            vec![dir],
        )
    }

    // ------------------------------------------------------------------
    // RGB LEDs
    // ------------------------------------------------------------------

    /// Light with a palette color.
    pub fn rgb_on(&self, side: Side, color: Color) -> Result<Request> {
        let (side, color) = (side.code(), color.code());
        Self::run(
            DeviceClass::RgbLed,
            rgb::ON,
            &[side.into(), color.into()],
            vec![side, color],
        )
    }

    /// Switch off.
    pub fn rgb_off(&self, side: Side) -> Result<Request> {
        let side = side.code();
        Self::run(DeviceClass::RgbLed, rgb::OFF, &[side.into()], vec![side])
    }

    /// Light for `duration`, then switch off.
    pub fn rgb_on_timed(&self, side: Side, color: Color, duration: Duration) -> Result<Request> {
        let (side, color) = (side.code(), color.code());
        Self::run(
            DeviceClass::RgbLed,
            rgb::ON_TIMED,
            &[side.into(), color.into(), Param::Word(millis_i16(duration))],
            vec![side, color],
        )
    }

    /// Light with explicit levels.
    pub fn rgb_custom(&self, side: Side, red: u8, green: u8, blue: u8) -> Result<Request> {
        let side = side.code();
        Self::run(
            DeviceClass::RgbLed,
            rgb::CUSTOM,
            &[side.into(), red.into(), green.into(), blue.into()],
            vec![side],
        )
    }

    // ------------------------------------------------------------------
    // Buzzer
    // ------------------------------------------------------------------

    /// Play a note.
    pub fn play_note(&self, note: Note, octave: u8, sharp: bool, beat: Beat) -> Result<Request> {
        if octave == 0 || octave > MAX_OCTAVE {
            return Err(CoconutError::InvalidParameter {
                name: "octave",
                value: i64::from(octave),
            });
        }
        let note = note.code();
        Self::run(
            DeviceClass::Buzzer,
            buzzer::NOTE,
            &[
                note.into(),
                octave.into(),
                sharp.into(),
                Param::Word(beat.millis()),
            ],
            vec![note, octave],
        )
    }

    /// Play a frequency in Hz.
    pub fn play_beep(&self, frequency: u16, beat: Beat) -> Result<Request> {
        let frequency = i16::try_from(frequency).map_err(|_| CoconutError::InvalidParameter {
            name: "frequency",
            value: i64::from(frequency),
        })?;
        Self::run(
            DeviceClass::Buzzer,
            buzzer::BEEP,
            &[Param::Word(frequency), Param::Word(beat.millis())],
            vec![],
        )
    }

    /// Rest for a beat.
    pub fn play_rest(&self, beat: Beat) -> Result<Request> {
        Self::run(
            DeviceClass::Buzzer,
            buzzer::REST,
            &[Param::Word(beat.millis())],
            vec![],
        )
    }

    /// Play a stored melody.
    pub fn play_melody(&self, melody: u8) -> Result<Request> {
        Self::run(
            DeviceClass::Buzzer,
            buzzer::MELODY,
            &[melody.into()],
            vec![melody],
        )
    }

    // ------------------------------------------------------------------
    // LED matrix
    // ------------------------------------------------------------------

    /// Show a number from 0 to 99.
    pub fn matrix_number(&self, number: u8) -> Result<Request> {
        if number > MAX_MATRIX_NUMBER {
            return Err(CoconutError::InvalidParameter {
                name: "matrix number",
                value: i64::from(number),
            });
        }
        Self::run(
            DeviceClass::LedMatrix,
            matrix::NUMBER,
            &[number.into()],
            vec![],
        )
    }

    /// Show a printable ASCII character.
    pub fn matrix_char(&self, ch: char) -> Result<Request> {
        if !ch.is_ascii_graphic() && ch != ' ' {
            return Err(CoconutError::InvalidParameter {
                name: "matrix character",
                value: i64::from(u32::from(ch)),
            });
        }
        Self::run(
            DeviceClass::LedMatrix,
            matrix::CHAR,
            &[(ch as u8).into()],
            vec![],
        )
    }

    /// Show eight row bitmaps, top row first.
    pub fn matrix_pattern(&self, rows: [u8; 8]) -> Result<Request> {
        Self::run(
            DeviceClass::LedMatrix,
            matrix::PATTERN,
            &[Param::Array(rows.to_vec())],
            vec![],
        )
    }

    /// Clear the matrix.
    pub fn matrix_clear(&self) -> Result<Request> {
        Self::run(DeviceClass::LedMatrix, matrix::CLEAR, &[], vec![])
    }

    // ------------------------------------------------------------------
    // External peripherals
    // ------------------------------------------------------------------

    /// Drive an external motor.
    pub fn ext_motor_move(&self, port: u8, direction: Direction, speed: u8) -> Result<Request> {
        let dir = direction.code();
        Self::run(
            DeviceClass::ExtMotor,
            DEFAULT_SUB_COMMAND,
            &[port.into(), dir.into(), speed.into()],
            vec![port, dir],
        )
    }

    /// Set an external servo angle (0-180).
    pub fn ext_servo_angle(&self, port: u8, angle: u8) -> Result<Request> {
        if angle > MAX_SERVO_ANGLE {
            return Err(CoconutError::InvalidParameter {
                name: "servo angle",
                value: i64::from(angle),
            });
        }
        Self::run(
            DeviceClass::ExtServo,
            DEFAULT_SUB_COMMAND,
            &[port.into(), angle.into()],
            vec![port],
        )
    }

    /// Switch an external LED.
    pub fn ext_led_set(&self, port: u8, on: bool) -> Result<Request> {
        Self::run(
            DeviceClass::ExtLed,
            DEFAULT_SUB_COMMAND,
            &[port.into(), on.into()],
            vec![port],
        )
    }

    /// Play a frequency on an external speaker.
    pub fn ext_speaker_tone(&self, port: u8, frequency: u16, beat: Beat) -> Result<Request> {
        let frequency = i16::try_from(frequency).map_err(|_| CoconutError::InvalidParameter {
            name: "frequency",
            value: i64::from(frequency),
        })?;
        Self::run(
            DeviceClass::ExtSpeaker,
            DEFAULT_SUB_COMMAND,
            &[port.into(), Param::Word(frequency), Param::Word(beat.millis())],
            vec![port],
        )
    }

    /// Read an external touch sensor.
    pub fn ext_touch(&self, port: u8) -> Result<Request> {
        Self::get(
            DeviceClass::ExtTouch,
            DEFAULT_SUB_COMMAND,
            &[port.into()],
            vec![port],
        )
    }

    /// Read an external microphone.
    pub fn ext_mic(&self, port: u8) -> Result<Request> {
        Self::get(
            DeviceClass::ExtMic,
            DEFAULT_SUB_COMMAND,
            &[port.into()],
            vec![port],
        )
    }

    // ------------------------------------------------------------------
    // Onboard sensors
    // ------------------------------------------------------------------

    /// Read an IR distance sensor.
    pub fn get_distance(&self, side: Side) -> Result<Request> {
        let side = side.code();
        Self::get(
            DeviceClass::IrDistance,
            DEFAULT_SUB_COMMAND,
            &[side.into()],
            vec![side],
        )
    }

    /// Read a light sensor.
    pub fn get_light(&self, side: Side) -> Result<Request> {
        let side = side.code();
        Self::get(
            DeviceClass::LightSensor,
            DEFAULT_SUB_COMMAND,
            &[side.into()],
            vec![side],
        )
    }

    /// Read the temperature.
    pub fn get_temperature(&self) -> Result<Request> {
        Self::get(DeviceClass::Temperature, DEFAULT_SUB_COMMAND, &[], vec![])
    }

    /// Read one accelerometer axis.
    pub fn get_acceleration(&self, axis: Axis) -> Result<Request> {
        let axis = axis.code();
        Self::get(
            DeviceClass::Accelerometer,
            DEFAULT_SUB_COMMAND,
            &[axis.into()],
            vec![axis],
        )
    }

    /// Raw line tracer reading.
    pub fn get_line(&self, side: Side) -> Result<Request> {
        let side = side.code();
        Self::get(DeviceClass::LineTracer, line::READ, &[side.into()], vec![side])
    }

    /// Whether a side sees a line of the given color.
    pub fn detect_line(&self, side: Side, detect: Detect) -> Result<Request> {
        let (side, detect) = (side.code(), detect.code());
        Self::get(
            DeviceClass::LineTracer,
            line::DETECT,
            &[side.into(), detect.into()],
            vec![side, detect],
        )
    }

    /// Last remote-control command received.
    pub fn get_remote(&self) -> Result<Request> {
        Self::get(DeviceClass::RemoteControl, DEFAULT_SUB_COMMAND, &[], vec![])
    }

    /// Read a digital pin.
    pub fn digital_read(&self, pin: u8) -> Result<Request> {
        Self::get(
            DeviceClass::DigitalPin,
            DEFAULT_SUB_COMMAND,
            &[pin.into()],
            vec![pin],
        )
    }

    /// Read an analog pin.
    pub fn analog_read(&self, pin: u8) -> Result<Request> {
        Self::get(
            DeviceClass::AnalogPin,
            DEFAULT_SUB_COMMAND,
            &[pin.into()],
            vec![pin],
        )
    }

    // ------------------------------------------------------------------
    // Link
    // ------------------------------------------------------------------

    /// Liveness probe.
    pub fn heartbeat(&self) -> Result<Request> {
        Self::get(DeviceClass::Heartbeat, DEFAULT_SUB_COMMAND, &[], vec![])
    }

    /// Reset / stop everything.
    pub fn stop_all(&self) -> Request {
        Request::new(CorrelationKey::Reset, build_reset_frame())
    }
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new()
    }
}
