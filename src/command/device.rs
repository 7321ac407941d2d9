//! Device-class IDs and sub-command codes.

use std::fmt;

/// Onboard or external subsystem addressed by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DeviceClass {
    /// Temperature sensor.
    Temperature = 2,
    /// Light sensors.
    LightSensor = 3,
    /// IR distance sensors.
    IrDistance = 5,
    /// External servo.
    ExtServo = 8,
    /// External DC motor.
    ExtMotor = 9,
    /// IR remote-control receiver.
    RemoteControl = 14,
    /// Line tracer.
    LineTracer = 17,
    /// Accelerometer.
    Accelerometer = 18,
    /// External LED.
    ExtLed = 20,
    /// External speaker.
    ExtSpeaker = 21,
    /// External touch sensor.
    ExtTouch = 22,
    /// External microphone.
    ExtMic = 23,
    /// RGB LEDs.
    RgbLed = 25,
    /// Drive motors.
    Motor = 26,
    /// Digital pin read.
    DigitalPin = 30,
    /// Analog pin read.
    AnalogPin = 31,
    /// Buzzer.
    Buzzer = 34,
    /// 8x8 LED matrix.
    LedMatrix = 41,
    /// Liveness probe.
    Heartbeat = 80,
}

impl DeviceClass {
    /// Every device class, in ID order.
    pub const ALL: [DeviceClass; 19] = [
        DeviceClass::Temperature,
        DeviceClass::LightSensor,
        DeviceClass::IrDistance,
        DeviceClass::ExtServo,
        DeviceClass::ExtMotor,
        DeviceClass::RemoteControl,
        DeviceClass::LineTracer,
        DeviceClass::Accelerometer,
        DeviceClass::ExtLed,
        DeviceClass::ExtSpeaker,
        DeviceClass::ExtTouch,
        DeviceClass::ExtMic,
        DeviceClass::RgbLed,
        DeviceClass::Motor,
        DeviceClass::DigitalPin,
        DeviceClass::AnalogPin,
        DeviceClass::Buzzer,
        DeviceClass::LedMatrix,
        DeviceClass::Heartbeat,
    ];

    /// Wire ID.
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Look up a device class by wire ID.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.id() == id)
    }

    /// Short name used in logs and correlation keys.
    pub fn name(self) -> &'static str {
        match self {
            DeviceClass::Temperature => "temperature",
            DeviceClass::LightSensor => "light",
            DeviceClass::IrDistance => "distance",
            DeviceClass::ExtServo => "ext-servo",
            DeviceClass::ExtMotor => "ext-motor",
            DeviceClass::RemoteControl => "remote",
            DeviceClass::LineTracer => "line",
            DeviceClass::Accelerometer => "accel",
            DeviceClass::ExtLed => "ext-led",
            DeviceClass::ExtSpeaker => "ext-speaker",
            DeviceClass::ExtTouch => "ext-touch",
            DeviceClass::ExtMic => "ext-mic",
            DeviceClass::RgbLed => "rgb",
            DeviceClass::Motor => "motor",
            DeviceClass::DigitalPin => "digital-pin",
            DeviceClass::AnalogPin => "analog-pin",
            DeviceClass::Buzzer => "buzzer",
            DeviceClass::LedMatrix => "matrix",
            DeviceClass::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Motor sub-commands.
pub mod motor {
    /// Move in a direction at a speed.
    pub const MOVE: u8 = 0;
    /// Stop one or both wheels.
    pub const STOP: u8 = 1;
    /// Move for a time, then stop.
    pub const MOVE_TIMED: u8 = 2;
    /// Move while lighting the RGB LEDs.
    pub const MOVE_COLOR: u8 = 3;
    /// Move a distance in centimetres.
    pub const MOVE_CM: u8 = 4;
    /// Turn by a number of degrees.
    pub const TURN_DEGREE: u8 = 5;
}

/// RGB LED sub-commands.
pub mod rgb {
    /// Light with a palette color.
    pub const ON: u8 = 0;
    /// Switch off.
    pub const OFF: u8 = 1;
    /// Light for a time, then switch off.
    pub const ON_TIMED: u8 = 2;
    /// Light with explicit red/green/blue levels.
    pub const CUSTOM: u8 = 3;
}

/// Buzzer sub-commands.
pub mod buzzer {
    /// Play a note for a beat.
    pub const NOTE: u8 = 0;
    /// Play a frequency for a beat.
    pub const BEEP: u8 = 1;
    /// Stay silent for a beat.
    pub const REST: u8 = 2;
    /// Play a stored melody.
    pub const MELODY: u8 = 3;
}

/// Line tracer sub-commands.
pub mod line {
    /// Raw reading for a side.
    pub const READ: u8 = 0;
    /// Whether a side sees the given line color.
    pub const DETECT: u8 = 1;
}

/// LED matrix sub-commands.
pub mod matrix {
    /// Show a number.
    pub const NUMBER: u8 = 0;
    /// Show a character.
    pub const CHAR: u8 = 1;
    /// Show eight row bitmaps.
    pub const PATTERN: u8 = 2;
    /// Clear the display.
    pub const CLEAR: u8 = 3;
}

/// Sub-command shared by every single-operation device class.
pub const DEFAULT_SUB_COMMAND: u8 = 0;

/// Label used as the prefix of a correlation key.
///
/// Returns `None` for a sub-command the device class does not have.
pub fn label(device: DeviceClass, sub_command: u8) -> Option<&'static str> {
    let label = match (device, sub_command) {
        (DeviceClass::Motor, motor::MOVE) => "move-motor",
        (DeviceClass::Motor, motor::STOP) => "stop-motor",
        (DeviceClass::Motor, motor::MOVE_TIMED) => "move-motor-timed",
        (DeviceClass::Motor, motor::MOVE_COLOR) => "move-motor-color",
        (DeviceClass::Motor, motor::MOVE_CM) => "move-motor-cm",
        (DeviceClass::Motor, motor::TURN_DEGREE) => "turn-motor-degree",
        (DeviceClass::RgbLed, rgb::ON) => "rgb-on",
        (DeviceClass::RgbLed, rgb::OFF) => "rgb-off",
        (DeviceClass::RgbLed, rgb::ON_TIMED) => "rgb-on-timed",
        (DeviceClass::RgbLed, rgb::CUSTOM) => "rgb-custom",
        (DeviceClass::Buzzer, buzzer::NOTE) => "play-note",
        (DeviceClass::Buzzer, buzzer::BEEP) => "play-beep",
        (DeviceClass::Buzzer, buzzer::REST) => "play-rest",
        (DeviceClass::Buzzer, buzzer::MELODY) => "play-melody",
        (DeviceClass::LineTracer, line::READ) => "line-read",
        (DeviceClass::LineTracer, line::DETECT) => "line-detect",
        (DeviceClass::LedMatrix, matrix::NUMBER) => "matrix-number",
        (DeviceClass::LedMatrix, matrix::CHAR) => "matrix-char",
        (DeviceClass::LedMatrix, matrix::PATTERN) => "matrix-pattern",
        (DeviceClass::LedMatrix, matrix::CLEAR) => "matrix-clear",
        (DeviceClass::IrDistance, DEFAULT_SUB_COMMAND) => "distance-read",
        (DeviceClass::LightSensor, DEFAULT_SUB_COMMAND) => "light-read",
        (DeviceClass::Temperature, DEFAULT_SUB_COMMAND) => "temperature-read",
        (DeviceClass::Accelerometer, DEFAULT_SUB_COMMAND) => "accel-read",
        (DeviceClass::RemoteControl, DEFAULT_SUB_COMMAND) => "remote-read",
        (DeviceClass::ExtMotor, DEFAULT_SUB_COMMAND) => "ext-motor-move",
        (DeviceClass::ExtServo, DEFAULT_SUB_COMMAND) => "ext-servo-angle",
        (DeviceClass::ExtLed, DEFAULT_SUB_COMMAND) => "ext-led-set",
        (DeviceClass::ExtSpeaker, DEFAULT_SUB_COMMAND) => "ext-speaker-tone",
        (DeviceClass::ExtTouch, DEFAULT_SUB_COMMAND) => "ext-touch-read",
        (DeviceClass::ExtMic, DEFAULT_SUB_COMMAND) => "ext-mic-read",
        (DeviceClass::DigitalPin, DEFAULT_SUB_COMMAND) => "digital-read",
        (DeviceClass::AnalogPin, DEFAULT_SUB_COMMAND) => "analog-read",
        (DeviceClass::Heartbeat, DEFAULT_SUB_COMMAND) => "heartbeat",
        _ => return None,
    };
    Some(label)
}
