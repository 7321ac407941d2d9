//! Per-device-class decode functions.
//!
//! Each function receives the context of the request being answered and the
//! incoming frame. Sub-command and parameters come from the context; only
//! query replies carry anything worth reading. The function rebuilds the
//! request's [`CorrelationKey`] and produces its [`Response`].

use tracing::warn;

use super::RequestContext;
use crate::codec::{SensorValue, ValueCodec};
use crate::command::{
    buzzer, line, matrix, motor, rgb, CorrelationKey, DeviceClass, DEFAULT_SUB_COMMAND,
};
use crate::protocol::{action, InboundFrame};

/// Outcome delivered to the waiter of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Bare acknowledgement of a run or reset command.
    Done,
    /// Decoded query reply.
    Value(SensorValue),
    /// Query reply whose payload could not be decoded.
    Empty,
    /// Consistency check failed while decoding.
    Error(String),
}

impl Response {
    /// Check if this is an error payload.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// The decoded value, if any.
    pub fn value(&self) -> Option<&SensorValue> {
        match self {
            Response::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A decoded reply addressed to one pending request.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Key of the request being resolved.
    pub key: CorrelationKey,
    /// What the waiter receives.
    pub response: Response,
}

/// Decode function signature stored in the dispatch table.
pub type DecodeFn = fn(DeviceClass, &RequestContext, &InboundFrame) -> Dispatch;

/// Positions of the parameter bytes that identify a request.
type Echo = &'static [usize];

const NO_ECHO: Echo = &[];
const FIRST: Echo = &[0];
const FIRST_TWO: Echo = &[0, 1];
/// Direction and color; speed sits between them.
const DIRECTION_COLOR: Echo = &[0, 2];

/// Reset / stop-all acknowledgement.
pub fn decode_reset(ctx: &RequestContext, frame: &InboundFrame) -> Dispatch {
    let response = if ctx.action() != Some(action::RESET) {
        mismatch(action::RESET, ctx.action())
    } else if !frame.is_ack() {
        Response::Error("reset answered with a data frame".to_string())
    } else {
        Response::Done
    };
    Dispatch {
        key: CorrelationKey::Reset,
        response,
    }
}

/// Drive motors.
pub fn decode_motor(device: DeviceClass, ctx: &RequestContext, frame: &InboundFrame) -> Dispatch {
    let echo = match ctx.sub_command() {
        Some(motor::MOVE | motor::STOP | motor::MOVE_TIMED | motor::MOVE_CM | motor::TURN_DEGREE) => FIRST,
        Some(motor::MOVE_COLOR) => DIRECTION_COLOR,
        _ => return unknown_sub_command(device, ctx),
    };
    run_ack(device, ctx, frame, echo)
}

/// RGB LEDs.
pub fn decode_rgb(device: DeviceClass, ctx: &RequestContext, frame: &InboundFrame) -> Dispatch {
    let echo = match ctx.sub_command() {
        Some(rgb::OFF | rgb::CUSTOM) => FIRST,
        Some(rgb::ON | rgb::ON_TIMED) => FIRST_TWO,
        _ => return unknown_sub_command(device, ctx),
    };
    run_ack(device, ctx, frame, echo)
}

/// Buzzer.
pub fn decode_buzzer(device: DeviceClass, ctx: &RequestContext, frame: &InboundFrame) -> Dispatch {
    let echo = match ctx.sub_command() {
        Some(buzzer::BEEP | buzzer::REST) => NO_ECHO,
        Some(buzzer::MELODY) => FIRST,
        Some(buzzer::NOTE) => FIRST_TWO,
        _ => return unknown_sub_command(device, ctx),
    };
    run_ack(device, ctx, frame, echo)
}

/// LED matrix. No operation echoes parameters.
pub fn decode_matrix(device: DeviceClass, ctx: &RequestContext, frame: &InboundFrame) -> Dispatch {
    match ctx.sub_command() {
        Some(matrix::NUMBER | matrix::CHAR | matrix::PATTERN | matrix::CLEAR) => {
            run_ack(device, ctx, frame, NO_ECHO)
        }
        _ => unknown_sub_command(device, ctx),
    }
}

/// External actuators addressed by port.
pub fn decode_external(device: DeviceClass, ctx: &RequestContext, frame: &InboundFrame) -> Dispatch {
    if ctx.sub_command() != Some(DEFAULT_SUB_COMMAND) {
        return unknown_sub_command(device, ctx);
    }
    let echo = match device {
        DeviceClass::ExtMotor => FIRST_TWO,
        _ => FIRST,
    };
    run_ack(device, ctx, frame, echo)
}

/// Line tracer.
pub fn decode_line(device: DeviceClass, ctx: &RequestContext, frame: &InboundFrame) -> Dispatch {
    let echo = match ctx.sub_command() {
        Some(line::READ) => FIRST,
        Some(line::DETECT) => FIRST_TWO,
        _ => return unknown_sub_command(device, ctx),
    };
    query_value(device, ctx, frame, echo)
}

/// Single-reading sensors keyed by side, axis, port or pin.
pub fn decode_sensor(device: DeviceClass, ctx: &RequestContext, frame: &InboundFrame) -> Dispatch {
    if ctx.sub_command() != Some(DEFAULT_SUB_COMMAND) {
        return unknown_sub_command(device, ctx);
    }
    let echo = match device {
        DeviceClass::Temperature | DeviceClass::RemoteControl | DeviceClass::Heartbeat => NO_ECHO,
        _ => FIRST,
    };
    query_value(device, ctx, frame, echo)
}

fn run_ack(device: DeviceClass, ctx: &RequestContext, frame: &InboundFrame, echo: Echo) -> Dispatch {
    let key = rebuild_key(device, ctx, echo);
    let response = if ctx.action() != Some(action::RUN) {
        mismatch(action::RUN, ctx.action())
    } else if !frame.is_ack() {
        Response::Error(format!("{} answered with a data frame", key))
    } else {
        Response::Done
    };
    Dispatch { key, response }
}

fn query_value(
    device: DeviceClass,
    ctx: &RequestContext,
    frame: &InboundFrame,
    echo: Echo,
) -> Dispatch {
    let key = rebuild_key(device, ctx, echo);
    let response = if ctx.action() != Some(action::GET) {
        mismatch(action::GET, ctx.action())
    } else {
        match frame.data() {
            Some((tag, payload)) => match ValueCodec::decode(tag, payload) {
                Some(value) => Response::Value(value),
                None => {
                    warn!(key = %key, tag, "Undecodable payload");
                    Response::Empty
                }
            },
            None => Response::Error(format!("{} answered with an ack", key)),
        }
    };
    Dispatch { key, response }
}

fn rebuild_key(device: DeviceClass, ctx: &RequestContext, echo: Echo) -> CorrelationKey {
    CorrelationKey::new(
        device,
        ctx.sub_command().unwrap_or(DEFAULT_SUB_COMMAND),
        echo.iter().filter_map(|&i| ctx.param(i)).collect(),
    )
}

fn mismatch(expected: u8, found: Option<u8>) -> Response {
    let found = found.map_or("none", action::name);
    warn!(expected = action::name(expected), found, "Action byte mismatch");
    Response::Error(format!(
        "action mismatch: expected {}, found {}",
        action::name(expected),
        found
    ))
}

fn unknown_sub_command(device: DeviceClass, ctx: &RequestContext) -> Dispatch {
    let sub_command = ctx.sub_command().unwrap_or(DEFAULT_SUB_COMMAND);
    Dispatch {
        key: CorrelationKey::new(device, sub_command, ctx.params().to_vec()),
        response: Response::Error(format!("unknown {} sub-command {}", device, sub_command)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, build_reset_frame, Param};
    use bytes::Bytes;

    fn data(tag: u8, payload: &[u8]) -> InboundFrame {
        InboundFrame::Data {
            declared_len: (payload.len() + 2) as u8,
            ext_id: 0,
            type_tag: tag,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    fn ctx(act: u8, device: DeviceClass, sub: u8, params: &[u8]) -> RequestContext {
        let params: Vec<Param> = params.iter().map(|&b| Param::Byte(b)).collect();
        RequestContext::new(build_frame(act, device.id(), sub, &params).unwrap())
    }

    #[test]
    fn test_motor_ack() {
        let c = ctx(action::RUN, DeviceClass::Motor, motor::MOVE, &[3, 60]);
        let d = decode_motor(DeviceClass::Motor, &c, &InboundFrame::Ack);
        assert_eq!(d.key.to_string(), "move-motor-3");
        assert_eq!(d.response, Response::Done);
    }

    #[test]
    fn test_motor_action_mismatch() {
        let c = ctx(action::GET, DeviceClass::Motor, motor::MOVE, &[3, 60]);
        let d = decode_motor(DeviceClass::Motor, &c, &InboundFrame::Ack);
        assert_eq!(d.key.to_string(), "move-motor-3");
        match d.response {
            Response::Error(msg) => {
                assert_eq!(msg, "action mismatch: expected run, found get")
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_colored_move_key_skips_speed() {
        let c = ctx(action::RUN, DeviceClass::Motor, motor::MOVE_COLOR, &[2, 10, 5]);
        let d = decode_motor(DeviceClass::Motor, &c, &InboundFrame::Ack);
        assert_eq!(d.key.to_string(), "move-motor-color-2-5");
        assert_eq!(d.response, Response::Done);
    }

    #[test]
    fn test_unknown_sub_command() {
        let c = ctx(action::RUN, DeviceClass::RgbLed, 9, &[1]);
        let d = decode_rgb(DeviceClass::RgbLed, &c, &InboundFrame::Ack);
        assert!(d.response.is_error());
    }

    #[test]
    fn test_distance_value() {
        let c = ctx(action::GET, DeviceClass::IrDistance, 0, &[1]);
        let d = decode_sensor(DeviceClass::IrDistance, &c, &data(3, &[0x2A, 0x00]));
        assert_eq!(d.key.to_string(), "distance-read-1");
        assert_eq!(d.response, Response::Value(SensorValue::I16(42)));
    }

    #[test]
    fn test_temperature_float() {
        let c = ctx(action::GET, DeviceClass::Temperature, 0, &[]);
        let d = decode_sensor(DeviceClass::Temperature, &c, &data(2, &21.5f32.to_le_bytes()));
        assert_eq!(d.key.to_string(), "temperature-read");
        assert_eq!(d.response.value(), Some(&SensorValue::F32(21.5)));
    }

    #[test]
    fn test_query_unknown_tag_is_empty() {
        let c = ctx(action::GET, DeviceClass::LightSensor, 0, &[2]);
        let d = decode_sensor(DeviceClass::LightSensor, &c, &data(9, &[1, 2]));
        assert_eq!(d.response, Response::Empty);
    }

    #[test]
    fn test_query_answered_by_ack() {
        let c = ctx(action::GET, DeviceClass::LineTracer, line::DETECT, &[1, 0]);
        let d = decode_line(DeviceClass::LineTracer, &c, &InboundFrame::Ack);
        assert_eq!(d.key.to_string(), "line-detect-1-0");
        assert!(d.response.is_error());
    }

    #[test]
    fn test_reset() {
        let c = RequestContext::new(build_reset_frame());
        let d = decode_reset(&c, &InboundFrame::Ack);
        assert_eq!(d.key, CorrelationKey::Reset);
        assert_eq!(d.response, Response::Done);

        let d = decode_reset(&c, &data(1, &[0]));
        assert!(d.response.is_error());
    }
}
