//! Correlation keys.
//!
//! Replies carry no request ID, so a pending request is identified by what
//! was asked: the device class, the sub-command and the parameters the reply
//! decoder can recover from the request frame. The `Display` form is the
//! event name used in logs, e.g. `move-motor-3` or `distance-read-1`.

use std::fmt;

use super::device::{label, DeviceClass};

/// Structured identity of an outstanding request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    /// Reset / stop-all; carries no device class.
    Reset,
    /// A device-class request.
    Device {
        /// Addressed device class.
        device: DeviceClass,
        /// Operation within the class.
        sub_command: u8,
        /// Echoed parameter codes that distinguish concurrent requests.
        params: Vec<u8>,
    },
}

impl CorrelationKey {
    /// Key for a device-class request.
    pub fn new(device: DeviceClass, sub_command: u8, params: Vec<u8>) -> Self {
        CorrelationKey::Device {
            device,
            sub_command,
            params,
        }
    }

    /// Addressed device class, `None` for reset.
    pub fn device(&self) -> Option<DeviceClass> {
        match self {
            CorrelationKey::Reset => None,
            CorrelationKey::Device { device, .. } => Some(*device),
        }
    }

    /// Check if this is the heartbeat probe key.
    pub fn is_heartbeat(&self) -> bool {
        self.device() == Some(DeviceClass::Heartbeat)
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationKey::Reset => f.write_str("reset"),
            CorrelationKey::Device {
                device,
                sub_command,
                params,
            } => {
                match label(*device, *sub_command) {
                    Some(name) => f.write_str(name)?,
                    None => write!(f, "{}-{}", device, sub_command)?,
                }
                for p in params {
                    write!(f, "-{}", p)?;
                }
                Ok(())
            }
        }
    }
}
