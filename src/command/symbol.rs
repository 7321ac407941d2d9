//! Symbolic parameter domains.
//!
//! Each domain is a closed enum with a total mapping to its protocol code.
//! `FromStr` accepts either the menu name (case-insensitive) or the numeric
//! code, so the UI layer can pass whichever it holds:
//!
//! ```
//! use coconut_link::command::Direction;
//!
//! assert_eq!("Forward".parse::<Direction>().unwrap(), Direction::Forward);
//! assert_eq!("3".parse::<Direction>().unwrap(), Direction::Forward);
//! assert!("Sideways".parse::<Direction>().is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{CoconutError, Result};

macro_rules! symbol_enum {
    (
        $(#[$meta:meta])*
        $name:ident : $repr:ty, $domain:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every value of this domain.
            pub const ALL: &'static [$name] = &[$( $name::$variant, )+];

            /// Domain name used in errors.
            pub const DOMAIN: &'static str = $domain;

            /// Protocol code.
            pub fn code(self) -> $repr {
                match self {
                    $( $name::$variant => $code, )+
                }
            }

            /// Menu name.
            pub fn label(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }

            /// Look up a value by protocol code.
            pub fn from_code(code: $repr) -> Option<Self> {
                match code {
                    $( $code => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl FromStr for $name {
            type Err = CoconutError;

            fn from_str(s: &str) -> Result<Self> {
                let trimmed = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.label().eq_ignore_ascii_case(trimmed))
                    .or_else(|| trimmed.parse::<$repr>().ok().and_then(Self::from_code))
                    .ok_or_else(|| CoconutError::UnknownSymbol {
                        domain: $domain,
                        value: s.to_string(),
                    })
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = CoconutError;

            fn try_from(code: $repr) -> Result<Self> {
                Self::from_code(code).ok_or_else(|| CoconutError::UnknownSymbol {
                    domain: $domain,
                    value: code.to_string(),
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

symbol_enum! {
    /// Drive direction.
    Direction: u8, "direction" {
        /// Spin left.
        Left = 1 => "Left",
        /// Spin right.
        Right = 2 => "Right",
        /// Drive forward.
        Forward = 3 => "Forward",
        /// Drive backward.
        Backward = 4 => "Backward",
    }
}

symbol_enum! {
    /// Left/right selector for paired sensors, LEDs and wheels.
    Side: u8, "side" {
        /// Left unit.
        Left = 1 => "Left",
        /// Right unit.
        Right = 2 => "Right",
        /// Both units.
        Both = 3 => "Both",
    }
}

symbol_enum! {
    /// RGB LED palette.
    Color: u8, "color" {
        /// Red.
        Red = 1 => "Red",
        /// Green.
        Green = 2 => "Green",
        /// Blue.
        Blue = 3 => "Blue",
        /// Yellow.
        Yellow = 4 => "Yellow",
        /// Cyan.
        Cyan = 5 => "Cyan",
        /// Magenta.
        Magenta = 6 => "Magenta",
        /// White.
        White = 7 => "White",
    }
}

symbol_enum! {
    /// Note length; the code is the duration in milliseconds.
    Beat: u16, "beat" {
        /// 1/16.
        Sixteenth = 125 => "Sixteenth",
        /// 1/8.
        Eighth = 250 => "Eighth",
        /// 1/4.
        Quarter = 500 => "Quarter",
        /// 1/2.
        Half = 1000 => "Half",
        /// Whole note.
        Whole = 2000 => "Whole",
    }
}

symbol_enum! {
    /// Note name within an octave.
    Note: u8, "note" {
        /// C.
        C = 1 => "C",
        /// D.
        D = 2 => "D",
        /// E.
        E = 3 => "E",
        /// F.
        F = 4 => "F",
        /// G.
        G = 5 => "G",
        /// A.
        A = 6 => "A",
        /// B.
        B = 7 => "B",
    }
}

symbol_enum! {
    /// Line color the tracer looks for.
    Detect: u8, "detect" {
        /// Dark line.
        Black = 0 => "Black",
        /// Light line.
        White = 1 => "White",
    }
}

symbol_enum! {
    /// Remote-control button.
    RemoteCommand: u8, "command" {
        /// Up arrow.
        Up = 1 => "Up",
        /// Down arrow.
        Down = 2 => "Down",
        /// Left arrow.
        Left = 3 => "Left",
        /// Right arrow.
        Right = 4 => "Right",
        /// Centre button.
        Ok = 5 => "OK",
    }
}

symbol_enum! {
    /// Accelerometer axis.
    Axis: u8, "axis" {
        /// X axis.
        X = 1 => "X",
        /// Y axis.
        Y = 2 => "Y",
        /// Z axis.
        Z = 3 => "Z",
    }
}

impl Beat {
    /// Beat length as a signed 16-bit millisecond count for the wire.
    pub fn millis(self) -> i16 {
        i16::try_from(self.code()).unwrap_or(i16::MAX)
    }
}
