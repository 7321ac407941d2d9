//! # coconut-link
//!
//! Host-side driver for the Coconut robot's serial protocol.
//!
//! The robot speaks a Firmata-derived binary protocol: the host sends
//! `FF 55 len 00 action device sub-command params...` and the robot answers
//! with either a bare 4-byte ack or a typed data frame, each followed by
//! `0D 0A`. Replies carry no request ID, so every reply is matched to the
//! oldest outstanding request expecting that shape and decoded against the
//! frame that request sent.
//!
//! ## Layers
//!
//! - [`protocol`] - framing: building outgoing frames, splitting the
//!   incoming byte stream, classifying frames
//! - [`codec`] - typed sensor values inside data frames
//! - [`command`] - device classes, symbolic parameters, one builder per
//!   operation
//! - [`handler`] - the per-device-class dispatch table
//! - [`pending`] - the request/reply correlator
//! - [`heartbeat`] - the liveness state machine
//! - [`Coconut`] - the facade owning one link
//!
//! ## Example
//!
//! ```no_run
//! use coconut_link::command::{Color, Direction, Side};
//! use coconut_link::Coconut;
//!
//! # async fn run(port: tokio::io::DuplexStream) -> coconut_link::Result<()> {
//! let robot = Coconut::builder().connect(port).await?;
//!
//! robot.rgb_on(Side::Both, Color::Green).await?;
//! robot.move_motor(Direction::Forward).await?;
//! if robot.get_distance(Side::Left).await? < 10 {
//!     robot.stop_all().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod handler;
pub mod heartbeat;
pub mod pending;
pub mod protocol;
pub mod transport;
pub mod writer;

mod peripheral;

pub use error::{CoconutError, Result};
pub use peripheral::{Coconut, PeripheralBuilder, PeripheralConfig};
pub use transport::{LinkObserver, LinkState};
