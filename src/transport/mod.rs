//! Transport module - the seams to the serial link.
//!
//! The driver runs over any [`SerialStream`]; opening and reopening the port
//! is left to the caller. Liveness changes are reported through a
//! [`LinkObserver`] and the current [`LinkState`].

mod link;

pub use link::{LinkObserver, LinkState, NoopObserver, SerialStream};
