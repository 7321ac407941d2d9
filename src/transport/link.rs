//! Link state and transport notifications.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

/// Connection state of a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    /// No link, or the heartbeat declared it lost.
    #[default]
    Disconnected,
    /// Stream accepted, handshake not yet written.
    Connecting,
    /// Handshake written.
    Connected,
    /// The heartbeat has seen a reply.
    RealtimeConnected,
}

impl LinkState {
    /// Check if commands can be sent.
    #[inline]
    pub fn is_connected(self) -> bool {
        matches!(self, LinkState::Connected | LinkState::RealtimeConnected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::RealtimeConnected => "realtime-connected",
        })
    }
}

/// Receives liveness notifications for the transport layer.
///
/// Both methods default to doing nothing.
pub trait LinkObserver: Send + Sync + 'static {
    /// The heartbeat saw its first reply.
    fn realtime_connected(&self) {}

    /// The heartbeat timed out. Called once per loss.
    fn realtime_lost(&self, _message: &str) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LinkObserver for NoopObserver {}

/// A byte stream a peripheral can run over: a serial port, a socket or an
/// in-memory pipe.
pub trait SerialStream: AsyncRead + AsyncWrite + Send + 'static {}

impl<T> SerialStream for T where T: AsyncRead + AsyncWrite + Send + 'static {}
