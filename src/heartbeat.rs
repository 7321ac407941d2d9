//! Heartbeat / liveness state machine.
//!
//! ```text
//! Idle ─start─► AwaitingFirstReply ─reply─► Live ─timeout─► Lost
//!                       │                                    ▲
//!                       └──────────────timeout───────────────┘
//! ```
//!
//! While running, a probe is sent every `interval`. Every reply re-arms a
//! `timeout` deadline; the first one also reports the link as realtime
//! connected. When the deadline passes the link is reported lost exactly
//! once and the task ends. It does not restart on its own: the next
//! [`Heartbeat::start`] does that.
//!
//! Only one probe is ever unanswered. When probing ends with that probe
//! still out, a robot that has answered before is expected to answer it
//! late, so the probe is abandoned and its reply discarded. A robot that
//! never answered gets the probe withdrawn outright.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::Result;
use crate::handler::Response;
use crate::transport::{LinkObserver, LinkState};

/// Default interval between probes.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Default time without a reply before the link is declared lost.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(3);

/// Message passed to [`LinkObserver::realtime_lost`] on timeout.
pub const TIMEOUT_MESSAGE: &str = "connect timeout";

/// Sends liveness probes.
pub trait Probe: Send + Sync + 'static {
    /// Queue a probe frame without waiting. The reply arrives on the
    /// heartbeat channel. Does nothing while a probe is unanswered.
    fn send_probe(&self) -> Result<()>;

    /// Stop waiting for the unanswered probe; its late reply is discarded.
    fn abandon(&self) {}

    /// Forget the unanswered probe; no reply to it is expected.
    fn withdraw(&self) {}
}

/// Heartbeat state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeartbeatState {
    /// Not running.
    #[default]
    Idle,
    /// Probing, no reply yet.
    AwaitingFirstReply,
    /// Replies are arriving.
    Live,
    /// Timed out.
    Lost,
}

/// Heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between probes.
    pub interval: Duration,
    /// Time without a reply before the link is lost.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }
}

/// Liveness monitor for one peripheral.
pub struct Heartbeat {
    config: HeartbeatConfig,
    state: Arc<watch::Sender<HeartbeatState>>,
    link: Arc<watch::Sender<LinkState>>,
    observer: Arc<dyn LinkObserver>,
    task: Option<JoinHandle<()>>,
    probe: Option<Arc<dyn Probe>>,
}

impl Heartbeat {
    /// Create an idle heartbeat.
    ///
    /// `link` is updated to `RealtimeConnected` on the first reply and to
    /// `Disconnected` on loss.
    pub fn new(
        config: HeartbeatConfig,
        link: Arc<watch::Sender<LinkState>>,
        observer: Arc<dyn LinkObserver>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(watch::channel(HeartbeatState::Idle).0),
            link,
            observer,
            task: None,
            probe: None,
        }
    }

    /// Start probing. A running heartbeat is restarted.
    pub fn start(&mut self, probe: Arc<dyn Probe>, replies: broadcast::Receiver<Response>) {
        self.release();
        self.probe = Some(probe.clone());
        self.state.send_replace(HeartbeatState::AwaitingFirstReply);
        debug!(
            interval_ms = self.config.interval.as_millis() as u64,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Heartbeat started"
        );

        let monitor = Monitor {
            config: self.config,
            state: self.state.clone(),
            link: self.link.clone(),
            observer: self.observer.clone(),
        };
        self.task = Some(tokio::spawn(monitor.run(probe, replies)));
    }

    /// Stop probing and reset to `Idle`. Safe to call in any state.
    pub fn stop(&mut self) {
        if self.release() {
            debug!("Heartbeat stopped");
        }
        self.state.send_replace(HeartbeatState::Idle);
    }

    /// End the task and dispose of its unanswered probe.
    fn release(&mut self) -> bool {
        let running = self.abort();
        if let Some(probe) = self.probe.take() {
            if running {
                dispose(probe.as_ref(), self.state());
            }
        }
        running
    }

    fn abort(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Current state.
    pub fn state(&self) -> HeartbeatState {
        *self.state.borrow()
    }

    /// Check if replies are arriving.
    pub fn is_live(&self) -> bool {
        self.state() == HeartbeatState::Live
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<HeartbeatState> {
        self.state.subscribe()
    }

    /// Configured timing.
    pub fn config(&self) -> HeartbeatConfig {
        self.config
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.abort();
    }
}

struct Monitor {
    config: HeartbeatConfig,
    state: Arc<watch::Sender<HeartbeatState>>,
    link: Arc<watch::Sender<LinkState>>,
    observer: Arc<dyn LinkObserver>,
}

impl Monitor {
    async fn run(self, probe: Arc<dyn Probe>, mut replies: broadcast::Receiver<Response>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = sleep(self.config.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = probe.send_probe() {
                        debug!("Heartbeat probe not sent: {}", e);
                    }
                }
                reply = replies.recv() => match reply {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        deadline.as_mut().reset(Instant::now() + self.config.timeout);
                        self.mark_live();
                    }
                    Err(RecvError::Closed) => {
                        debug!("Heartbeat reply channel closed");
                        return;
                    }
                },
                _ = &mut deadline => {
                    dispose(probe.as_ref(), *self.state.borrow());
                    self.mark_lost();
                    return;
                }
            }
        }
    }

    fn mark_live(&self) {
        let previous = self.state.send_replace(HeartbeatState::Live);
        if previous != HeartbeatState::Live {
            debug!("Realtime link up");
            self.link.send_replace(LinkState::RealtimeConnected);
            self.observer.realtime_connected();
        }
    }

    fn mark_lost(&self) {
        self.state.send_replace(HeartbeatState::Lost);
        self.link.send_replace(LinkState::Disconnected);
        warn!(
            timeout_ms = self.config.timeout.as_millis() as u64,
            "Realtime link lost"
        );
        self.observer.realtime_lost(TIMEOUT_MESSAGE);
    }
}

fn dispose(probe: &dyn Probe, state: HeartbeatState) {
    match state {
        HeartbeatState::Live => probe.abandon(),
        HeartbeatState::AwaitingFirstReply => probe.withdraw(),
        HeartbeatState::Idle | HeartbeatState::Lost => {}
    }
}
