//! Peripheral facade.
//!
//! A [`Coconut`] owns everything one robot link needs: the writer task, the
//! read loop feeding the frame buffer and dispatch table, the pending-request
//! correlator and the heartbeat. It exposes one async method per operation.
//!
//! The lifecycle:
//! 1. Split the stream and spawn the writer task and read loop
//! 2. Write the reset handshake and wait briefly for its ack
//! 3. Move to `Connected`, start the heartbeat if realtime mode is on
//! 4. Serve requests until [`Coconut::disconnect`] or the stream closes
//!
//! # Example
//!
//! ```no_run
//! use coconut_link::command::{Direction, Side};
//! use coconut_link::PeripheralBuilder;
//!
//! # async fn run(port: tokio::io::DuplexStream) -> coconut_link::Result<()> {
//! let robot = PeripheralBuilder::new()
//!     .default_speed(80)
//!     .realtime_mode(true)
//!     .connect(port)
//!     .await?;
//!
//! robot.move_motor(Direction::Forward).await?;
//! let distance = robot.get_distance(Side::Left).await?;
//! println!("distance: {distance}");
//!
//! robot.stop_all().await?;
//! robot.disconnect();
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::codec::SensorValue;
use crate::command::{
    Axis, Beat, Color, CommandEncoder, CorrelationKey, Detect, DeviceClass, Direction, Note,
    RemoteCommand, Request, Side,
};
use crate::error::{CoconutError, Result};
use crate::handler::{DecodeFn, DispatchTable, Response};
use crate::heartbeat::{Heartbeat, HeartbeatConfig, HeartbeatState, Probe};
use crate::pending::{PendingRequests, ResponseReceiver};
use crate::protocol::{FrameBuffer, InboundFrame};
use crate::transport::{LinkObserver, LinkState, NoopObserver, SerialStream};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Read buffer size for the serial stream.
const READ_BUFFER_SIZE: usize = 256;

/// Settings for one peripheral.
///
/// Every field has a default, so a partial document deserializes:
///
/// ```
/// use coconut_link::PeripheralConfig;
///
/// let config: PeripheralConfig = serde_json::from_str(r#"{ "default_speed": 100 }"#).unwrap();
/// assert_eq!(config.default_speed, 100);
/// assert_eq!(config.heartbeat_timeout_ms, 3000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    /// Interval between heartbeat probes.
    pub heartbeat_interval_ms: u64,
    /// Time without a heartbeat reply before the link is lost.
    pub heartbeat_timeout_ms: u64,
    /// Time a pin read waits before giving up.
    pub pin_read_timeout_ms: u64,
    /// Time `connect` waits for the handshake ack.
    pub handshake_timeout_ms: u64,
    /// Time the reply to an abandoned request is still expected and dropped.
    pub late_reply_window_ms: u64,
    /// Speed used by `move_motor`.
    pub default_speed: u8,
    /// Frame buffer cap.
    pub max_frame_buffer: usize,
    /// Start the heartbeat on connect.
    pub realtime_mode: bool,
    /// Writer channel capacity.
    pub channel_capacity: usize,
    /// Queued frames before backpressure.
    pub max_pending_frames: usize,
    /// Time a send waits for backpressure to clear.
    pub backpressure_timeout_ms: u64,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            heartbeat_timeout_ms: 3000,
            pin_read_timeout_ms: 1000,
            handshake_timeout_ms: 500,
            late_reply_window_ms: 2000,
            default_speed: crate::command::DEFAULT_SPEED,
            max_frame_buffer: crate::protocol::DEFAULT_MAX_BUFFER,
            realtime_mode: false,
            channel_capacity: crate::writer::DEFAULT_CHANNEL_CAPACITY,
            max_pending_frames: crate::writer::DEFAULT_MAX_PENDING_FRAMES,
            backpressure_timeout_ms: 5000,
        }
    }
}

impl PeripheralConfig {
    /// Heartbeat timing.
    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_millis(self.heartbeat_interval_ms.max(1)),
            timeout: Duration::from_millis(self.heartbeat_timeout_ms),
        }
    }

    /// Writer task settings.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_pending_frames: self.max_pending_frames,
            channel_capacity: self.channel_capacity,
            backpressure_timeout: Duration::from_millis(self.backpressure_timeout_ms),
        }
    }

    /// Pin read timeout.
    pub fn pin_read_timeout(&self) -> Duration {
        Duration::from_millis(self.pin_read_timeout_ms)
    }

    /// Handshake timeout.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Late-reply window for abandoned requests.
    pub fn late_reply_window(&self) -> Duration {
        Duration::from_millis(self.late_reply_window_ms)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for configuring and connecting a peripheral.
pub struct PeripheralBuilder {
    config: PeripheralConfig,
    observer: Arc<dyn LinkObserver>,
    table: DispatchTable,
}

impl PeripheralBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::from_config(PeripheralConfig::default())
    }

    /// Create a builder from a loaded configuration.
    pub fn from_config(config: PeripheralConfig) -> Self {
        Self {
            config,
            observer: Arc::new(NoopObserver),
            table: DispatchTable::standard(),
        }
    }

    /// Set the heartbeat probe interval.
    ///
    /// Default: 1 second
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval_ms = millis(interval);
        self
    }

    /// Set the time without a reply before the link is lost.
    ///
    /// Default: 3 seconds
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.config.heartbeat_timeout_ms = millis(timeout);
        self
    }

    /// Set the pin read timeout.
    ///
    /// Default: 1 second
    pub fn pin_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.pin_read_timeout_ms = millis(timeout);
        self
    }

    /// Set how long `connect` waits for the handshake ack.
    ///
    /// Default: 500 ms
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout_ms = millis(timeout);
        self
    }

    /// Set how long the reply to a timed-out request is still expected.
    ///
    /// Such a reply is dropped instead of answering a later request.
    ///
    /// Default: 2 seconds
    pub fn late_reply_window(mut self, window: Duration) -> Self {
        self.config.late_reply_window_ms = millis(window);
        self
    }

    /// Set the speed used by `move_motor`.
    ///
    /// Default: 60
    pub fn default_speed(mut self, speed: u8) -> Self {
        self.config.default_speed = speed;
        self
    }

    /// Set the frame buffer cap.
    ///
    /// Default: 1024
    pub fn max_frame_buffer(mut self, len: usize) -> Self {
        self.config.max_frame_buffer = len;
        self
    }

    /// Start the heartbeat as soon as the link is up.
    pub fn realtime_mode(mut self, enabled: bool) -> Self {
        self.config.realtime_mode = enabled;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the maximum queued frames for backpressure.
    ///
    /// Default: 64
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.max_pending_frames = limit;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.backpressure_timeout_ms = millis(timeout);
        self
    }

    /// Receive liveness notifications.
    pub fn observer<O: LinkObserver>(mut self, observer: O) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Replace the decoder for one device class.
    pub fn decoder(mut self, device: DeviceClass, decoder: DecodeFn) -> Self {
        self.table.register(device, decoder);
        self
    }

    /// Current settings.
    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    /// Take over `stream` and bring the link up.
    pub async fn connect<S: SerialStream>(self, stream: S) -> Result<Coconut> {
        Coconut::connect(self, stream).await
    }
}

impl Default for PeripheralBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers requests and queues their frames as one step, so the order of
/// the pending queue always matches the order on the wire.
struct Outbox {
    pending: Arc<PendingRequests>,
    writer: WriterHandle,
    order: AsyncMutex<()>,
}

impl Outbox {
    async fn submit(&self, request: Request) -> Result<ResponseReceiver> {
        let key = request.key().clone();
        let frame = request.frame().clone();

        let _order = self.order.lock().await;
        let rx = self.pending.register(request)?;
        if let Err(e) = self.writer.send(frame).await {
            self.pending.cancel(&key);
            return Err(e);
        }
        Ok(rx)
    }

    /// Queue a probe without waiting. Skipped while a caller holds the
    /// ordering lock or an earlier probe is unanswered.
    fn submit_probe(&self, request: Request) -> Result<()> {
        let Ok(_order) = self.order.try_lock() else {
            return Ok(());
        };
        let key = request.key().clone();
        let frame = request.frame().clone();

        if !self.pending.register_heartbeat(request)? {
            return Ok(());
        }
        if let Err(e) = self.writer.try_send(frame) {
            self.pending.cancel(&key);
            return Err(e);
        }
        Ok(())
    }
}

/// Sends heartbeat probes through the outbox.
struct HeartbeatProbe {
    encoder: CommandEncoder,
    outbox: Arc<Outbox>,
}

impl HeartbeatProbe {
    fn key(&self) -> Option<CorrelationKey> {
        self.encoder.heartbeat().ok().map(|request| request.key().clone())
    }
}

impl Probe for HeartbeatProbe {
    fn send_probe(&self) -> Result<()> {
        self.outbox.submit_probe(self.encoder.heartbeat()?)
    }

    fn abandon(&self) {
        if let Some(key) = self.key() {
            self.outbox.pending.abandon(&key);
        }
    }

    fn withdraw(&self) {
        if let Some(key) = self.key() {
            self.outbox.pending.cancel(&key);
        }
    }
}

/// A connected Coconut robot.
///
/// Requests to the same device class are queued; requests to different
/// classes may overlap.
pub struct Coconut {
    encoder: CommandEncoder,
    outbox: Arc<Outbox>,
    pending: Arc<PendingRequests>,
    link: Arc<watch::Sender<LinkState>>,
    heartbeat: Mutex<Heartbeat>,
    turns: Mutex<HashMap<Option<DeviceClass>, Arc<AsyncMutex<()>>>>,
    realtime: AtomicBool,
    closed: AtomicBool,
    pin_read_timeout: Duration,
    read_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
}

impl Coconut {
    /// Create a builder.
    pub fn builder() -> PeripheralBuilder {
        PeripheralBuilder::new()
    }

    async fn connect<S: SerialStream>(builder: PeripheralBuilder, stream: S) -> Result<Self> {
        let PeripheralBuilder {
            config,
            observer,
            table,
        } = builder;

        let link = Arc::new(watch::channel(LinkState::Connecting).0);
        let (reader, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, config.writer_config());
        let pending = Arc::new(PendingRequests::with_late_reply_window(
            config.late_reply_window(),
        ));

        let read_task = {
            let pending = pending.clone();
            let link = link.clone();
            let frames = FrameBuffer::with_max_len(config.max_frame_buffer);
            tokio::spawn(async move {
                if let Err(e) = read_loop(reader, frames, &table, &pending).await {
                    error!("Read loop error: {}", e);
                }
                pending.close();
                link.send_replace(LinkState::Disconnected);
            })
        };

        let outbox = Arc::new(Outbox {
            pending: pending.clone(),
            writer,
            order: AsyncMutex::new(()),
        });

        let coconut = Coconut {
            encoder: CommandEncoder::with_default_speed(config.default_speed),
            outbox,
            pending,
            heartbeat: Mutex::new(Heartbeat::new(
                config.heartbeat_config(),
                link.clone(),
                observer,
            )),
            link,
            turns: Mutex::new(HashMap::new()),
            realtime: AtomicBool::new(config.realtime_mode),
            closed: AtomicBool::new(false),
            pin_read_timeout: config.pin_read_timeout(),
            read_task,
            writer_task,
        };

        coconut.handshake(config.handshake_timeout()).await?;
        coconut.link.send_replace(LinkState::Connected);
        debug!("Coconut connected");

        if config.realtime_mode {
            coconut.start_heartbeat();
        }
        Ok(coconut)
    }

    /// Write the reset frame and give the robot a moment to ack it, so a
    /// late ack cannot resolve the first real command.
    async fn handshake(&self, timeout: Duration) -> Result<()> {
        let request = self.encoder.stop_all();
        match tokio::time::timeout(timeout, self.send(request)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                self.disconnect();
                Err(e)
            }
            Err(_) => {
                self.pending.abandon(&CorrelationKey::Reset);
                debug!("No handshake ack");
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Current link state.
    pub fn state(&self) -> LinkState {
        *self.link.borrow()
    }

    /// Watch link state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.link.subscribe()
    }

    /// Check if the link is up.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && !self.outbox.writer.is_closed()
            && self.state().is_connected()
    }

    /// Heartbeat state.
    pub fn heartbeat_state(&self) -> HeartbeatState {
        self.heartbeat().state()
    }

    /// Check if realtime program mode is on.
    pub fn is_realtime_mode(&self) -> bool {
        self.realtime.load(Ordering::Acquire)
    }

    /// Program mode changed. Realtime mode runs the heartbeat.
    pub fn set_realtime_mode(&self, enabled: bool) {
        self.realtime.store(enabled, Ordering::Release);
        if enabled {
            self.start_heartbeat();
        } else {
            self.stop_heartbeat();
        }
    }

    /// A firmware upload finished; restart the heartbeat.
    pub fn firmware_uploaded(&self) {
        self.start_heartbeat();
    }

    /// Stop the heartbeat, fail pending requests and close the stream.
    ///
    /// Calling it again does nothing.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.heartbeat().stop();
        self.pending.close();
        self.read_task.abort();
        self.writer_task.abort();
        self.link.send_replace(LinkState::Disconnected);
        debug!("Coconut disconnected");
    }

    /// Frames queued but not yet written.
    pub fn pending_frames(&self) -> usize {
        self.outbox.writer.pending_count()
    }

    /// Requests waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Abandoned requests still waiting to swallow a late reply.
    pub fn discarding_requests(&self) -> usize {
        self.pending.discarding()
    }

    fn heartbeat(&self) -> MutexGuard<'_, Heartbeat> {
        self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_heartbeat(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.link.send_if_modified(|state| {
            if *state == LinkState::Disconnected {
                *state = LinkState::Connected;
                true
            } else {
                false
            }
        });

        let probe = Arc::new(HeartbeatProbe {
            encoder: self.encoder.clone(),
            outbox: self.outbox.clone(),
        });
        let replies = self.pending.subscribe_heartbeat();
        self.heartbeat().start(probe, replies);
    }

    fn stop_heartbeat(&self) {
        self.heartbeat().stop();
        self.link.send_if_modified(|state| {
            if *state == LinkState::RealtimeConnected {
                *state = LinkState::Connected;
                true
            } else {
                false
            }
        });
    }

    // ------------------------------------------------------------------
    // Request path
    // ------------------------------------------------------------------

    fn turn(&self, device: Option<DeviceClass>) -> Arc<AsyncMutex<()>> {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        turns.entry(device).or_default().clone()
    }

    /// Send a built request and wait for its response.
    ///
    /// Waits behind any earlier request to the same device class.
    pub async fn send(&self, request: Request) -> Result<Response> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoconutError::NotConnected);
        }

        let turn = self.turn(request.key().device());
        let _turn = turn.lock().await;

        let key = request.key().clone();
        let rx = self.outbox.submit(request).await?;

        trace!(key = %key, "Awaiting reply");
        rx.await.map_err(|_| CoconutError::ConnectionClosed)
    }

    async fn run(&self, request: Request) -> Result<()> {
        match self.send(request).await? {
            Response::Error(message) => Err(CoconutError::Rejected(message)),
            _ => Ok(()),
        }
    }

    async fn query(&self, request: Request) -> Result<SensorValue> {
        let key = request.key().to_string();
        match self.send(request).await? {
            Response::Value(value) => Ok(value),
            Response::Error(message) => Err(CoconutError::Rejected(message)),
            Response::Done | Response::Empty => Err(CoconutError::NoData(key)),
        }
    }

    async fn query_with_timeout(&self, request: Request) -> Result<Option<SensorValue>> {
        let key = request.key().clone();
        match tokio::time::timeout(self.pin_read_timeout, self.query(request)).await {
            Ok(result) => result.map(Some),
            Err(_) => {
                self.pending.abandon(&key);
                debug!(key = %key, "Read timed out");
                Ok(None)
            }
        }
    }

    // ------------------------------------------------------------------
    // Drive motors
    // ------------------------------------------------------------------

    /// Move at the default speed.
    pub async fn move_motor(&self, direction: Direction) -> Result<()> {
        self.run(self.encoder.move_motor(direction)?).await
    }

    /// Move at `speed`.
    pub async fn move_motor_speed(&self, direction: Direction, speed: u8) -> Result<()> {
        self.run(self.encoder.move_motor_speed(direction, speed)?).await
    }

    /// Stop one or both wheels.
    pub async fn stop_motor(&self, side: Side) -> Result<()> {
        self.run(self.encoder.stop_motor(side)?).await
    }

    /// Move for `duration`, then stop.
    pub async fn move_motor_timed(
        &self,
        direction: Direction,
        speed: u8,
        duration: Duration,
    ) -> Result<()> {
        self.run(self.encoder.move_motor_timed(direction, speed, duration)?)
            .await
    }

    /// Move while lighting the LEDs.
    pub async fn move_motor_color(&self, direction: Direction, speed: u8, color: Color) -> Result<()> {
        self.run(self.encoder.move_motor_color(direction, speed, color)?)
            .await
    }

    /// Move `cm` centimetres.
    pub async fn move_motor_cm(&self, direction: Direction, cm: u8) -> Result<()> {
        self.run(self.encoder.move_motor_cm(direction, cm)?).await
    }

    /// Turn by `degrees`.
    pub async fn turn_motor_degree(&self, direction: Direction, degrees: i16) -> Result<()> {
        self.run(self.encoder.turn_motor_degree(direction, degrees)?)
            .await
    }

    // ------------------------------------------------------------------
    // RGB LEDs, buzzer, LED matrix
    // ------------------------------------------------------------------

    /// Light an RGB LED with a palette color.
    pub async fn rgb_on(&self, side: Side, color: Color) -> Result<()> {
        self.run(self.encoder.rgb_on(side, color)?).await
    }

    /// Switch an RGB LED off.
    pub async fn rgb_off(&self, side: Side) -> Result<()> {
        self.run(self.encoder.rgb_off(side)?).await
    }

    /// Light an RGB LED for `duration`.
    pub async fn rgb_on_timed(&self, side: Side, color: Color, duration: Duration) -> Result<()> {
        self.run(self.encoder.rgb_on_timed(side, color, duration)?)
            .await
    }

    /// Light an RGB LED with explicit levels.
    pub async fn rgb_custom(&self, side: Side, red: u8, green: u8, blue: u8) -> Result<()> {
        self.run(self.encoder.rgb_custom(side, red, green, blue)?)
            .await
    }

    /// Play a note.
    pub async fn play_note(&self, note: Note, octave: u8, sharp: bool, beat: Beat) -> Result<()> {
        self.run(self.encoder.play_note(note, octave, sharp, beat)?)
            .await
    }

    /// Play a frequency.
    pub async fn play_beep(&self, frequency: u16, beat: Beat) -> Result<()> {
        self.run(self.encoder.play_beep(frequency, beat)?).await
    }

    /// Rest for a beat.
    pub async fn play_rest(&self, beat: Beat) -> Result<()> {
        self.run(self.encoder.play_rest(beat)?).await
    }

    /// Play a stored melody.
    pub async fn play_melody(&self, melody: u8) -> Result<()> {
        self.run(self.encoder.play_melody(melody)?).await
    }

    /// Show a number on the matrix.
    pub async fn matrix_number(&self, number: u8) -> Result<()> {
        self.run(self.encoder.matrix_number(number)?).await
    }

    /// Show a character on the matrix.
    pub async fn matrix_char(&self, ch: char) -> Result<()> {
        self.run(self.encoder.matrix_char(ch)?).await
    }

    /// Show a bitmap on the matrix.
    pub async fn matrix_pattern(&self, rows: [u8; 8]) -> Result<()> {
        self.run(self.encoder.matrix_pattern(rows)?).await
    }

    /// Clear the matrix.
    pub async fn matrix_clear(&self) -> Result<()> {
        self.run(self.encoder.matrix_clear()?).await
    }

    // ------------------------------------------------------------------
    // External peripherals
    // ------------------------------------------------------------------

    /// Drive an external motor.
    pub async fn ext_motor_move(&self, port: u8, direction: Direction, speed: u8) -> Result<()> {
        self.run(self.encoder.ext_motor_move(port, direction, speed)?)
            .await
    }

    /// Set an external servo angle.
    pub async fn ext_servo_angle(&self, port: u8, angle: u8) -> Result<()> {
        self.run(self.encoder.ext_servo_angle(port, angle)?).await
    }

    /// Switch an external LED.
    pub async fn ext_led_set(&self, port: u8, on: bool) -> Result<()> {
        self.run(self.encoder.ext_led_set(port, on)?).await
    }

    /// Play a tone on an external speaker.
    pub async fn ext_speaker_tone(&self, port: u8, frequency: u16, beat: Beat) -> Result<()> {
        self.run(self.encoder.ext_speaker_tone(port, frequency, beat)?)
            .await
    }

    /// Read an external touch sensor.
    pub async fn ext_touch(&self, port: u8) -> Result<u8> {
        to_u8(&self.query(self.encoder.ext_touch(port)?).await?)
    }

    /// Read an external microphone.
    pub async fn ext_mic(&self, port: u8) -> Result<i16> {
        to_i16(&self.query(self.encoder.ext_mic(port)?).await?)
    }

    // ------------------------------------------------------------------
    // Sensors
    // ------------------------------------------------------------------

    /// Read an IR distance sensor.
    pub async fn get_distance(&self, side: Side) -> Result<i16> {
        to_i16(&self.query(self.encoder.get_distance(side)?).await?)
    }

    /// Read a light sensor.
    pub async fn get_light(&self, side: Side) -> Result<i16> {
        to_i16(&self.query(self.encoder.get_light(side)?).await?)
    }

    /// Read the temperature.
    pub async fn get_temperature(&self) -> Result<f32> {
        to_f32(&self.query(self.encoder.get_temperature()?).await?)
    }

    /// Read one accelerometer axis.
    pub async fn get_acceleration(&self, axis: Axis) -> Result<f32> {
        to_f32(&self.query(self.encoder.get_acceleration(axis)?).await?)
    }

    /// Raw line tracer reading.
    pub async fn get_line(&self, side: Side) -> Result<u8> {
        to_u8(&self.query(self.encoder.get_line(side)?).await?)
    }

    /// Whether a side sees a line of the given color.
    pub async fn detect_line(&self, side: Side, detect: Detect) -> Result<bool> {
        Ok(to_u8(&self.query(self.encoder.detect_line(side, detect)?).await?)? != 0)
    }

    /// Last remote-control button, `None` if nothing is pressed.
    pub async fn get_remote(&self) -> Result<Option<RemoteCommand>> {
        let code = to_u8(&self.query(self.encoder.get_remote()?).await?)?;
        Ok(RemoteCommand::from_code(code))
    }

    /// Read a digital pin. `None` if the robot does not answer in time.
    pub async fn digital_read(&self, pin: u8) -> Result<Option<u8>> {
        let value = self.query_with_timeout(self.encoder.digital_read(pin)?).await?;
        value.as_ref().map(to_u8).transpose()
    }

    /// Read an analog pin. `None` if the robot does not answer in time.
    pub async fn analog_read(&self, pin: u8) -> Result<Option<i16>> {
        let value = self.query_with_timeout(self.encoder.analog_read(pin)?).await?;
        value.as_ref().map(to_i16).transpose()
    }

    /// Reset the robot, stopping every actuator.
    ///
    /// A live realtime heartbeat keeps running. Otherwise the heartbeat is
    /// stopped and, in realtime mode, started afresh.
    pub async fn stop_all(&self) -> Result<()> {
        let keep_heartbeat = self.is_realtime_mode() && self.heartbeat().is_live();
        if !keep_heartbeat {
            self.stop_heartbeat();
        }
        let result = self.run(self.encoder.stop_all()).await;
        if !keep_heartbeat && self.is_realtime_mode() {
            self.start_heartbeat();
        }
        result
    }
}

impl Drop for Coconut {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Coconut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coconut")
            .field("state", &self.state())
            .field("realtime", &self.is_realtime_mode())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}

/// Read frames from the stream and resolve pending requests.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    mut frames: FrameBuffer,
    table: &DispatchTable,
    pending: &PendingRequests,
) -> Result<()> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("Serial stream closed");
                return Ok(());
            }
            Ok(n) => n,
            Err(e) => return Err(CoconutError::Io(e)),
        };

        for raw in frames.push(&buf[..n]) {
            trace!(frame = ?&raw[..], "RX");
            match InboundFrame::parse(raw) {
                Ok(frame) => {
                    pending.resolve(&frame, table);
                }
                Err(e) => warn!("Dropped frame: {}", e),
            }
        }
    }
}

fn unexpected(value: &SensorValue, wanted: &str) -> CoconutError {
    CoconutError::Protocol(format!("Expected {}, got {:?}", wanted, value))
}

fn to_f32(value: &SensorValue) -> Result<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| unexpected(value, "a number"))
}

fn to_i16(value: &SensorValue) -> Result<i16> {
    match value {
        SensorValue::I16(v) => Ok(*v),
        SensorValue::U8(v) => Ok(i16::from(*v)),
        SensorValue::F32(v) => Ok(v.round() as i16),
        SensorValue::Text(_) => Err(unexpected(value, "an integer")),
    }
}

fn to_u8(value: &SensorValue) -> Result<u8> {
    value
        .as_i64()
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| unexpected(value, "a byte"))
}
