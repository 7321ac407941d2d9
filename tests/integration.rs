//! Integration tests for coconut-link.
//!
//! A fake robot runs on the far end of an in-memory duplex stream. It splits
//! incoming frames by their length byte, records them and answers according
//! to a reply function. Like the real firmware it handles one frame at a
//! time, so a slow reply holds back every reply after it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use coconut_link::codec::SensorValue;
use coconut_link::command::{Axis, Beat, Color, CorrelationKey, DeviceClass, Direction, Request, Side};
use coconut_link::handler::Response;
use coconut_link::heartbeat::HeartbeatState;
use coconut_link::protocol::{action, build_frame, Param};
use coconut_link::{Coconut, CoconutError, LinkObserver, LinkState, PeripheralBuilder};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

const RESET: [u8; 5] = [0xFF, 0x55, 0x02, 0x00, 0x04];

type Frames = Arc<Mutex<Vec<Vec<u8>>>>;

fn ack() -> Vec<u8> {
    vec![0xFF, 0x55, 0x00, 0x04, 0x0D, 0x0A]
}

fn data(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xFF, 0x55, (payload.len() + 2) as u8, 0x00, tag];
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&[0x0D, 0x0A]);
    frame
}

/// Replies of a well-behaved robot.
fn standard_reply(frame: &[u8]) -> Vec<u8> {
    match frame[4] {
        action::GET => match frame[5] {
            5 => data(3, &[0x2A, 0x00]),
            3 => data(3, &300i16.to_le_bytes()),
            2 => data(2, &21.5f32.to_le_bytes()),
            18 => data(2, &(-1.25f32).to_le_bytes()),
            14 => data(1, &[3]),
            _ => data(1, &[1]),
        },
        _ => ack(),
    }
}

fn spawn_robot<F>(stream: DuplexStream, reply: F) -> Frames
where
    F: Fn(&[u8]) -> Vec<u8> + Send + 'static,
{
    spawn_slow_robot(stream, move |frame: &[u8]| (Duration::ZERO, reply(frame)))
}

/// Robot whose reply function also says how long to wait before answering.
fn spawn_slow_robot<F>(mut stream: DuplexStream, reply: F) -> Frames
where
    F: Fn(&[u8]) -> (Duration, Vec<u8>) + Send + 'static,
{
    let frames: Frames = Arc::default();
    let seen = frames.clone();

    tokio::spawn(async move {
        let mut acc = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            acc.extend_from_slice(&buf[..n]);

            loop {
                while !acc.is_empty() && !acc.starts_with(&[0xFF, 0x55]) && acc != [0xFF] {
                    acc.remove(0);
                }
                if acc.len() < 3 || acc.len() < acc[2] as usize + 3 {
                    break;
                }
                let frame: Vec<u8> = acc.drain(..acc[2] as usize + 3).collect();
                seen.lock().unwrap().push(frame.clone());

                let (delay, out) = reply(&frame);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if !out.is_empty() && stream.write_all(&out).await.is_err() {
                    return;
                }
            }
        }
    });

    frames
}

async fn connect_with<F>(builder: PeripheralBuilder, reply: F) -> (Coconut, Frames)
where
    F: Fn(&[u8]) -> Vec<u8> + Send + 'static,
{
    let (host, robot) = duplex(4096);
    let frames = spawn_robot(robot, reply);
    let coconut = builder.connect(host).await.unwrap();
    (coconut, frames)
}

async fn connect_slow<F>(builder: PeripheralBuilder, reply: F) -> (Coconut, Frames)
where
    F: Fn(&[u8]) -> (Duration, Vec<u8>) + Send + 'static,
{
    let (host, robot) = duplex(4096);
    let frames = spawn_slow_robot(robot, reply);
    let coconut = builder.connect(host).await.unwrap();
    (coconut, frames)
}

fn is_heartbeat(frame: &[u8]) -> bool {
    frame.len() > 5 && frame[5] == DeviceClass::Heartbeat.id()
}

async fn connect() -> (Coconut, Frames) {
    connect_with(PeripheralBuilder::new(), standard_reply).await
}

fn sent(frames: &Frames) -> Vec<Vec<u8>> {
    frames.lock().unwrap().clone()
}

#[derive(Clone, Default)]
struct Recorder {
    connected: Arc<AtomicUsize>,
    lost: Arc<Mutex<Vec<String>>>,
}

impl LinkObserver for Recorder {
    fn realtime_connected(&self) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }

    fn realtime_lost(&self, message: &str) {
        self.lost.lock().unwrap().push(message.to_string());
    }
}

async fn wait_for_state(coconut: &Coconut, wanted: LinkState) {
    let mut rx = coconut.subscribe_state();
    timeout(Duration::from_secs(2), rx.wait_for(|state| *state == wanted))
        .await
        .expect("state change timed out")
        .unwrap();
}

#[tokio::test]
async fn test_connect_writes_handshake() {
    let (coconut, frames) = connect().await;

    assert_eq!(coconut.state(), LinkState::Connected);
    assert!(coconut.is_connected());
    assert_eq!(sent(&frames), vec![RESET.to_vec()]);
    assert_eq!(coconut.heartbeat_state(), HeartbeatState::Idle);
}

#[tokio::test]
async fn test_move_motor_forward() {
    let (coconut, frames) = connect().await;

    coconut.move_motor(Direction::Forward).await.unwrap();

    assert_eq!(
        sent(&frames)[1],
        vec![0xFF, 0x55, 0x06, 0x00, 0x02, 0x1A, 0x00, 0x03, 0x3C]
    );
    assert_eq!(coconut.pending_requests(), 0);
}

#[tokio::test]
async fn test_read_distance() {
    let (coconut, frames) = connect().await;

    assert_eq!(coconut.get_distance(Side::Left).await.unwrap(), 42);
    assert_eq!(
        sent(&frames)[1],
        vec![0xFF, 0x55, 0x05, 0x00, 0x01, 0x05, 0x00, 0x01]
    );
}

#[tokio::test]
async fn test_typed_queries() {
    let (coconut, _frames) = connect().await;

    assert_eq!(coconut.get_light(Side::Right).await.unwrap(), 300);
    assert_eq!(coconut.get_temperature().await.unwrap(), 21.5);
    assert_eq!(coconut.get_acceleration(Axis::X).await.unwrap(), -1.25);
    assert_eq!(
        coconut.get_remote().await.unwrap(),
        Some(coconut_link::command::RemoteCommand::Left)
    );
    assert!(coconut.detect_line(Side::Left, coconut_link::command::Detect::Black).await.unwrap());
    assert_eq!(coconut.digital_read(2).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_stop_all() {
    let (coconut, frames) = connect().await;

    coconut.stop_all().await.unwrap();

    let frames = sent(&frames);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1], RESET.to_vec());
}

#[tokio::test]
async fn test_actuator_sequence() {
    let (coconut, frames) = connect().await;

    coconut.rgb_on(Side::Both, Color::Blue).await.unwrap();
    coconut.play_beep(440, Beat::Quarter).await.unwrap();
    coconut.matrix_char('A').await.unwrap();
    coconut.ext_servo_angle(1, 90).await.unwrap();
    coconut
        .move_motor_timed(Direction::Backward, 50, Duration::from_millis(1500))
        .await
        .unwrap();

    let frames = sent(&frames);
    let devices: Vec<u8> = frames[1..].iter().map(|f| f[5]).collect();
    assert_eq!(devices, vec![25, 34, 41, 8, 26]);
    assert_eq!(&frames[5][9..11], &1500i16.to_le_bytes());
}

#[tokio::test]
async fn test_invalid_parameter_sends_nothing() {
    let (coconut, frames) = connect().await;

    let err = coconut.ext_servo_angle(1, 200).await.unwrap_err();
    assert!(matches!(err, CoconutError::InvalidParameter { .. }));
    assert_eq!(sent(&frames).len(), 1);
}

#[tokio::test]
async fn test_action_mismatch_resolves_with_error() {
    let (coconut, _frames) = connect().await;

    // A motor frame sent as a query: the robot answers with data, and the
    // motor decoder flags the action byte.
    let frame = build_frame(action::GET, DeviceClass::Motor.id(), 0, &[Param::Byte(3), Param::Byte(60)])
        .unwrap();
    let request = Request::new(CorrelationKey::new(DeviceClass::Motor, 0, vec![3]), frame);

    match coconut.send(request).await.unwrap() {
        Response::Error(message) => assert!(message.contains("action mismatch")),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn test_resync_after_noise() {
    let (coconut, _frames) = connect_with(PeripheralBuilder::new(), |frame: &[u8]| {
        let mut out = vec![0x13, 0x37, 0xFF, 0x00, 0x0D];
        if frame[4] == action::GET {
            out.extend(data(3, &[0x10, 0x00]));
        } else {
            out.extend(ack());
        }
        out
    })
    .await;

    assert_eq!(coconut.get_distance(Side::Right).await.unwrap(), 16);
    coconut.stop_motor(Side::Both).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests() {
    let (coconut, frames) = connect().await;
    let coconut = Arc::new(coconut);

    let a = tokio::spawn({
        let coconut = coconut.clone();
        async move { coconut.get_distance(Side::Left).await }
    });
    let b = tokio::spawn({
        let coconut = coconut.clone();
        async move { coconut.rgb_off(Side::Right).await }
    });
    let c = tokio::spawn({
        let coconut = coconut.clone();
        async move { coconut.get_distance(Side::Right).await }
    });

    assert_eq!(a.await.unwrap().unwrap(), 42);
    b.await.unwrap().unwrap();
    assert_eq!(c.await.unwrap().unwrap(), 42);
    assert_eq!(sent(&frames).len(), 4);
    assert_eq!(coconut.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pin_read_timeout() {
    let builder = PeripheralBuilder::new()
        .pin_read_timeout(Duration::from_millis(50))
        .late_reply_window(Duration::from_millis(100));
    let (coconut, _frames) = connect_with(builder, |frame: &[u8]| {
        if frame[5] == DeviceClass::AnalogPin.id() {
            Vec::new()
        } else {
            standard_reply(frame)
        }
    })
    .await;

    assert_eq!(coconut.analog_read(0).await.unwrap(), None);
    assert_eq!(coconut.pending_requests(), 0);
    assert_eq!(coconut.discarding_requests(), 1);

    // Once the window has passed, data replies go to new queries again.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(coconut.get_distance(Side::Left).await.unwrap(), 42);
    assert_eq!(coconut.discarding_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_pin_reply_is_discarded() {
    let builder = PeripheralBuilder::new().pin_read_timeout(Duration::from_millis(50));
    let (coconut, _frames) = connect_slow(builder, |frame: &[u8]| {
        if frame[5] == DeviceClass::AnalogPin.id() {
            (Duration::from_millis(150), data(3, &[0x07, 0x00]))
        } else {
            (Duration::ZERO, standard_reply(frame))
        }
    })
    .await;

    assert_eq!(coconut.analog_read(0).await.unwrap(), None);
    assert_eq!(coconut.get_distance(Side::Left).await.unwrap(), 42);
    assert_eq!(coconut.discarding_requests(), 0);
    assert_eq!(coconut.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_handshake_ack_is_discarded() {
    let builder = PeripheralBuilder::new().handshake_timeout(Duration::from_millis(50));
    let (coconut, _frames) = connect_slow(builder, |frame: &[u8]| {
        let delay = if frame == &RESET[..] { 150 } else { 100 };
        (Duration::from_millis(delay), standard_reply(frame))
    })
    .await;
    assert_eq!(coconut.discarding_requests(), 1);

    // The reset ack lands 100 ms into the move; the motor ack 100 ms later.
    let started = tokio::time::Instant::now();
    coconut.move_motor(Direction::Forward).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(coconut.discarding_requests(), 0);
}

#[tokio::test]
async fn test_disconnect_fails_pending() {
    let (coconut, _frames) = connect_with(PeripheralBuilder::new(), |frame: &[u8]| {
        if frame[4] == action::GET {
            Vec::new()
        } else {
            ack()
        }
    })
    .await;
    let coconut = Arc::new(coconut);

    let waiting = tokio::spawn({
        let coconut = coconut.clone();
        async move { coconut.get_temperature().await }
    });
    while coconut.pending_requests() == 0 {
        tokio::task::yield_now().await;
    }

    coconut.disconnect();
    coconut.disconnect();

    assert!(matches!(
        waiting.await.unwrap(),
        Err(CoconutError::ConnectionClosed)
    ));
    assert_eq!(coconut.state(), LinkState::Disconnected);
    assert!(matches!(
        coconut.move_motor(Direction::Left).await,
        Err(CoconutError::NotConnected)
    ));
}

#[tokio::test]
async fn test_robot_hangup() {
    let (host, mut robot) = duplex(64);
    let hangup = tokio::spawn(async move {
        let mut handshake = [0u8; 5];
        robot.read_exact(&mut handshake).await.unwrap();
        assert_eq!(handshake, RESET);
        robot.write_all(&ack()).await.unwrap();
    });

    let coconut = Coconut::builder().connect(host).await.unwrap();
    hangup.await.unwrap();

    wait_for_state(&coconut, LinkState::Disconnected).await;
    assert!(!coconut.is_connected());
    assert!(matches!(
        coconut.get_temperature().await,
        Err(CoconutError::NotConnected)
    ));
}

#[tokio::test]
async fn test_heartbeat_live_then_lost() {
    let answering = Arc::new(AtomicBool::new(true));
    let recorder = Recorder::default();

    let builder = PeripheralBuilder::new()
        .heartbeat_interval(Duration::from_millis(20))
        .heartbeat_timeout(Duration::from_millis(150))
        .observer(recorder.clone());
    let (coconut, frames) = connect_with(builder, {
        let answering = answering.clone();
        move |frame: &[u8]| {
            if frame[5] == DeviceClass::Heartbeat.id() && !answering.load(Ordering::SeqCst) {
                Vec::new()
            } else {
                standard_reply(frame)
            }
        }
    })
    .await;

    assert!(!coconut.is_realtime_mode());
    coconut.set_realtime_mode(true);
    wait_for_state(&coconut, LinkState::RealtimeConnected).await;
    assert_eq!(coconut.heartbeat_state(), HeartbeatState::Live);
    assert_eq!(recorder.connected.load(Ordering::SeqCst), 1);

    // Regular requests keep working alongside the probes.
    assert_eq!(coconut.get_distance(Side::Left).await.unwrap(), 42);

    answering.store(false, Ordering::SeqCst);
    wait_for_state(&coconut, LinkState::Disconnected).await;
    assert_eq!(coconut.heartbeat_state(), HeartbeatState::Lost);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        *recorder.lost.lock().unwrap(),
        vec!["connect timeout".to_string()]
    );

    let heartbeats = sent(&frames).iter().filter(|f| is_heartbeat(f)).count();
    assert!(heartbeats >= 2);
}

#[tokio::test]
async fn test_realtime_mode_off_stops_heartbeat() {
    let builder = PeripheralBuilder::new()
        .heartbeat_interval(Duration::from_millis(20))
        .realtime_mode(true);
    let (coconut, _frames) = connect_with(builder, standard_reply).await;

    wait_for_state(&coconut, LinkState::RealtimeConnected).await;
    coconut.set_realtime_mode(false);
    assert_eq!(coconut.state(), LinkState::Connected);
    assert_eq!(coconut.heartbeat_state(), HeartbeatState::Idle);

    coconut.firmware_uploaded();
    wait_for_state(&coconut, LinkState::RealtimeConnected).await;
}

#[tokio::test(start_paused = true)]
async fn test_late_heartbeat_reply_after_loss_is_discarded() {
    let slow = Arc::new(AtomicBool::new(false));
    let builder = PeripheralBuilder::new()
        .heartbeat_interval(Duration::from_millis(20))
        .heartbeat_timeout(Duration::from_millis(150));
    let (coconut, _frames) = connect_slow(builder, {
        let slow = slow.clone();
        move |frame: &[u8]| {
            let delay = if is_heartbeat(frame) && slow.load(Ordering::SeqCst) {
                Duration::from_millis(300)
            } else {
                Duration::ZERO
            };
            (delay, standard_reply(frame))
        }
    })
    .await;

    coconut.set_realtime_mode(true);
    wait_for_state(&coconut, LinkState::RealtimeConnected).await;
    slow.store(true, Ordering::SeqCst);
    wait_for_state(&coconut, LinkState::Disconnected).await;

    // The heartbeat reply is still on its way and must not answer this.
    assert_eq!(coconut.get_distance(Side::Left).await.unwrap(), 42);
}

#[tokio::test(start_paused = true)]
async fn test_realtime_off_while_heartbeat_in_flight() {
    let slow = Arc::new(AtomicBool::new(false));
    let builder = PeripheralBuilder::new()
        .heartbeat_interval(Duration::from_millis(20))
        .heartbeat_timeout(Duration::from_secs(1));
    let (coconut, _frames) = connect_slow(builder, {
        let slow = slow.clone();
        move |frame: &[u8]| {
            let delay = if is_heartbeat(frame) && slow.load(Ordering::SeqCst) {
                Duration::from_millis(300)
            } else {
                Duration::ZERO
            };
            (delay, standard_reply(frame))
        }
    })
    .await;

    coconut.set_realtime_mode(true);
    wait_for_state(&coconut, LinkState::RealtimeConnected).await;
    slow.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(coconut.pending_requests(), 1);

    coconut.set_realtime_mode(false);
    assert_eq!(coconut.pending_requests(), 0);
    assert_eq!(coconut.discarding_requests(), 1);
    assert_eq!(coconut.get_distance(Side::Left).await.unwrap(), 42);
}

#[tokio::test(start_paused = true)]
async fn test_realtime_off_before_first_heartbeat_reply() {
    let builder = PeripheralBuilder::new()
        .heartbeat_interval(Duration::from_millis(20))
        .heartbeat_timeout(Duration::from_secs(1));
    let (coconut, _frames) = connect_with(builder, |frame: &[u8]| {
        if is_heartbeat(frame) {
            Vec::new()
        } else {
            standard_reply(frame)
        }
    })
    .await;

    coconut.set_realtime_mode(true);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(coconut.heartbeat_state(), HeartbeatState::AwaitingFirstReply);
    assert_eq!(coconut.pending_requests(), 1);

    // A robot that never answered leaves nothing to wait for.
    coconut.set_realtime_mode(false);
    assert_eq!(coconut.pending_requests(), 0);
    assert_eq!(coconut.discarding_requests(), 0);
    let distance = timeout(Duration::from_secs(1), coconut.get_distance(Side::Left)).await;
    assert_eq!(distance.unwrap().unwrap(), 42);
}

#[tokio::test(start_paused = true)]
async fn test_queries_between_slow_heartbeats() {
    let builder = PeripheralBuilder::new()
        .heartbeat_interval(Duration::from_millis(20))
        .heartbeat_timeout(Duration::from_millis(500));
    let (coconut, _frames) = connect_slow(builder, |frame: &[u8]| {
        let delay = if is_heartbeat(frame) { 50 } else { 0 };
        (Duration::from_millis(delay), standard_reply(frame))
    })
    .await;

    coconut.set_realtime_mode(true);
    wait_for_state(&coconut, LinkState::RealtimeConnected).await;

    for _ in 0..5 {
        assert_eq!(coconut.get_distance(Side::Left).await.unwrap(), 42);
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    assert_eq!(coconut.heartbeat_state(), HeartbeatState::Live);
}

#[tokio::test]
async fn test_stop_all_keeps_live_heartbeat() {
    let recorder = Recorder::default();
    let builder = PeripheralBuilder::new()
        .heartbeat_interval(Duration::from_millis(20))
        .realtime_mode(true)
        .observer(recorder.clone());
    let (coconut, frames) = connect_with(builder, standard_reply).await;

    wait_for_state(&coconut, LinkState::RealtimeConnected).await;
    coconut.stop_all().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(coconut.state(), LinkState::RealtimeConnected);
    assert_eq!(coconut.heartbeat_state(), HeartbeatState::Live);
    assert_eq!(recorder.connected.load(Ordering::SeqCst), 1);
    assert!(sent(&frames).iter().filter(|f| f[..] == RESET).count() >= 2);
}

#[tokio::test]
async fn test_sensor_value_passthrough() {
    let (coconut, _frames) = connect().await;
    let request = coconut_link::command::CommandEncoder::new()
        .ext_touch(2)
        .unwrap();

    assert_eq!(
        coconut.send(request).await.unwrap(),
        Response::Value(SensorValue::U8(1))
    );
}
