//! Drive demo - a short realtime session with a Coconut robot.
//!
//! The robot's serial port must be reachable as a TCP stream, for example
//! through `ser2net` or a Bluetooth-serial bridge:
//!
//! ```text
//! ser2net -C "2000:raw:0:/dev/ttyUSB0:115200 8DATABITS NONE 1STOPBIT"
//! cargo run --example drive -- 127.0.0.1:2000 [config.json]
//! ```
//!
//! The optional JSON file holds a `PeripheralConfig`; missing fields keep
//! their defaults.

use std::time::Duration;

use coconut_link::command::{Beat, Color, Direction, Note, Side};
use coconut_link::{Coconut, LinkObserver, PeripheralBuilder, PeripheralConfig};
use tokio::net::TcpStream;

/// Prints liveness changes.
struct Console;

impl LinkObserver for Console {
    fn realtime_connected(&self) {
        println!("realtime link up");
    }

    fn realtime_lost(&self, message: &str) {
        println!("realtime link lost: {message}");
    }
}

async fn patrol(robot: &Coconut) -> coconut_link::Result<()> {
    robot.rgb_on(Side::Both, Color::Green).await?;
    robot.play_note(Note::C, 4, false, Beat::Eighth).await?;

    for _ in 0..20 {
        let left = robot.get_distance(Side::Left).await?;
        let right = robot.get_distance(Side::Right).await?;
        println!("distance left={left} right={right}");

        if left.min(right) < 10 {
            robot.rgb_on(Side::Both, Color::Red).await?;
            robot.turn_motor_degree(Direction::Right, 90).await?;
            robot.rgb_on(Side::Both, Color::Green).await?;
        } else {
            robot
                .move_motor_timed(Direction::Forward, 60, Duration::from_millis(500))
                .await?;
        }
    }

    println!("temperature: {:.1}", robot.get_temperature().await?);
    robot.stop_all().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:2000".to_string());
    let config = match args.next() {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => PeripheralConfig::default(),
    };

    let stream = TcpStream::connect(&addr).await?;
    let robot = PeripheralBuilder::from_config(config)
        .realtime_mode(true)
        .observer(Console)
        .connect(stream)
        .await?;
    println!("connected to {addr}: {}", robot.state());

    let result = patrol(&robot).await;
    robot.disconnect();
    result?;
    Ok(())
}
