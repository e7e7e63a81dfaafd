// Keyboard teleop: W/S forward/backward, A/D pivot, E arc turn, R/F speed, space stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use hatbot_runtime::config::TOPIC_CMD_DRIVE;
use hatbot_runtime::messages::DriveCommand;
use hatbot_runtime::robot::Maneuver;

const SPEEDS: [i32; 3] = [80, 150, 255];
const INPUT_TIMEOUT_MS: u64 = 100; // Send stop after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_DRIVE).await?;

    info!("Controls: W/S=drive, A/D=pivot, E=arc turn, R/F=speed, space=stop, Q=quit");
    print_speed(0);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    // Leave the robot stopped whatever happened above
    publisher.put(serde_json::to_string(&DriveCommand::Stop)?).await?;
    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    let mut maneuver: Option<Maneuver> = None;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                let chosen = match code {
                    KeyCode::Char('w') if pressed => Some(Maneuver::Forward),
                    KeyCode::Char('s') if pressed => Some(Maneuver::Backward),
                    KeyCode::Char('a') if pressed => Some(Maneuver::Left),
                    KeyCode::Char('d') if pressed => Some(Maneuver::Right),
                    KeyCode::Char('e') if pressed => Some(Maneuver::Turn),

                    KeyCode::Char(' ') if pressed => {
                        maneuver = None;
                        None
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(SPEEDS.len() - 1);
                        print_speed(speed_idx);
                        None
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                        None
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => None,
                };

                if chosen.is_some() {
                    maneuver = chosen;
                    last_movement_input = Instant::now();
                }
            }
        }

        // Stop if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            maneuver = None;
        }

        // Always publish at ~50Hz
        let cmd = match maneuver {
            Some(m) => DriveCommand::drive(m, SPEEDS[speed_idx]),
            None => DriveCommand::Stop,
        };
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {} ({})", label, SPEEDS[idx]);
}
