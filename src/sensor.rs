// Distance sensing for the navigation loop
//
// SerialRangefinder reads MaxBotix-style ASCII frames: 'R', three or more
// digits, then a carriage return (e.g. "R123\r").

use serialport::{self, SerialPort};
use std::io::Read;
use std::time::Duration;
use tracing::debug;

pub const RANGEFINDER_BAUDRATE: u32 = 9600;
pub const RANGEFINDER_TIMEOUT_MS: u64 = 200;

/// Longest frame accepted before giving up on resynchronising
const MAX_FRAME_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for a distance reading")]
    Timeout,

    #[error("Malformed distance frame: {frame:?}")]
    Malformed { frame: String },
}

/// Anything that can produce a scalar distance reading
pub trait DistanceSensor {
    fn read_distance(&mut self) -> Result<f64, SensorError>;
}

impl<F> DistanceSensor for F
where
    F: FnMut() -> Result<f64, SensorError>,
{
    fn read_distance(&mut self) -> Result<f64, SensorError> {
        self()
    }
}

/// Ultrasonic rangefinder streaming ASCII frames over a serial port
pub struct SerialRangefinder {
    port: Box<dyn SerialPort>,
}

impl SerialRangefinder {
    pub fn open(port_name: &str) -> Result<Self, SensorError> {
        let port = serialport::new(port_name, RANGEFINDER_BAUDRATE)
            .timeout(Duration::from_millis(RANGEFINDER_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }

    /// Read bytes until the next complete frame
    fn read_frame(&mut self) -> Result<String, SensorError> {
        let mut frame = String::new();
        let mut byte = [0u8; 1];
        let mut started = false;

        loop {
            self.port.read_exact(&mut byte).map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    SensorError::Timeout
                } else {
                    SensorError::Io(e)
                }
            })?;

            match byte[0] {
                b'R' => {
                    started = true;
                    frame.clear();
                    frame.push('R');
                }
                b'\r' if started => return Ok(frame),
                b if started => {
                    frame.push(b as char);
                    if frame.len() > MAX_FRAME_LEN {
                        return Err(SensorError::Malformed { frame });
                    }
                }
                _ => {} // noise before the first frame
            }
        }
    }
}

/// Parse one "R###" frame into a distance
pub fn parse_frame(frame: &str) -> Result<f64, SensorError> {
    frame
        .strip_prefix('R')
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u32>().ok())
        .map(f64::from)
        .ok_or_else(|| SensorError::Malformed {
            frame: frame.to_string(),
        })
}

impl DistanceSensor for SerialRangefinder {
    fn read_distance(&mut self) -> Result<f64, SensorError> {
        let frame = self.read_frame()?;
        let distance = parse_frame(&frame)?;
        debug!("Rangefinder: {}", distance);
        Ok(distance)
    }
}
