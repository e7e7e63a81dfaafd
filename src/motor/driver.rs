// Motor driver abstraction
//
// The robot only ever addresses motors through this trait, so the serial
// HAT bridge, the dry-run driver and the test recorder are interchangeable.

use tracing::debug;

use super::hat::HatError;

/// H-bridge direction for one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    /// Coast, motor unpowered
    Release,
}

/// Per-motor command sink, addressed by HAT channel id
pub trait MotorDriver: Send {
    /// Set the PWM speed of one motor (0-255)
    fn set_speed(&mut self, motor: u8, speed: u8) -> Result<(), HatError>;

    /// Set the direction of one motor
    fn set_direction(&mut self, motor: u8, direction: Direction) -> Result<(), HatError>;
}

impl<D: MotorDriver + ?Sized> MotorDriver for Box<D> {
    fn set_speed(&mut self, motor: u8, speed: u8) -> Result<(), HatError> {
        (**self).set_speed(motor, speed)
    }

    fn set_direction(&mut self, motor: u8, direction: Direction) -> Result<(), HatError> {
        (**self).set_direction(motor, direction)
    }
}

/// Driver that accepts every command without touching hardware (dry runs)
#[derive(Debug, Default)]
pub struct NullDriver;

impl MotorDriver for NullDriver {
    fn set_speed(&mut self, motor: u8, speed: u8) -> Result<(), HatError> {
        debug!("[dry-run] motor {} speed={}", motor, speed);
        Ok(())
    }

    fn set_direction(&mut self, motor: u8, direction: Direction) -> Result<(), HatError> {
        debug!("[dry-run] motor {} direction={:?}", motor, direction);
        Ok(())
    }
}
