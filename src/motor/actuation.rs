// Actuation layer: the only place that addresses the four motors
//
// Front and rear motors on a side always receive the same direction and the
// same trimmed speed. Trim is added before clamping to 0..=255.

use serde::Serialize;
use tracing::debug;

use super::driver::{Direction, MotorDriver};
use super::hat::HatError;
use crate::config::{MAX_SPEED, RobotConfig};
use crate::robot::RobotError;

/// Left or right pair of motors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Front/rear motor pair sharing one trim offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorSide {
    pub front: u8,
    pub rear: u8,
    pub trim: i32,
}

impl MotorSide {
    pub fn new(front: u8, rear: u8, trim: i32) -> Self {
        Self { front, rear, trim }
    }

    /// Speed actually sent to hardware for a requested speed
    pub fn trimmed(&self, speed: u8) -> u8 {
        (speed as i32 + self.trim).clamp(0, MAX_SPEED) as u8
    }
}

/// Check a requested speed before any hardware is touched
pub fn checked_speed(speed: i32) -> Result<u8, RobotError> {
    if (0..=MAX_SPEED).contains(&speed) {
        Ok(speed as u8)
    } else {
        Err(RobotError::InvalidArgument(format!(
            "speed {} must be between 0 and {} inclusive",
            speed, MAX_SPEED
        )))
    }
}

/// Owns the motor driver and both motor sides
pub struct Actuator<D> {
    driver: D,
    left: MotorSide,
    right: MotorSide,
}

impl<D: MotorDriver> Actuator<D> {
    pub fn new(driver: D, config: &RobotConfig) -> Self {
        let ids = &config.motors;
        Self {
            driver,
            left: MotorSide::new(ids.left_front, ids.left_rear, config.left_trim),
            right: MotorSide::new(ids.right_front, ids.right_rear, config.right_trim),
        }
    }

    pub fn side(&self, side: Side) -> &MotorSide {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Set the left pair's speed; returns the trimmed speed sent
    pub fn set_left_speed(&mut self, speed: i32) -> Result<u8, RobotError> {
        self.set_speed(Side::Left, speed)
    }

    /// Set the right pair's speed; returns the trimmed speed sent
    pub fn set_right_speed(&mut self, speed: i32) -> Result<u8, RobotError> {
        self.set_speed(Side::Right, speed)
    }

    pub fn set_speed(&mut self, side: Side, speed: i32) -> Result<u8, RobotError> {
        let speed = checked_speed(speed)?;
        let pair = *self.side(side);
        let effective = pair.trimmed(speed);
        debug!("{:?} speed {} -> {} (trim {})", side, speed, effective, pair.trim);

        self.driver.set_speed(pair.front, effective)?;
        self.driver.set_speed(pair.rear, effective)?;
        Ok(effective)
    }

    /// Point both motors of a side the same way, front then rear
    pub fn set_direction(&mut self, side: Side, direction: Direction) -> Result<(), HatError> {
        let pair = *self.side(side);
        self.driver.set_direction(pair.front, direction)?;
        self.driver.set_direction(pair.rear, direction)
    }

    /// Release all four motors. Every motor is attempted even if one fails;
    /// the first failure is returned.
    pub fn stop_all(&mut self) -> Result<(), HatError> {
        let motors = [self.left.front, self.right.front, self.left.rear, self.right.rear];
        let mut first_err = None;
        for motor in motors {
            if let Err(e) = self.driver.set_direction(motor, Direction::Release) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
