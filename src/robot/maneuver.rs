// Named maneuvers and the direction/speed pattern each one commands
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::motor::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Maneuver {
    Forward,
    Backward,
    /// Pivot in place, counter-clockwise
    Left,
    /// Pivot in place, clockwise
    Right,
    /// Forward arc, right side at a tenth of the speed
    Turn,
}

impl Maneuver {
    /// (left, right) directions
    pub fn directions(self) -> (Direction, Direction) {
        use Direction::{Backward, Forward};
        match self {
            Maneuver::Forward => (Forward, Forward),
            Maneuver::Backward => (Backward, Backward),
            Maneuver::Left => (Backward, Forward),
            Maneuver::Right => (Forward, Backward),
            Maneuver::Turn => (Forward, Forward),
        }
    }

    /// (left, right) speeds before trim
    pub fn speeds(self, speed: u8) -> (u8, u8) {
        match self {
            Maneuver::Turn => (speed, speed / 10),
            _ => (speed, speed),
        }
    }
}

impl fmt::Display for Maneuver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Maneuver::Forward => "forward",
            Maneuver::Backward => "backward",
            Maneuver::Left => "pivot left",
            Maneuver::Right => "pivot right",
            Maneuver::Turn => "arc turn",
        };
        f.write_str(name)
    }
}

/// What the robot was last told to do. Idle and Stopped both mean no motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MotionState {
    Idle,
    Moving {
        maneuver: Maneuver,
        left_speed: u8,
        right_speed: u8,
    },
    Navigating {
        left_speed: u8,
        right_speed: u8,
    },
    Stopped,
}

impl MotionState {
    pub fn is_moving(&self) -> bool {
        matches!(self, MotionState::Moving { .. } | MotionState::Navigating { .. })
    }
}
