// Message types for the runtime

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{TURN_DEFAULT_SECONDS, TURN_DEFAULT_SPEED};
use crate::robot::{Maneuver, MotionState, RobotError, seconds};

fn default_turn_speed() -> i32 {
    TURN_DEFAULT_SPEED
}

fn default_turn_seconds() -> Option<f64> {
    Some(TURN_DEFAULT_SECONDS)
}

/// Speed plus optional run time for a named maneuver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveArgs {
    pub speed: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<f64>,
}

/// Arc turn arguments, defaulting to a 5 second turn at speed 80
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnArgs {
    #[serde(default = "default_turn_speed")]
    pub speed: i32,
    #[serde(default = "default_turn_seconds")]
    pub seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigateArgs {
    pub left_speed: i32,
    pub right_speed: i32,
    pub seconds: f64,
}

// Command from teleop/scripts -> runtime
// e.g. {"cmd":"forward","speed":120,"seconds":1.5} or {"cmd":"stop"}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DriveCommand {
    Forward(MoveArgs),
    Backward(MoveArgs),
    Left(MoveArgs),
    Right(MoveArgs),
    Turn(TurnArgs),
    Stop,
    Navigate(NavigateArgs),
}

impl DriveCommand {
    /// Shorthand for an untimed maneuver
    pub fn drive(maneuver: Maneuver, speed: i32) -> Self {
        let args = MoveArgs { speed, seconds: None };
        match maneuver {
            Maneuver::Forward => DriveCommand::Forward(args),
            Maneuver::Backward => DriveCommand::Backward(args),
            Maneuver::Left => DriveCommand::Left(args),
            Maneuver::Right => DriveCommand::Right(args),
            Maneuver::Turn => DriveCommand::Turn(TurnArgs { speed, seconds: None }),
        }
    }

    /// The maneuver, speed and optional duration, if this is a plain maneuver
    pub fn motion(&self) -> Result<Option<(Maneuver, i32, Option<Duration>)>, RobotError> {
        let (maneuver, speed, secs) = match self {
            DriveCommand::Forward(a) => (Maneuver::Forward, a.speed, a.seconds),
            DriveCommand::Backward(a) => (Maneuver::Backward, a.speed, a.seconds),
            DriveCommand::Left(a) => (Maneuver::Left, a.speed, a.seconds),
            DriveCommand::Right(a) => (Maneuver::Right, a.speed, a.seconds),
            DriveCommand::Turn(a) => (Maneuver::Turn, a.speed, a.seconds),
            DriveCommand::Stop | DriveCommand::Navigate(_) => return Ok(None),
        };
        let duration = secs.map(seconds).transpose()?;
        Ok(Some((maneuver, speed, duration)))
    }
}

/// Robot status published by runtime
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RobotStatus {
    #[serde(flatten)]
    pub motion: MotionState,
    pub navigating: bool,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}
