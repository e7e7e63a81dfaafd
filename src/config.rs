// Timeouts, topics, robot configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog (continuous motion only)
pub const CMD_TIMEOUT_MS: u64 = 500;
pub const CMD_TIMEOUT: Duration = Duration::from_millis(CMD_TIMEOUT_MS);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "hatbot/cmd/drive"; // commands
pub const TOPIC_STATE_DRIVE: &str = "hatbot/state/drive"; // robot status
pub const TOPIC_HEALTH: &str = "hatbot/state/health"; // health status

// Serial bridge to the motor HAT
pub const MOTOR_PORT: &str = "/dev/ttyUSB0";

// Navigation loop: fixed pulse length and stop distance
pub const NAV_PULSE: Duration = Duration::from_millis(250);
pub const NAV_STOP_DISTANCE: f64 = 50.0;

// Arc turn defaults
pub const TURN_DEFAULT_SPEED: i32 = 80;
pub const TURN_DEFAULT_SECONDS: f64 = 5.0;

/// Highest speed accepted by the HAT (8-bit PWM)
pub const MAX_SPEED: i32 = 255;

/// Default HAT bus address
pub const DEFAULT_ADDRESS: u8 = 0x60;

/// Errors raised while loading or validating a [`RobotConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Motor channel assignment on the HAT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorIds {
    pub left_front: u8,
    pub right_front: u8,
    pub left_rear: u8,
    pub right_rear: u8,
}

impl Default for MotorIds {
    fn default() -> Self {
        Self {
            left_front: 1,
            right_front: 2,
            left_rear: 3,
            right_rear: 4,
        }
    }
}

impl MotorIds {
    /// Returns ids as array [left_front, right_front, left_rear, right_rear]
    pub fn as_array(&self) -> [u8; 4] {
        [
            self.left_front,
            self.right_front,
            self.left_rear,
            self.right_rear,
        ]
    }
}

/// Immutable robot configuration, captured when the robot is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub address: u8,
    pub motors: MotorIds,
    pub left_trim: i32,
    pub right_trim: i32,
    pub stop_on_exit: bool,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            motors: MotorIds::default(),
            left_trim: 0,
            right_trim: 0,
            stop_on_exit: true,
        }
    }
}

impl RobotConfig {
    /// Load a config from a JSON file. Keys left out take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: RobotConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the bus address and motor channel assignment
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0x03..=0x77).contains(&self.address) {
            return Err(ConfigError::Invalid(format!(
                "bus address 0x{:02X} is outside 0x03..=0x77",
                self.address
            )));
        }

        let ids = self.motors.as_array();
        for (i, id) in ids.iter().enumerate() {
            if !(1..=4).contains(id) {
                return Err(ConfigError::Invalid(format!(
                    "motor id {} is not a HAT channel (1..=4)",
                    id
                )));
            }
            if ids[..i].contains(id) {
                return Err(ConfigError::Invalid(format!(
                    "motor id {} is assigned twice",
                    id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_timeout_units_agree() {
        assert_eq!(CMD_TIMEOUT.as_millis(), u128::from(CMD_TIMEOUT_MS));
        // Several loop ticks fit in one timeout
        assert!(CMD_TIMEOUT_MS >= 5 * (1000 / LOOP_HZ));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RobotConfig::default();
        assert_eq!(config.address, 0x60);
        assert_eq!(config.motors.as_array(), [1, 2, 3, 4]);
        assert_eq!((config.left_trim, config.right_trim), (0, 0));
        assert!(config.stop_on_exit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_motor_rejected() {
        let mut config = RobotConfig::default();
        config.motors.right_rear = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_address_rejected() {
        let config = RobotConfig {
            address: 0x80,
            ..RobotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: RobotConfig =
            serde_json::from_str(r#"{"left_trim": -5, "motors": {"left_front": 3, "left_rear": 1}}"#)
                .unwrap();
        assert_eq!(config.left_trim, -5);
        assert_eq!(config.right_trim, 0);
        assert_eq!(config.motors.as_array(), [3, 2, 1, 4]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("hatbot-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"address": 97, "stop_on_exit": false}"#).unwrap();
        let config = RobotConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.address, 0x61);
        assert!(!config.stop_on_exit);
    }
}
