pub mod config;
pub mod messages;
pub mod motor;
pub mod robot;
pub mod runtime;
pub mod sensor;

pub use robot::{Robot, RobotError};
