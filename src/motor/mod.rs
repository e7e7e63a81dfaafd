// Motor control module for the four-motor skid-steer chassis
//
// Provides:
// - Motor driver abstraction and a dry-run driver
// - Serial bridge protocol for the DC motor HAT
// - Actuation layer (per-side trim, clamping, paired motors)

pub mod actuation;
mod driver;
pub mod hat;
#[cfg(test)]
pub(crate) mod mock;

pub use actuation::{Actuator, MotorSide, Side};
pub use driver::{Direction, MotorDriver, NullDriver};
pub use hat::{HatError, MotorHat};
