// Distance-gated navigation: short pivot pulses with a range check between them
//
// The pulse count is fixed up front as ceil(duration / NAV_PULSE). Every exit
// from the loop releases the motors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{MotionState, Robot, RobotError};
use crate::config::{NAV_PULSE, NAV_STOP_DISTANCE};
use crate::motor::actuation::checked_speed;
use crate::motor::{Direction, MotorDriver};
use crate::sensor::DistanceSensor;

/// Why the navigation loop ended
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "exit", rename_all = "snake_case")]
pub enum NavigationExit {
    /// Every planned pulse ran
    Completed,
    /// A reading fell below the stop distance
    Obstacle { distance: f64 },
    /// The sensor failed or returned a non-finite value
    SensorFault,
    /// Cancelled from outside between pulses
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NavigationReport {
    pub planned: u32,
    pub pulses: u32,
    pub exit: NavigationExit,
}

/// Loop bookkeeping, alive only for one navigation run
#[derive(Debug, Clone)]
pub struct NavigationState {
    pub planned: u32,
    pub pulses: u32,
    pub pulse: Duration,
    pub left_speed: u8,
    pub right_speed: u8,
    pub exit: Option<NavigationExit>,
}

impl NavigationState {
    pub fn new(left_speed: u8, right_speed: u8, duration: Duration) -> Self {
        Self {
            planned: planned_pulses(duration, NAV_PULSE),
            pulses: 0,
            pulse: NAV_PULSE,
            left_speed,
            right_speed,
            exit: None,
        }
    }

    fn report(&self) -> NavigationReport {
        NavigationReport {
            planned: self.planned,
            pulses: self.pulses,
            exit: self.exit.unwrap_or(NavigationExit::Completed),
        }
    }
}

/// ceil(duration / pulse), computed in whole nanoseconds
pub fn planned_pulses(duration: Duration, pulse: Duration) -> u32 {
    let pulse = pulse.as_nanos().max(1);
    u32::try_from(duration.as_nanos().div_ceil(pulse)).unwrap_or(u32::MAX)
}

impl<D: MotorDriver> Robot<D> {
    /// Pulse left side forward and right side backward for up to `duration`,
    /// stopping early once the sensor reads below the stop distance
    pub fn navigate(
        &mut self,
        left_speed: i32,
        right_speed: i32,
        duration: Duration,
        sensor: &mut dyn DistanceSensor,
    ) -> Result<NavigationReport, RobotError> {
        self.navigate_cancellable(left_speed, right_speed, duration, sensor, &AtomicBool::new(false))
    }

    /// As [`Robot::navigate`], also checking `cancel` before each pulse
    pub fn navigate_cancellable(
        &mut self,
        left_speed: i32,
        right_speed: i32,
        duration: Duration,
        sensor: &mut dyn DistanceSensor,
        cancel: &AtomicBool,
    ) -> Result<NavigationReport, RobotError> {
        let left_speed = checked_speed(left_speed)?;
        let right_speed = checked_speed(right_speed)?;
        let mut nav = NavigationState::new(left_speed, right_speed, duration);

        info!(
            "Navigate: left={} right={} for {:?} ({} pulses)",
            left_speed, right_speed, duration, nav.planned
        );

        let result = self.run_pulses(&mut nav, sensor, cancel);
        let stopped = self.stop();

        match result {
            Ok(()) => {
                stopped?;
                let report = nav.report();
                info!("Navigation ended after {}/{} pulses: {:?}", report.pulses, report.planned, report.exit);
                Ok(report)
            }
            Err(e) => {
                if let Err(stop_err) = stopped {
                    warn!("Failed to release motors after navigation fault: {}", stop_err);
                }
                Err(e)
            }
        }
    }

    fn run_pulses(
        &mut self,
        nav: &mut NavigationState,
        sensor: &mut dyn DistanceSensor,
        cancel: &AtomicBool,
    ) -> Result<(), RobotError> {
        while nav.pulses < nav.planned {
            if cancel.load(Ordering::Acquire) {
                nav.exit = Some(NavigationExit::Cancelled);
                return Ok(());
            }

            self.apply(nav.left_speed, nav.right_speed, Direction::Forward, Direction::Backward)?;
            self.state = MotionState::Navigating {
                left_speed: nav.left_speed,
                right_speed: nav.right_speed,
            };
            nav.pulses += 1;
            self.clock.sleep(nav.pulse);

            match sensor.read_distance() {
                Ok(distance) if !distance.is_finite() => {
                    warn!("Rangefinder returned {}, stopping", distance);
                    nav.exit = Some(NavigationExit::SensorFault);
                    return Ok(());
                }
                Ok(distance) if distance < NAV_STOP_DISTANCE => {
                    info!("Obstacle at {} after pulse {}", distance, nav.pulses);
                    nav.exit = Some(NavigationExit::Obstacle { distance });
                    return Ok(());
                }
                Ok(distance) => debug!("Pulse {}/{}: distance {}", nav.pulses, nav.planned, distance),
                Err(e) => {
                    warn!("Rangefinder failed ({}), stopping", e);
                    nav.exit = Some(NavigationExit::SensorFault);
                    return Ok(());
                }
            }
        }

        nav.exit = Some(NavigationExit::Completed);
        Ok(())
    }
}
