// Motion control core for the four-motor chassis
//
// Maneuvers set both sides' speeds, then both sides' directions. A timed
// maneuver blocks for its duration and then releases every motor.

mod clock;
mod maneuver;
mod navigation;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::RobotConfig;
use crate::motor::actuation::checked_speed;
use crate::motor::{Actuator, Direction, HatError, MotorDriver, Side};

pub use clock::{Clock, ThreadClock};
pub use maneuver::{Maneuver, MotionState};
pub use navigation::{NavigationExit, NavigationReport, NavigationState};

#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HatError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Convert a (possibly fractional) number of seconds into a duration
pub fn seconds(secs: f64) -> Result<Duration, RobotError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| RobotError::InvalidArgument(format!("{} is not a valid duration in seconds", secs)))
}

pub struct Robot<D: MotorDriver> {
    actuator: Actuator<D>,
    config: RobotConfig,
    clock: Box<dyn Clock>,
    state: MotionState,
    // Set while the stop-on-exit release is still owed
    exit_stop_pending: bool,
}

impl<D: MotorDriver> Robot<D> {
    /// Build a robot around `driver`. All motors start released.
    pub fn new(driver: D, config: RobotConfig) -> Result<Self, RobotError> {
        config.validate()?;
        let mut actuator = Actuator::new(driver, &config);
        actuator.stop_all()?;

        debug!(
            "Robot ready: motors {:?}, trim left={} right={}",
            config.motors.as_array(),
            config.left_trim,
            config.right_trim
        );

        Ok(Self {
            actuator,
            exit_stop_pending: config.stop_on_exit,
            config,
            clock: Box::new(ThreadClock),
            state: MotionState::Idle,
        })
    }

    /// Replace the clock used for blocking waits
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn actuator(&self) -> &Actuator<D> {
        &self.actuator
    }

    pub fn forward(&mut self, speed: i32, duration: Option<Duration>) -> Result<(), RobotError> {
        self.drive(Maneuver::Forward, speed, duration)
    }

    pub fn backward(&mut self, speed: i32, duration: Option<Duration>) -> Result<(), RobotError> {
        self.drive(Maneuver::Backward, speed, duration)
    }

    pub fn left(&mut self, speed: i32, duration: Option<Duration>) -> Result<(), RobotError> {
        self.drive(Maneuver::Left, speed, duration)
    }

    pub fn right(&mut self, speed: i32, duration: Option<Duration>) -> Result<(), RobotError> {
        self.drive(Maneuver::Right, speed, duration)
    }

    pub fn turn(&mut self, speed: i32, duration: Option<Duration>) -> Result<(), RobotError> {
        self.drive(Maneuver::Turn, speed, duration)
    }

    /// Run `maneuver` at `speed`. With a duration, block for it and then stop;
    /// without one, return with the robot still moving.
    pub fn drive(
        &mut self,
        maneuver: Maneuver,
        speed: i32,
        duration: Option<Duration>,
    ) -> Result<(), RobotError> {
        let speed = checked_speed(speed)?;
        let (left_speed, right_speed) = maneuver.speeds(speed);
        let (left_dir, right_dir) = maneuver.directions();

        info!("{}: speed={} duration={:?}", maneuver, speed, duration);
        self.apply(left_speed, right_speed, left_dir, right_dir)?;
        self.state = MotionState::Moving {
            maneuver,
            left_speed,
            right_speed,
        };

        if let Some(duration) = duration {
            self.clock.sleep(duration);
            self.stop()?;
        }
        Ok(())
    }

    /// Release all motors. Safe to call at any time, any number of times.
    pub fn stop(&mut self) -> Result<(), RobotError> {
        debug!("Stopping all motors");
        self.actuator.stop_all()?;
        self.state = MotionState::Stopped;
        Ok(())
    }

    /// Perform the stop-on-exit release now instead of at drop.
    /// Does nothing if stop-on-exit is disabled or the release already ran.
    pub fn shutdown(&mut self) -> Result<(), RobotError> {
        if !std::mem::take(&mut self.exit_stop_pending) {
            return Ok(());
        }
        info!("Releasing motors on exit");
        self.stop()
    }

    /// Command speeds then directions; on a hardware fault, try to release
    /// everything before reporting the error
    fn apply(
        &mut self,
        left_speed: u8,
        right_speed: u8,
        left_dir: Direction,
        right_dir: Direction,
    ) -> Result<(), RobotError> {
        let result = self.actuate(left_speed, right_speed, left_dir, right_dir);
        if let Err(e) = &result {
            warn!("Motor command failed ({}), releasing motors", e);
            if let Err(stop_err) = self.actuator.stop_all() {
                warn!("Failed to release motors: {}", stop_err);
            }
            self.state = MotionState::Stopped;
        }
        result
    }

    fn actuate(
        &mut self,
        left_speed: u8,
        right_speed: u8,
        left_dir: Direction,
        right_dir: Direction,
    ) -> Result<(), RobotError> {
        self.actuator.set_speed(Side::Left, left_speed.into())?;
        self.actuator.set_speed(Side::Right, right_speed.into())?;
        self.actuator.set_direction(Side::Left, left_dir)?;
        self.actuator.set_direction(Side::Right, right_dir)?;
        Ok(())
    }
}

impl<D: MotorDriver> Drop for Robot<D> {
    fn drop(&mut self) {
        if std::mem::take(&mut self.exit_stop_pending) {
            if let Err(e) = self.actuator.stop_all() {
                warn!("Failed to stop motors on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::motor::mock::{MotorCall, RecordingDriver};

    /// Records requested sleeps instead of sleeping
    #[derive(Clone, Default)]
    pub(crate) struct RecordingClock(pub Arc<Mutex<Vec<Duration>>>);

    impl Clock for RecordingClock {
        fn sleep(&mut self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    pub(crate) fn robot_with(config: RobotConfig) -> (Robot<RecordingDriver>, RecordingDriver, RecordingClock) {
        let driver = RecordingDriver::new();
        let clock = RecordingClock::default();
        let robot = Robot::new(driver.clone(), config).unwrap().with_clock(clock.clone());
        driver.clear();
        (robot, driver, clock)
    }

    fn robot() -> (Robot<RecordingDriver>, RecordingDriver, RecordingClock) {
        robot_with(RobotConfig::default())
    }

    fn directions(driver: &RecordingDriver) -> [Option<Direction>; 4] {
        [1, 2, 3, 4].map(|m| driver.direction_of(m))
    }

    #[test]
    fn test_new_releases_all_motors() {
        let driver = RecordingDriver::new();
        let _robot = Robot::new(driver.clone(), RobotConfig::default()).unwrap();
        assert_eq!(driver.releases(), 4);
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let mut config = RobotConfig::default();
        config.motors.left_rear = 1;
        let driver = RecordingDriver::new();
        assert!(matches!(
            Robot::new(driver.clone(), config),
            Err(RobotError::Config(_))
        ));
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_forward_sets_speeds_then_directions() {
        let (mut robot, driver, _) = robot();
        robot.forward(150, None).unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                MotorCall::Speed(1, 150),
                MotorCall::Speed(3, 150),
                MotorCall::Speed(2, 150),
                MotorCall::Speed(4, 150),
                MotorCall::Direction(1, Direction::Forward),
                MotorCall::Direction(3, Direction::Forward),
                MotorCall::Direction(2, Direction::Forward),
                MotorCall::Direction(4, Direction::Forward),
            ]
        );
        assert!(robot.state().is_moving());
    }

    #[test]
    fn test_maneuver_table() {
        use Direction::{Backward as B, Forward as F};
        let (mut robot, driver, _) = robot();
        let cases = [
            (Maneuver::Forward, [F, F, F, F]),
            (Maneuver::Backward, [B, B, B, B]),
            (Maneuver::Left, [B, F, B, F]),
            (Maneuver::Right, [F, B, F, B]),
            (Maneuver::Turn, [F, F, F, F]),
        ];
        for (maneuver, expected) in cases {
            robot.drive(maneuver, 100, None).unwrap();
            assert_eq!(directions(&driver), expected.map(Some), "{}", maneuver);
        }
    }

    #[test]
    fn test_turn_right_side_gets_tenth() {
        let (mut robot, driver, _) = robot();
        robot.turn(99, None).unwrap();
        assert_eq!(driver.speed_of(1), Some(99));
        assert_eq!(driver.speed_of(2), Some(9));
        assert_eq!(driver.speed_of(4), Some(9));
    }

    #[test]
    fn test_trim_applied_inside_actuation() {
        let (mut robot, driver, _) = robot_with(RobotConfig {
            left_trim: 20,
            right_trim: -15,
            ..RobotConfig::default()
        });
        robot.forward(250, None).unwrap();
        assert_eq!(driver.speed_of(1), Some(255));
        assert_eq!(driver.speed_of(3), Some(255));
        assert_eq!(driver.speed_of(2), Some(235));
        assert_eq!(driver.speed_of(4), Some(235));

        robot.turn(100, None).unwrap();
        // 100 / 10 = 10, minus trim 15, clamped at 0
        assert_eq!(driver.speed_of(2), Some(0));
    }

    #[test]
    fn test_invalid_speed_touches_nothing() {
        let (mut robot, driver, clock) = robot();
        for speed in [-1, 256] {
            let err = robot.forward(speed, Some(Duration::from_secs(1))).unwrap_err();
            assert!(matches!(err, RobotError::InvalidArgument(_)));
        }
        assert!(driver.calls().is_empty());
        assert!(clock.0.lock().unwrap().is_empty());
        assert_eq!(robot.state(), MotionState::Idle);
    }

    #[test]
    fn test_forward_then_stop_releases_everything() {
        let (mut robot, driver, _) = robot();
        robot.forward(200, None).unwrap();
        robot.stop().unwrap();
        assert_eq!(directions(&driver), [Some(Direction::Release); 4]);
        assert_eq!(robot.state(), MotionState::Stopped);
    }

    #[test]
    fn test_timed_maneuver_waits_then_stops() {
        let (mut robot, driver, clock) = robot();
        robot.backward(80, Some(Duration::from_millis(1500))).unwrap();
        assert_eq!(*clock.0.lock().unwrap(), vec![Duration::from_millis(1500)]);
        assert_eq!(driver.releases(), 4);
        assert_eq!(directions(&driver), [Some(Direction::Release); 4]);
    }

    #[test]
    fn test_untimed_maneuver_keeps_moving() {
        let (mut robot, driver, clock) = robot();
        robot.right(60, None).unwrap();
        assert!(clock.0.lock().unwrap().is_empty());
        assert_eq!(driver.releases(), 0);
    }

    #[test]
    fn test_last_maneuver_wins() {
        let (mut robot, driver, _) = robot();
        robot.left(90, None).unwrap();
        robot.right(90, None).unwrap();
        assert_eq!(
            directions(&driver),
            [
                Some(Direction::Forward),
                Some(Direction::Backward),
                Some(Direction::Forward),
                Some(Direction::Backward),
            ]
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut robot, driver, _) = robot();
        robot.stop().unwrap();
        robot.stop().unwrap();
        assert_eq!(driver.releases(), 8);
    }

    #[test]
    fn test_hardware_fault_releases_then_propagates() {
        let (mut robot, driver, clock) = robot();
        // Both speeds go through, the first direction write fails
        driver.fail_after(4);
        let err = robot.forward(100, Some(Duration::from_secs(2))).unwrap_err();
        assert!(matches!(err, RobotError::Hardware(HatError::Timeout { .. })));
        assert!(clock.0.lock().unwrap().is_empty());
        assert_eq!(robot.state(), MotionState::Stopped);

        driver.heal();
        robot.stop().unwrap();
    }

    #[test]
    fn test_drop_stops_once_when_enabled() {
        let (mut robot, driver, _) = robot();
        robot.forward(100, None).unwrap();
        drop(robot);
        assert_eq!(driver.releases(), 4);
        assert_eq!(directions(&driver), [Some(Direction::Release); 4]);
    }

    #[test]
    fn test_shutdown_then_drop_stops_exactly_once() {
        let (mut robot, driver, _) = robot();
        robot.forward(100, None).unwrap();
        robot.shutdown().unwrap();
        robot.shutdown().unwrap();
        drop(robot);
        assert_eq!(driver.releases(), 4);
    }

    #[test]
    fn test_drop_leaves_motors_when_disabled() {
        let (mut robot, driver, _) = robot_with(RobotConfig {
            stop_on_exit: false,
            ..RobotConfig::default()
        });
        robot.forward(100, None).unwrap();
        drop(robot);
        assert_eq!(driver.releases(), 0);
    }

    #[test]
    fn test_seconds_conversion() {
        assert_eq!(seconds(0.25).unwrap(), Duration::from_millis(250));
        assert!(matches!(seconds(-1.0), Err(RobotError::InvalidArgument(_))));
        assert!(seconds(f64::NAN).is_err());
    }
}
