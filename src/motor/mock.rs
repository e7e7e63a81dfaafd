// Recording driver for unit tests

use std::sync::{Arc, Mutex};

use super::driver::{Direction, MotorDriver};
use super::hat::HatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCall {
    Speed(u8, u8),
    Direction(u8, Direction),
}

/// Records every command; can be told to fail after a number of calls
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    calls: Arc<Mutex<Vec<MotorCall>>>,
    fail_after: Arc<Mutex<Option<usize>>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<MotorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Fail every command once `n` more have succeeded
    pub fn fail_after(&self, n: usize) {
        let done = self.calls.lock().unwrap().len();
        *self.fail_after.lock().unwrap() = Some(done + n);
    }

    pub fn heal(&self) {
        *self.fail_after.lock().unwrap() = None;
    }

    /// Last direction written to `motor`
    pub fn direction_of(&self, motor: u8) -> Option<Direction> {
        self.calls().iter().rev().find_map(|call| match *call {
            MotorCall::Direction(m, d) if m == motor => Some(d),
            _ => None,
        })
    }

    /// Last speed written to `motor`
    pub fn speed_of(&self, motor: u8) -> Option<u8> {
        self.calls().iter().rev().find_map(|call| match *call {
            MotorCall::Speed(m, s) if m == motor => Some(s),
            _ => None,
        })
    }

    /// Number of release commands seen
    pub fn releases(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MotorCall::Direction(_, Direction::Release)))
            .count()
    }

    fn record(&mut self, call: MotorCall) -> Result<(), HatError> {
        let mut calls = self.calls.lock().unwrap();
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            if calls.len() >= limit {
                return Err(HatError::Timeout { address: 0x60 });
            }
        }
        calls.push(call);
        Ok(())
    }
}

impl MotorDriver for RecordingDriver {
    fn set_speed(&mut self, motor: u8, speed: u8) -> Result<(), HatError> {
        self.record(MotorCall::Speed(motor, speed))
    }

    fn set_direction(&mut self, motor: u8, direction: Direction) -> Result<(), HatError> {
        self.record(MotorCall::Direction(motor, direction))
    }
}
