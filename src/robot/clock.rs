use std::time::Duration;

/// Blocking wait used by timed maneuvers and navigation pulses
pub trait Clock: Send {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadClock;

impl Clock for ThreadClock {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
