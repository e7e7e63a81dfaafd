// 50 Hz command loop with watchdog
// Commands arrive over zenoh; the latest command always wins. Timed maneuvers
// are stopped by a background task unless a newer command pre-empts them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{LOOP_HZ, TOPIC_CMD_DRIVE, TOPIC_HEALTH, TOPIC_STATE_DRIVE};
use crate::messages::{DriveCommand, NavigateArgs, RobotStatus, RuntimeHealth};
use crate::motor::MotorDriver;
use crate::motor::actuation::checked_speed;
use crate::robot::{Maneuver, Robot, RobotError, seconds};
use crate::sensor::DistanceSensor;

pub type DynRobot = Robot<Box<dyn MotorDriver>>;
pub type DynSensor = Box<dyn DistanceSensor + Send>;

/// A validated command, ready to apply
enum Action {
    Drive(Maneuver, i32, Option<Duration>),
    Navigate(NavigateArgs, Duration, Arc<Mutex<DynSensor>>),
    Stop,
}

/// A navigation run on the blocking pool
struct NavigationTask {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct Runtime {
    robot: Arc<Mutex<DynRobot>>,
    sensor: Option<Arc<Mutex<DynSensor>>>,
    // Bumped by every command; a timed stop only fires if it is unchanged
    epoch: Arc<AtomicU64>,
    navigation: Option<NavigationTask>,
    // Untimed maneuver in progress (the only motion the watchdog stops)
    continuous: bool,
    cmd_received_at: Option<Instant>,
    health: RuntimeHealth,
    watchdog: Option<Duration>,
}

impl Runtime {
    pub fn new(robot: DynRobot, sensor: Option<DynSensor>, watchdog: Option<Duration>) -> Self {
        Self {
            robot: Arc::new(Mutex::new(robot)),
            sensor: sensor.map(|s| Arc::new(Mutex::new(s))),
            epoch: Arc::new(AtomicU64::new(0)),
            navigation: None,
            continuous: false,
            cmd_received_at: None,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            watchdog,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Check a command without touching the robot or any pending work
    fn plan(&self, cmd: DriveCommand) -> Result<Action, RobotError> {
        if let Some((maneuver, speed, duration)) = cmd.motion()? {
            checked_speed(speed)?;
            return Ok(Action::Drive(maneuver, speed, duration));
        }

        match cmd {
            DriveCommand::Navigate(args) => {
                checked_speed(args.left_speed)?;
                checked_speed(args.right_speed)?;
                let duration = seconds(args.seconds)?;
                let Some(sensor) = self.sensor.clone() else {
                    return Err(RobotError::InvalidArgument(
                        "navigation needs a rangefinder".to_string(),
                    ));
                };
                Ok(Action::Navigate(args, duration, sensor))
            }
            _ => Ok(Action::Stop),
        }
    }

    /// Apply a command, pre-empting whatever is running. A rejected command
    /// leaves the current motion and any pending timed stop untouched.
    pub async fn on_command(&mut self, cmd: DriveCommand) -> Result<(), RobotError> {
        debug!("Received command: {:?}", &cmd);
        let action = self.plan(cmd)?;

        self.cmd_received_at = Some(Instant::now());
        self.health = RuntimeHealth::Ok;

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.finish_navigation(true).await;
        self.continuous = false;

        match action {
            Action::Drive(maneuver, speed, duration) => {
                self.robot.lock().await.drive(maneuver, speed, None)?;
                match duration {
                    Some(duration) => self.schedule_stop(duration, epoch),
                    None => self.continuous = true,
                }
                Ok(())
            }
            Action::Navigate(args, duration, sensor) => {
                self.start_navigation(args, duration, sensor);
                Ok(())
            }
            Action::Stop => self.robot.lock().await.stop(),
        }
    }

    /// Stop after `duration` unless another command arrives first
    fn schedule_stop(&self, duration: Duration, epoch: u64) {
        let robot = Arc::clone(&self.robot);
        let current = Arc::clone(&self.epoch);

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Compare under the lock so a command applied meanwhile is not undone
            let mut robot = robot.lock().await;
            if current.load(Ordering::SeqCst) != epoch {
                debug!("Timed maneuver pre-empted");
                return;
            }
            if let Err(e) = robot.stop() {
                warn!("Failed to stop after timed maneuver: {}", e);
            }
        });
    }

    fn start_navigation(
        &mut self,
        args: NavigateArgs,
        duration: Duration,
        sensor: Arc<Mutex<DynSensor>>,
    ) {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let robot = Arc::clone(&self.robot);

        let handle = tokio::task::spawn_blocking(move || {
            let mut robot = robot.blocking_lock();
            let mut sensor = sensor.blocking_lock();
            match robot.navigate_cancellable(
                args.left_speed,
                args.right_speed,
                duration,
                &mut **sensor,
                &flag,
            ) {
                Ok(report) => info!("Navigation report: {:?}", report),
                Err(e) => warn!("Navigation failed: {}", e),
            }
        });

        self.navigation = Some(NavigationTask { cancel, handle });
    }

    /// Wait for a running navigation to end, optionally cancelling it first
    async fn finish_navigation(&mut self, cancel: bool) {
        if let Some(task) = self.navigation.take() {
            if cancel {
                task.cancel.store(true, Ordering::Release);
            }
            if let Err(e) = task.handle.await {
                warn!("Navigation task failed: {}", e);
            }
        }
    }

    fn navigating(&self) -> bool {
        self.navigation
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Stop continuous motion when commands have gone stale
    pub async fn check_watchdog(&mut self) {
        let (Some(timeout), Some(received_at)) = (self.watchdog, self.cmd_received_at) else {
            return;
        };
        let cmd_age = received_at.elapsed();
        if cmd_age <= timeout {
            return;
        }

        if self.health != RuntimeHealth::CmdStale {
            warn!("Command stale ({:?} old)", cmd_age);
        }
        self.health = RuntimeHealth::CmdStale;

        if self.continuous {
            warn!("Watchdog stopping robot");
            self.continuous = false;
            self.epoch.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = self.robot.lock().await.stop() {
                warn!("Watchdog stop failed: {}", e);
            }
        }
    }

    /// Current status, or None while the robot is busy (e.g. mid-navigation)
    pub fn status(&self) -> Option<RobotStatus> {
        let robot = self.robot.try_lock().ok()?;
        Some(RobotStatus {
            motion: robot.state(),
            navigating: self.navigating(),
        })
    }

    /// Cancel background work and release the motors
    pub async fn shutdown(&mut self) -> Result<(), RobotError> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.finish_navigation(true).await;
        self.robot.lock().await.shutdown()
    }
}

/// SIGINT or SIGTERM, whichever comes first
#[cfg(unix)]
pub struct ShutdownSignal {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignal {
    /// Install the handlers now so a signal sent before the first `recv` is not lost
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next signal and return its name
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
pub struct ShutdownSignal;

#[cfg(not(unix))]
impl ShutdownSignal {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending().await
            }
        }
    }
}

type LoopResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Serve commands until a shutdown signal or an error, then release the motors
pub async fn run(mut runtime: Runtime) -> LoopResult {
    let result = serve(&mut runtime).await;
    close(&mut runtime, result).await
}

/// Shut the runtime down whatever ended the loop. A loop error takes
/// precedence over a failed exit stop.
async fn close(runtime: &mut Runtime, result: LoopResult) -> LoopResult {
    if let Err(e) = &result {
        warn!("Runtime loop failed: {}", e);
    }

    match runtime.shutdown().await {
        Ok(()) => result,
        Err(e) if result.is_ok() => Err(e.into()),
        Err(e) => {
            warn!("Shutdown stop failed: {}", e);
            result
        }
    }
}

async fn serve(runtime: &mut Runtime) -> LoopResult {
    let mut signals = ShutdownSignal::new()?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let pub_status = session.declare_publisher(TOPIC_STATE_DRIVE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, watchdog {:?}",
        LOOP_HZ, runtime.watchdog
    );
    info!("Subscribed to: {}", TOPIC_CMD_DRIVE);
    info!("Publishing to: {}, {}", TOPIC_STATE_DRIVE, TOPIC_HEALTH);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            name = signals.recv() => {
                info!("{} received, shutting down", name);
                return Ok(());
            }
        }

        // 1. Drain all pending commands (non-blocking), apply in order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => {
                    if let Err(e) = runtime.on_command(cmd).await {
                        warn!("Command rejected: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Watchdog
        runtime.check_watchdog().await;

        // 3. Publish status (skipped while navigation holds the robot)
        if let Some(status) = runtime.status() {
            pub_status.put(serde_json::to_string(&status)?).await?;
        }

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;
    }
}
