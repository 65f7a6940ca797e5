//! Thread-based periodic task runner. Each task gets its own thread that
//! sleeps on a condvar-timed loop; shutdown is a broadcast flag, so stopping
//! the scheduler never waits out a full interval.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::Result;
use crate::store::TimeSeriesDb;

pub trait BackgroundTask: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    fn execute(&self) -> Result<()>;
}

#[derive(Default)]
struct Shutdown {
    flag: Mutex<bool>,
    signal: Condvar,
}

pub struct Scheduler {
    shutdown: Arc<Shutdown>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(Shutdown::default()),
            handles: Vec::new(),
        }
    }

    /// Starts the task on its own thread. Task errors are logged, never
    /// fatal; the next tick runs regardless.
    pub fn spawn(&mut self, task: Arc<dyn BackgroundTask>) {
        let shutdown = self.shutdown.clone();
        let handle = std::thread::spawn(move || {
            info!(task = task.name(), "background task started");
            loop {
                let mut stopped = shutdown.flag.lock().unwrap();
                let interval = task.interval();
                while !*stopped {
                    let (guard, timeout) =
                        shutdown.signal.wait_timeout(stopped, interval).unwrap();
                    stopped = guard;
                    if timeout.timed_out() {
                        break;
                    }
                }
                if *stopped {
                    info!(task = task.name(), "background task stopped");
                    return;
                }
                drop(stopped);

                if let Err(err) = task.execute() {
                    error!(task = task.name(), %err, "background task failed");
                }
            }
        });
        self.handles.push(handle);
    }

    /// Signals every task thread and joins them.
    pub fn stop(&mut self) {
        *self.shutdown.flag.lock().unwrap() = true;
        self.shutdown.signal.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Rotates the store's open day on a fixed interval; wire it up when
/// `DbConfig::rotation_interval` is set.
pub struct RotationTask {
    db: Arc<TimeSeriesDb>,
    interval: Duration,
}

impl RotationTask {
    pub fn new(db: Arc<TimeSeriesDb>, interval: Duration) -> Self {
        Self { db, interval }
    }
}

impl BackgroundTask for RotationTask {
    fn name(&self) -> &str {
        "rotation"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn execute(&self) -> Result<()> {
        let day = self.db.new_day()?;
        debug!(day, "scheduled rotation");
        Ok(())
    }
}
