//! Time sources and wall-clock change detection.
//!
//! Module timestamps are wall-clock times, timers run on the monotonic clock.
//! When somebody changes the system time, [`ClockWatcher`] notices the gap
//! between the two and reports the offset so the supervisor can shift its
//! timestamps instead of declaring every module stale.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::models::constants::{
    CLOCK_JUMP_DEBOUNCE_MS, CLOCK_JUMP_THRESHOLD_MS, CLOCK_SAMPLE_INTERVAL_MS,
};
use crate::supervisor::Event;

/// Source of wall-clock and monotonic time.
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
    fn monotonic(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug)]
struct ManualTime {
    wall: DateTime<Utc>,
    monotonic: Instant,
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<ManualTime>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(ManualTime {
                wall: start,
                monotonic: Instant::now(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualTime> {
        self.time.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Let time pass: both clocks move forward.
    pub fn advance(&self, by: Duration) {
        let mut time = self.lock();
        time.monotonic += by;
        time.wall += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
    }

    /// Change the wall clock only, like an operator setting the system time.
    pub fn set_wall(&self, wall: DateTime<Utc>) {
        self.lock().wall = wall;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().wall
    }

    fn monotonic(&self) -> Instant {
        self.lock().monotonic
    }
}

/// Compares consecutive wall/monotonic samples and reports discontinuities.
#[derive(Debug)]
pub struct JumpDetector {
    last_wall: DateTime<Utc>,
    last_monotonic: Instant,
    last_reported: Option<Instant>,
}

impl JumpDetector {
    pub fn new(wall: DateTime<Utc>, monotonic: Instant) -> Self {
        Self {
            last_wall: wall,
            last_monotonic: monotonic,
            last_reported: None,
        }
    }

    /// Feed a sample. Returns the wall-clock offset in milliseconds when the
    /// clock jumped, unless a jump was already reported within the debounce window.
    pub fn sample(&mut self, wall: DateTime<Utc>, monotonic: Instant) -> Option<i64> {
        let elapsed = monotonic.saturating_duration_since(self.last_monotonic);
        let expected =
            self.last_wall + chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::MAX);
        let offset_ms = (wall - expected).num_milliseconds();

        self.last_wall = wall;
        self.last_monotonic = monotonic;

        if offset_ms.abs() < CLOCK_JUMP_THRESHOLD_MS {
            return None;
        }

        if let Some(previous) = self.last_reported {
            if monotonic.saturating_duration_since(previous)
                < Duration::from_millis(CLOCK_JUMP_DEBOUNCE_MS)
            {
                tracing::debug!("Clock change of {offset_ms} ms suppressed");
                return None;
            }
        }

        self.last_reported = Some(monotonic);
        Some(offset_ms)
    }
}

/// Background thread sampling the system clock.
///
/// Stops and joins on drop.
pub struct ClockWatcher {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ClockWatcher {
    pub fn start(events: Sender<Event>) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("clock-watcher".to_string())
            .spawn(move || {
                let interval = Duration::from_millis(CLOCK_SAMPLE_INTERVAL_MS);
                let mut detector = JumpDetector::new(Utc::now(), Instant::now());
                while !flag.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    if let Some(offset_ms) = detector.sample(Utc::now(), Instant::now()) {
                        if events.send(Event::ClockJump { offset_ms }).is_err() {
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }
}

impl Drop for ClockWatcher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
