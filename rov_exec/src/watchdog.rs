//! # Connection watchdog
//!
//! Background thread which forces an emergency stop if the control loop stops
//! acknowledging position updates. The loop calls [`ConnectionWatchdog::ping`]
//! after every cycle in which a position was accepted, the watchdog thread
//! checks the time since the last ping at its own cadence.
//!
//! Once triggered the watchdog invokes its callback exactly once and stops,
//! it does not resume monitoring on its own.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct ConnectionWatchdog {
    timeout: Duration,
    check_period: Duration,
    shared: Arc<Shared>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// State shared between the pinging thread and the watchdog thread.
struct Shared {
    last_ping: Mutex<Instant>,
    running: AtomicBool,
    triggered: AtomicBool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("The watchdog is already running")]
    AlreadyRunning,

    #[error("Could not spawn the watchdog thread: {0}")]
    SpawnFailed(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Shared {
    fn elapsed(&self) -> Duration {
        let last_ping = match self.last_ping.lock() {
            Ok(g) => *g,
            Err(p) => *p.into_inner(),
        };

        last_ping.elapsed()
    }

    fn reset(&self) {
        match self.last_ping.lock() {
            Ok(mut g) => *g = Instant::now(),
            Err(p) => *p.into_inner() = Instant::now(),
        }
    }
}

impl ConnectionWatchdog {
    /// Create a new, stopped, watchdog.
    pub fn new(timeout: Duration, check_period: Duration) -> Self {
        Self {
            timeout,
            check_period,
            shared: Arc::new(Shared {
                last_ping: Mutex::new(Instant::now()),
                running: AtomicBool::new(false),
                triggered: AtomicBool::new(false),
            }),
            stop_tx: None,
            handle: None,
        }
    }

    /// Start monitoring.
    ///
    /// The callback is run on the watchdog thread with the trigger reason.
    /// It must not block for long.
    pub fn start<F>(&mut self, on_timeout: F) -> Result<(), WatchdogError>
    where
        F: FnOnce(String) + Send + 'static,
    {
        if self.is_running() {
            return Err(WatchdogError::AlreadyRunning);
        }

        // Reap a previous thread which stopped after triggering
        if let Some(h) = self.handle.take() {
            h.join().ok();
        }

        self.shared.reset();
        self.shared.triggered.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = self.shared.clone();
        let timeout = self.timeout;
        let check_period = self.check_period;

        let handle = thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(check_period) {
                        Err(RecvTimeoutError::Timeout) => (),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let elapsed = shared.elapsed();

                    if elapsed > timeout {
                        let reason =
                            format!("GPS connection timeout ({:.1}s)", elapsed.as_secs_f64());
                        error!("Connection watchdog triggered: {}", reason);

                        shared.triggered.store(true, Ordering::SeqCst);
                        on_timeout(reason);
                        break;
                    }
                }

                shared.running.store(false, Ordering::SeqCst);
                debug!("Watchdog thread exited");
            });

        match handle {
            Ok(h) => {
                self.handle = Some(h);
                self.stop_tx = Some(stop_tx);
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(WatchdogError::SpawnFailed(e));
            }
        }

        info!(
            "Connection watchdog started ({:.1} s timeout, checked every {:.1} s)",
            self.timeout.as_secs_f64(),
            self.check_period.as_secs_f64()
        );

        Ok(())
    }

    /// Stop monitoring and join the watchdog thread.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            tx.send(()).ok();
        }

        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                error!("Watchdog thread panicked");
            }
            info!("Connection watchdog stopped");
        }

        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Acknowledge that the connection is alive.
    pub fn ping(&self) {
        self.shared.reset();
    }

    /// True if the last ping is within the timeout.
    pub fn is_safe(&self) -> bool {
        self.shared.elapsed() <= self.timeout
    }

    pub fn time_since_last_ping(&self) -> Duration {
        self.shared.elapsed()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn has_triggered(&self) -> bool {
        self.shared.triggered.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for ConnectionWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fires_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let reason = Arc::new(Mutex::new(String::new()));

        let mut wd = ConnectionWatchdog::new(Duration::from_millis(100), Duration::from_millis(10));

        let c = count.clone();
        let r = reason.clone();
        wd.start(move |msg| {
            c.fetch_add(1, Ordering::SeqCst);
            *r.lock().unwrap() = msg;
        })
        .unwrap();

        thread::sleep(Duration::from_millis(500));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(wd.has_triggered());
        assert!(!wd.is_running());
        assert!(!wd.is_safe());
        assert!(reason.lock().unwrap().starts_with("GPS connection timeout ("));

        wd.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_silent_while_pinged() {
        let count = Arc::new(AtomicUsize::new(0));

        let mut wd = ConnectionWatchdog::new(Duration::from_millis(200), Duration::from_millis(10));

        let c = count.clone();
        wd.start(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..30 {
            thread::sleep(Duration::from_millis(20));
            wd.ping();
        }

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(wd.is_running());
        assert!(wd.is_safe());

        wd.stop();
        assert!(!wd.is_running());
        assert!(!wd.has_triggered());
    }

    #[test]
    fn test_ping_resets_clock() {
        let wd = ConnectionWatchdog::new(Duration::from_secs(10), Duration::from_secs(1));

        thread::sleep(Duration::from_millis(50));
        assert!(wd.time_since_last_ping() >= Duration::from_millis(50));

        wd.ping();
        assert!(wd.time_since_last_ping() < Duration::from_millis(50));
    }

    #[test]
    fn test_stop_is_prompt() {
        let mut wd = ConnectionWatchdog::new(Duration::from_secs(30), Duration::from_secs(5));
        wd.start(|_| ()).unwrap();
        assert!(matches!(wd.start(|_| ()), Err(WatchdogError::AlreadyRunning)));

        let t = Instant::now();
        wd.stop();
        assert!(t.elapsed() < Duration::from_secs(1));
    }
}
