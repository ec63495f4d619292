//! Emergency Kill Switch - Graceful Shutdown System
//!
//! Provides multiple mechanisms to stop the trading bot safely:
//! - Signal handlers (SIGTERM, SIGUSR1, SIGUSR2)
//! - Atomic shutdown flag (for programmatic shutdown)
//! - Future: HTTP endpoint for remote shutdown
//!
//! ## Usage
//!
//! ```no_run
//! use exec_core::resilience::KillSwitch;
//!
//! // Install signal handlers
//! let kill_switch = KillSwitch::install();
//!
//! // Main trading loop
//! while !kill_switch.should_stop() {
//!     // Trade...
//! }
//!
//! // Cleanup
//! kill_switch.shutdown("Graceful shutdown");
//! ```
//!
//! ## Signals
//!
//! - **SIGTERM**: Graceful shutdown (save state, cancel orders)
//! - **SIGUSR1**: Emergency halt (immediate stop, no cleanup)
//! - **SIGUSR2**: Pause trading (resume with another SIGUSR2)
//!
//! ## Safety
//!
//! All signal handlers are async-signal-safe (only atomic operations).

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, warn};

/// Kill switch state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KillSwitchState {
    /// Normal operation
    Running = 0,
    /// Paused (can resume)
    Paused = 1,
    /// Shutting down gracefully
    ShuttingDown = 2,
    /// Emergency stop (immediate)
    EmergencyStop = 3,
}

impl From<u8> for KillSwitchState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Paused,
            2 => Self::ShuttingDown,
            3 => Self::EmergencyStop,
            _ => Self::Running,
        }
    }
}

/// Emergency kill switch for graceful shutdown
///
/// Thread-safe, async-signal-safe shutdown coordination.
#[derive(Clone)]
pub struct KillSwitch {
    /// Current state
    state: Arc<AtomicU8>,
    /// Shutdown reason (if set)
    shutdown_reason: Arc<parking_lot::Mutex<Option<String>>>,
    /// Timestamp when shutdown initiated
    shutdown_time: Arc<parking_lot::Mutex<Option<SystemTime>>>,
}

impl KillSwitch {
    /// Create a new kill switch in Running state
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(KillSwitchState::Running as u8)),
            shutdown_reason: Arc::new(parking_lot::Mutex::new(None)),
            shutdown_time: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Install signal handlers and return kill switch
    ///
    /// Sets up:
    /// - SIGTERM → graceful shutdown
    /// - SIGUSR1 → emergency stop
    /// - SIGUSR2 → pause/resume toggle
    pub fn install() -> Self {
        let kill_switch = Self::new();

        #[cfg(unix)]
        {
            Self::spawn_signal_watcher(signal_hook::consts::SIGTERM, {
                let ks = kill_switch.clone();
                move || ks.shutdown("SIGTERM received")
            });
            Self::spawn_signal_watcher(signal_hook::consts::SIGUSR1, {
                let ks = kill_switch.clone();
                move || ks.emergency_stop("SIGUSR1 received")
            });
            Self::spawn_signal_watcher(signal_hook::consts::SIGUSR2, {
                let ks = kill_switch.clone();
                move || ks.toggle_pause()
            });
        }

        kill_switch
    }

    /// Register an async-signal-safe flag for `signal` and poll it on a
    /// background thread, invoking `on_signal` the moment it flips. The flag
    /// itself is only ever touched by the signal handler and this poll loop.
    #[cfg(unix)]
    fn spawn_signal_watcher(signal: i32, on_signal: impl FnOnce() + Send + 'static) {
        let flag = Arc::new(AtomicBool::new(false));
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&flag)) {
            error!(signal, error = %e, "failed to register signal handler");
            return;
        }
        std::thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            on_signal();
        });
        info!(signal, "signal watcher installed");
    }

    /// Check if bot should stop
    #[inline]
    pub fn should_stop(&self) -> bool {
        let state: KillSwitchState = self.state.load(Ordering::Acquire).into();
        matches!(
            state,
            KillSwitchState::ShuttingDown | KillSwitchState::EmergencyStop
        )
    }

    /// Check if bot is paused
    #[inline]
    pub fn is_paused(&self) -> bool {
        let state: KillSwitchState = self.state.load(Ordering::Acquire).into();
        matches!(state, KillSwitchState::Paused)
    }

    /// Check if bot is running
    #[inline]
    pub fn is_running(&self) -> bool {
        let state: KillSwitchState = self.state.load(Ordering::Acquire).into();
        matches!(state, KillSwitchState::Running)
    }

    /// Initiate graceful shutdown
    pub fn shutdown(&self, reason: &str) {
        info!("Kill switch activated: {}", reason);

        self.state
            .store(KillSwitchState::ShuttingDown as u8, Ordering::Release);

        *self.shutdown_reason.lock() = Some(reason.to_string());
        *self.shutdown_time.lock() = Some(SystemTime::now());
    }

    /// Initiate emergency stop (immediate)
    pub fn emergency_stop(&self, reason: &str) {
        error!("EMERGENCY STOP: {}", reason);

        self.state
            .store(KillSwitchState::EmergencyStop as u8, Ordering::Release);

        *self.shutdown_reason.lock() = Some(format!("EMERGENCY: {}", reason));
        *self.shutdown_time.lock() = Some(SystemTime::now());
    }

    /// Pause trading (can resume)
    pub fn pause(&self) {
        let current: KillSwitchState = self.state.load(Ordering::Acquire).into();

        if matches!(current, KillSwitchState::Running) {
            info!("Kill switch: Pausing trading");
            self.state
                .store(KillSwitchState::Paused as u8, Ordering::Release);
        }
    }

    /// Resume trading (from paused state)
    pub fn resume(&self) {
        let current: KillSwitchState = self.state.load(Ordering::Acquire).into();

        if matches!(current, KillSwitchState::Paused) {
            info!("Kill switch: Resuming trading");
            self.state
                .store(KillSwitchState::Running as u8, Ordering::Release);
        }
    }

    /// Toggle pause/resume
    pub fn toggle_pause(&self) {
        if self.is_paused() {
            self.resume();
        } else if self.is_running() {
            self.pause();
        }
    }

    /// Get current state
    pub fn state(&self) -> KillSwitchState {
        self.state.load(Ordering::Acquire).into()
    }

    /// Get shutdown reason if shutdown was initiated
    pub fn shutdown_reason(&self) -> Option<String> {
        self.shutdown_reason.lock().clone()
    }

    /// Get shutdown timestamp
    pub fn shutdown_time(&self) -> Option<SystemTime> {
        *self.shutdown_time.lock()
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}
