//! Category-filtered logging for bus models.
//!
//! A cycle model ticks tens of millions of times per simulated second, so the
//! logging path has to cost nothing when it is switched off and must not let a
//! stuck state machine flood the output when it is switched on.
//!
//! - [`LogConfig`] is a process-wide singleton holding one global level and one
//!   optional override per [`LogCategory`], all in atomics.
//! - [`log`] takes a closure, so formatting only happens for enabled messages.
//! - Each category is rate limited with a one second sliding window; dropped
//!   messages are summarised once per second.
//! - Output goes to stderr, or to a file written by a background thread.
//!
//! ```rust
//! use pds_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Slave, LogLevel::Debug, || {
//!     format!("slave: read request at {:08X}", 0xF900_0010u32)
//! });
//! ```

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// Log level, ordered by verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse a level name or digit (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Bridge component a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Raw pad activity and synchronizer contents
    Pads,
    /// Slave responder (external master reading/writing us)
    Slave,
    /// Bus request/grant/acknowledge arbitration
    Arbiter,
    /// Master transfer engine (DMA onto the external bus)
    Master,
    /// Internal request/acknowledge bus ports
    InternalBus,
}

impl LogCategory {
    pub const COUNT: usize = 5;

    pub const ALL: [LogCategory; Self::COUNT] = [
        LogCategory::Pads,
        LogCategory::Slave,
        LogCategory::Arbiter,
        LogCategory::Master,
        LogCategory::InternalBus,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::Pads => 0,
            LogCategory::Slave => 1,
            LogCategory::Arbiter => 2,
            LogCategory::Master => 3,
            LogCategory::InternalBus => 4,
        }
    }
}

#[derive(Default)]
struct Window {
    stamps: VecDeque<Instant>,
    dropped: usize,
    last_report: Option<Instant>,
}

/// Sliding-window limiter, one window per category.
struct RateLimiter {
    max_per_second: AtomicUsize,
    span: Duration,
    windows: Mutex<[Window; LogCategory::COUNT]>,
}

impl RateLimiter {
    fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: AtomicUsize::new(max_per_second),
            span: Duration::from_secs(1),
            windows: Mutex::new(Default::default()),
        }
    }

    fn windows(&self) -> MutexGuard<'_, [Window; LogCategory::COUNT]> {
        // A panic while holding the lock leaves only timestamps behind; keep going.
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `(allowed, dropped)`; `dropped` is set when a drop summary is due.
    fn should_allow(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let mut windows = self.windows();
        let window = &mut windows[category.index()];

        while let Some(&front) = window.stamps.front() {
            if now.duration_since(front) > self.span {
                window.stamps.pop_front();
            } else {
                break;
            }
        }

        if window.stamps.len() < self.max_per_second.load(Ordering::Relaxed) {
            window.stamps.push_back(now);
            if window.dropped > 0 {
                let dropped = std::mem::take(&mut window.dropped);
                window.last_report = Some(now);
                return (true, Some(dropped));
            }
            return (true, None);
        }

        window.dropped += 1;
        let report_due = window
            .last_report
            .map_or(true, |last| now.duration_since(last) >= self.span);
        if report_due {
            let dropped = std::mem::take(&mut window.dropped);
            window.last_report = Some(now);
            (false, Some(dropped))
        } else {
            (false, None)
        }
    }
}

/// Process-wide logging configuration.
pub struct LogConfig {
    global_level: AtomicU8,
    /// `Off` means "inherit the global level"
    category_levels: [AtomicU8; LogCategory::COUNT],
    sender: Mutex<Option<Sender<String>>>,
    to_file: AtomicBool,
    limiter: RateLimiter,
}

impl LogConfig {
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: Default::default(),
            sender: Mutex::new(None),
            to_file: AtomicBool::new(false),
            limiter: RateLimiter::new(60),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category override wins over the global level when it is not `Off`.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        match self.get_level(category) {
            LogLevel::Off => level <= self.get_global_level(),
            own => level <= own,
        }
    }

    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    pub fn set_rate_limit(&self, max_per_second: usize) {
        self.limiter
            .max_per_second
            .store(max_per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.limiter.max_per_second.load(Ordering::Relaxed)
    }

    /// Append log output to `path` from a background writer thread.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
            })?;

        *self.sender_slot() = Some(sender);
        self.to_file.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stop file output; the writer thread exits once its channel closes.
    pub fn clear_log_file(&self) {
        *self.sender_slot() = None;
        self.to_file.store(false, Ordering::Relaxed);
    }

    fn sender_slot(&self) -> MutexGuard<'_, Option<Sender<String>>> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_message(&self, message: String) {
        if self.to_file.load(Ordering::Relaxed) {
            if let Some(sender) = self.sender_slot().as_ref() {
                if let Err(unsent) = sender.send(message) {
                    eprintln!("{}", unsent.0);
                }
                return;
            }
        }
        eprintln!("{}", message);
    }
}

/// Log a lazily formatted message.
///
/// `message_fn` only runs when `category` is enabled at `level` and the
/// category is under its rate limit.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (allowed, dropped) = config.limiter.should_allow(category);
    if let Some(count) = dropped.filter(|&n| n > 0) {
        config.write_message(format!(
            "[{:?}] rate limit exceeded, {} message(s) dropped in the last second",
            category, count
        ));
    }
    if allowed {
        config.write_message(message_fn());
    }
}
