//! Heuristic trace log for tree decisions.
//!
//! Controlled by the `TABTREE_DEBUG_LEVEL` environment variable:
//! - 0 or unset: off
//! - 1: errors only
//! - 2: info (auto-attach and grouping decisions)
//! - 3: debug (classifier rule hits)
//! - 4: trace (every event)
//!
//! Output goes to `tabtree_debug.log` in the system temp directory, kept
//! apart from the regular `log` output so a host embedding the engine can
//! capture classifier reasoning without raising its own log level.

use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

const ENV_VAR: &str = "TABTREE_DEBUG_LEVEL";
const LOG_FILE_NAME: &str = "tabtree_debug.log";

/// Trace verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    Off = 0,
    Error = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl DebugLevel {
    fn parse(value: &str) -> Self {
        match value.trim().parse::<u8>() {
            Ok(1) => DebugLevel::Error,
            Ok(2) => DebugLevel::Info,
            Ok(3) => DebugLevel::Debug,
            Ok(4) => DebugLevel::Trace,
            _ => DebugLevel::Off,
        }
    }

    fn from_env() -> Self {
        std::env::var(ENV_VAR)
            .map(|value| Self::parse(&value))
            .unwrap_or(DebugLevel::Off)
    }

    fn label(self) -> &'static str {
        match self {
            DebugLevel::Off => "OFF  ",
            DebugLevel::Error => "ERROR",
            DebugLevel::Info => "INFO ",
            DebugLevel::Debug => "DEBUG",
            DebugLevel::Trace => "TRACE",
        }
    }
}

struct TraceLogger {
    level: DebugLevel,
    file: Option<File>,
}

impl TraceLogger {
    fn new() -> Self {
        let level = DebugLevel::from_env();
        if level == DebugLevel::Off {
            return Self { level, file: None };
        }
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(log_path())
            .ok();
        let mut logger = Self { level, file };
        logger.write_raw(&format!(
            "tabtree trace started at {} (level={:?})\n",
            chrono::Utc::now().to_rfc3339(),
            level
        ));
        logger
    }

    fn write_raw(&mut self, message: &str) {
        if let Some(file) = self.file.as_mut() {
            // Tracing must never disturb the engine; write errors are dropped.
            let _ = file.write_all(message.as_bytes());
            let _ = file.flush();
        }
    }

    fn log(&mut self, level: DebugLevel, category: &str, message: &str) {
        if level == DebugLevel::Off || level > self.level {
            return;
        }
        let line = format!(
            "[{}] [{}] [{}] {}\n",
            chrono::Utc::now().format("%H:%M:%S%.6f"),
            level.label(),
            category,
            message
        );
        self.write_raw(&line);
    }
}

static LOGGER: OnceLock<Mutex<TraceLogger>> = OnceLock::new();

fn logger() -> &'static Mutex<TraceLogger> {
    LOGGER.get_or_init(|| Mutex::new(TraceLogger::new()))
}

/// Location of the trace file
pub fn log_path() -> PathBuf {
    std::env::temp_dir().join(LOG_FILE_NAME)
}

pub fn is_enabled(level: DebugLevel) -> bool {
    level != DebugLevel::Off && level <= logger().lock().level
}

/// Write a formatted trace line (used by the `debug_*` macros)
pub fn logf(level: DebugLevel, category: &str, args: fmt::Arguments) {
    if is_enabled(level) {
        logger().lock().log(level, category, &args.to_string());
    }
}

#[macro_export]
macro_rules! debug_error {
    ($category:expr, $($arg:tt)*) => {
        $crate::debug::logf($crate::debug::DebugLevel::Error, $category, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! debug_info {
    ($category:expr, $($arg:tt)*) => {
        $crate::debug::logf($crate::debug::DebugLevel::Info, $category, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! debug_log {
    ($category:expr, $($arg:tt)*) => {
        $crate::debug::logf($crate::debug::DebugLevel::Debug, $category, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! debug_trace {
    ($category:expr, $($arg:tt)*) => {
        $crate::debug::logf($crate::debug::DebugLevel::Trace, $category, format_args!($($arg)*))
    };
}
