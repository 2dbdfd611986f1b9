/// Structured logging for the park monitoring service
///
/// Provides context-rich logging with subsystem and subject identifiers
/// (area, device, or alert key), timestamps, and severity levels. Supports
/// both console output and file-based logging for long-running operation.
/// Until `init_logger` is called every logging function is a no-op.

use chrono::Utc;
use serde::Deserialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::model::{ClassificationResult, Status};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Subsystems
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    /// Area occupancy / flow control
    Flow,
    /// Environmental sensor ingestion
    Environment,
    Alerts,
    Config,
    System,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subsystem::Flow => write!(f, "FLOW"),
            Subsystem::Environment => write!(f, "ENV"),
            Subsystem::Alerts => write!(f, "ALERT"),
            Subsystem::Config => write!(f, "CFG"),
            Subsystem::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        *global() = Some(logger);
    }

    fn format_entry(level: LogLevel, subsystem: Subsystem, subject: Option<&str>, message: &str) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let subject_part = subject.map(|s| format!(" [{}]", s)).unwrap_or_default();
        format!("{} {} {}{}: {}", timestamp, level, subsystem, subject_part, message)
    }

    fn log(&self, level: LogLevel, subsystem: Subsystem, subject: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let log_entry = Self::format_entry(level, subsystem, subject, message);
        let subject_part = subject.map(|s| format!(" [{}]", s)).unwrap_or_default();

        // Console output; stdout is reserved for results, so everything goes to stderr
        if self.console_timestamps {
            eprintln!("{}", log_entry);
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", subsystem, subject_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", subsystem, subject_part, message),
                LogLevel::Info => eprintln!("   {}{}: {}", subsystem, subject_part, message),
                LogLevel::Debug => {} // Skip debug in non-timestamp mode
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

fn global() -> MutexGuard<'static, Option<Logger>> {
    LOGGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn emit(level: LogLevel, subsystem: Subsystem, subject: Option<&str>, message: &str) {
    if let Some(logger) = global().as_ref() {
        logger.log(level, subsystem, subject, message);
    }
}

/// Log a general informational message
pub fn info(subsystem: Subsystem, subject: Option<&str>, message: &str) {
    emit(LogLevel::Info, subsystem, subject, message);
}

/// Log a warning message
pub fn warn(subsystem: Subsystem, subject: Option<&str>, message: &str) {
    emit(LogLevel::Warning, subsystem, subject, message);
}

/// Log an error message
pub fn error(subsystem: Subsystem, subject: Option<&str>, message: &str) {
    emit(LogLevel::Error, subsystem, subject, message);
}

/// Log a debug message
pub fn debug(subsystem: Subsystem, subject: Option<&str>, message: &str) {
    emit(LogLevel::Debug, subsystem, subject, message);
}

// ---------------------------------------------------------------------------
// Classification Logging
// ---------------------------------------------------------------------------

/// Level a classification is logged at: normal results are routine,
/// anything else is worth a warning.
pub fn level_for_status(status: Status) -> LogLevel {
    if status.is_alerting() {
        LogLevel::Warning
    } else {
        LogLevel::Debug
    }
}

/// Log the outcome of a threshold check for one subject
pub fn log_classification(subsystem: Subsystem, subject: &str, result: &ClassificationResult) {
    let message = match &result.reason {
        Some(reason) => format!("{} ({})", result.status, reason),
        None => format!("{} ({:.2})", result.status, result.ratio_or_value),
    };
    emit(level_for_status(result.status), subsystem, Some(subject), &message);
}

// ---------------------------------------------------------------------------
// Recalculation Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a bulk abnormal-flag recalculation
pub fn log_recalculation_summary(subject: &str, total: usize, affected: usize, changed: usize) {
    let message = format!(
        "Recalculation complete: {} readings, {} affected, {} changed",
        total, affected, changed
    );

    if changed == 0 {
        info(Subsystem::Environment, Some(subject), &message);
    } else {
        warn(Subsystem::Environment, Some(subject), &message);
    }
}
