/// Structured logging for the weather station read service
///
/// Provides context-rich logging with a component tag, an optional
/// context (peer address, building id), timestamps, and severity levels.
/// Supports both console output and file-based logging for daemon operations.

use chrono::Utc;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;

use crate::model::StoreError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
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
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Database,
    Push,
    Http,
    Planner,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Database => write!(f, "DB"),
            Component::Push => write!(f, "PUSH"),
            Component::Http => write!(f, "HTTP"),
            Component::Planner => write!(f, "PLAN"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the pool is saturated under load, clients retry on their own
    Expected,
    /// Unexpected failure - database down, schema mismatch or bug
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
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
    /// Log file path and its handle, opened once in append mode
    log_file: Option<(String, File)>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Build a logger. A log file that cannot be opened is reported on
    /// stderr and the logger falls back to console output only.
    pub fn new(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) -> Self {
        let log_file = log_file.and_then(|path| {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => Some((path.to_string(), file)),
                Err(e) => {
                    eprintln!("Failed to open log file {}: {}", path, e);
                    None
                }
            }
        });

        Logger {
            min_level,
            log_file,
            console_timestamps,
        }
    }

    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
        let logger = Logger::new(min_level, log_file, console_timestamps);

        if let Ok(mut global) = LOGGER.lock() {
            *global = Some(logger);
        }
    }

    fn log(&self, level: LogLevel, component: Component, context: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let context_part = context.map(|c| format!(" [{}]", c)).unwrap_or_default();
        let log_entry = format!(
            "{} {} {}{}: {}",
            timestamp, level, component, context_part, message
        );

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, context_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, context_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}{}: {}", component, context_part, message),
            }
        }

        // File output
        if let Some((ref path, ref file)) = self.log_file {
            let mut file: &File = file;
            if let Err(e) = writeln!(file, "{}", log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file, console_timestamps);
}

fn dispatch(level: LogLevel, component: Component, context: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, component, context, message);
        }
    }
}

/// Log a general informational message
pub fn info(component: Component, context: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, component, context, message);
}

/// Log a warning message
pub fn warn(component: Component, context: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, component, context, message);
}

/// Log an error message
pub fn error(component: Component, context: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, component, context, message);
}

/// Log a debug message
pub fn debug(component: Component, context: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, component, context, message);
}

// ---------------------------------------------------------------------------
// Store Failure Logging
// ---------------------------------------------------------------------------

/// Classify a store failure based on its kind
pub fn classify_store_failure(err: &StoreError) -> FailureType {
    match err {
        StoreError::PoolTimeout { .. } => FailureType::Expected,
        StoreError::Connect(_) | StoreError::Task(_) => FailureType::Unexpected,
        StoreError::Query(msg) => {
            // Missing relations or columns mean the schema is not what we query
            if msg.contains("does not exist") {
                FailureType::Unexpected
            } else {
                FailureType::Unknown
            }
        }
    }
}

/// Log a store failure with automatic classification
pub fn log_store_failure(component: Component, context: Option<&str>, operation: &str, err: &StoreError) {
    let failure_type = classify_store_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => warn(component, context, &message),
        FailureType::Unexpected => error(component, context, &message),
        FailureType::Unknown => warn(component, context, &message),
    }
}
