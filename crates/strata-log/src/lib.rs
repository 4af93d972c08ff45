//! Leveled logging for the `Strata` runtime.
//!
//! A small, zero-dependency logger with a single global level, module-path
//! targets and colored output on stderr. The runtime uses it to report type
//! registration, construction phases, finalizers and cycle sweeps.
//!
//! # Example
//!
//! ```
//! use strata_log::{debug, info, warn, Level};
//!
//! strata_log::set_level(Level::Debug);
//!
//! info!("registered type {}", "Vector");
//! debug!("layout size: {} bytes", 24);
//! warn!("finalizer skipped for unallocated buffer");
//! ```

use std::fmt::Arguments;
use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted by [`init_from_env`].
pub const DEFAULT_ENV_VAR: &str = "STRATA_LOG";

/// Severity of a log record.
///
/// Lower numeric values are more severe. A logger configured at a given
/// level emits records at that level and every more severe one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Unrecoverable failures.
    Error = 0,
    /// Rejected definitions and suspicious states.
    Warn = 1,
    /// Lifecycle milestones.
    Info = 2,
    /// Registration and sweep details.
    Debug = 3,
    /// Per-call dispatch and construction tracing.
    Trace = 4,
}

impl Level {
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case name of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            3 => Level::Debug,
            4 => Level::Trace,
            _ => Level::Info,
        }
    }
}

/// Error returned when a level name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError {
    input: String,
}

impl std::fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid log level: {}", self.input)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a level name, ignoring case.
    ///
    /// ```
    /// use strata_log::Level;
    ///
    /// assert_eq!("debug".parse::<Level>(), Ok(Level::Debug));
    /// assert!("loud".parse::<Level>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            _ => Err(ParseLevelError {
                input: s.to_string(),
            }),
        }
    }
}

/// Global logger state.
///
/// Only the level lives here; records are formatted and written directly to
/// stderr by [`__log_with_target`].
pub struct Logger {
    level: AtomicU8,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
        }
    }

    /// Sets the minimum level that will be emitted.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current minimum level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Returns `true` if a record at `level` would be emitted.
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, creating it at `Level::Warn` on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Warn))
}

/// Sets the global minimum level.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the global minimum level from its name.
///
/// # Errors
///
/// Returns [`ParseLevelError`] if `s` is not a known level name.
pub fn set_level_from_str(s: &str) -> Result<(), ParseLevelError> {
    set_level(s.parse()?);
    Ok(())
}

/// Reads the level from `var` (or [`DEFAULT_ENV_VAR`] when `None`).
///
/// Unset variables leave the level untouched. Returns the level in effect
/// afterwards.
///
/// # Errors
///
/// Returns [`ParseLevelError`] if the variable holds an unknown level name.
pub fn init_from_env(var: Option<&str>) -> Result<Level, ParseLevelError> {
    if let Ok(raw) = std::env::var(var.unwrap_or(DEFAULT_ENV_VAR)) {
        set_level_from_str(&raw)?;
    }
    Ok(get_logger().level())
}

#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    const RESET: &str = "\x1b[0m";

    if !get_logger().enabled(level) {
        return;
    }

    let color = level.color_code();
    let name = level.as_str();
    let mut stderr = std::io::stderr().lock();
    // A closed stderr must not take the runtime down with it.
    let _ = writeln!(stderr, "{color}[{name:5}]{RESET} {target}: {args}");
}

/// Logs at an explicit level.
///
/// ```
/// use strata_log::{log, Level};
///
/// log!(level: Level::Info, "sweep reclaimed {} objects", 3);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {{
        let level = $level;
        if $crate::get_logger().enabled(level) {
            $crate::__log_with_target(level, module_path!(), format_args!($($arg)*));
        }
    }};
}

/// Returns `true` if records at the given level are currently emitted.
///
/// Useful to skip building expensive log arguments.
#[macro_export]
macro_rules! log_enabled {
    ($level:expr) => {
        $crate::get_logger().enabled($level)
    };
}

/// Logs at [`Level::Error`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Error, $($arg)*) };
}

/// Logs at [`Level::Warn`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Warn, $($arg)*) };
}

/// Logs at [`Level::Info`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Info, $($arg)*) };
}

/// Logs at [`Level::Debug`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Debug, $($arg)*) };
}

/// Logs at [`Level::Trace`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Trace, $($arg)*) };
}
