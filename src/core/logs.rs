/// Per-port logging handle
///
/// Records go through the `log` facade; installing a logger is left to the host. Each
/// driver gets its own handle with a level fixed at configuration time and a prefix
/// naming the role and port.
use log::{Level, LevelFilter};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Slave,
}

/// Direction of a frame relative to this driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameDirection {
    #[strum(serialize = "TX")]
    Outbound,
    #[strum(serialize = "RX")]
    Inbound,
}

/// Accepts the level names used in configuration files, case-insensitively.
pub fn parse_level(name: &str) -> Result<LevelFilter, ConfigError> {
    match name.to_ascii_uppercase().as_str() {
        "OFF" | "NONE" => Ok(LevelFilter::Off),
        "ERROR" => Ok(LevelFilter::Error),
        "WARN" | "WARNING" => Ok(LevelFilter::Warn),
        "INFO" => Ok(LevelFilter::Info),
        "DEBUG" => Ok(LevelFilter::Debug),
        "TRACE" => Ok(LevelFilter::Trace),
        _ => Err(ConfigError::InvalidLogLevel(name.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct PortLogger {
    role: Role,
    port: String,
    level: LevelFilter,
}

impl PortLogger {
    pub fn new(role: Role, port: impl Into<String>, level: LevelFilter) -> Self {
        Self {
            role,
            port: port.into(),
            level,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if self.enabled(level) {
            log::log!(level, "[{} {}] {}", self.role, self.port, args);
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    /// Hex dump of a frame at debug level.
    pub fn frame(&self, direction: FrameDirection, frame: &[u8]) {
        if self.enabled(Level::Debug) {
            self.debug(format_args!(
                "{direction} {}",
                String::from_utf8_lossy(frame).trim_end()
            ));
        }
    }
}

impl Default for PortLogger {
    fn default() -> Self {
        Self::new(Role::Master, "-", LevelFilter::Warn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warn").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level("Debug").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("NONE").unwrap(), LevelFilter::Off);
        assert!(matches!(
            parse_level("loud"),
            Err(ConfigError::InvalidLogLevel(name)) if name == "loud"
        ));
    }

    #[test]
    fn test_level_gate() {
        let logger = PortLogger::new(Role::Slave, "COM1", LevelFilter::Warn);
        assert!(logger.enabled(Level::Error));
        assert!(logger.enabled(Level::Warn));
        assert!(!logger.enabled(Level::Info));
        assert_eq!(logger.port(), "COM1");
    }

    #[test]
    fn test_direction_labels() {
        assert_eq!(FrameDirection::Outbound.to_string(), "TX");
        assert_eq!(FrameDirection::Inbound.to_string(), "RX");
        assert_eq!(Role::Master.to_string(), "master");
    }
}
