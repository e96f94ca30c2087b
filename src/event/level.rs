use std::fmt;
use std::str::FromStr;

use serde::{ Deserialize, Serialize };

use crate::error::PipelineError;

/// Event severity. Lower intensity means more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Off,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    All,
}

impl Level {
    pub const fn intensity(self) -> u32 {
        match self {
            Level::Off => 0,
            Level::Fatal => 100,
            Level::Error => 200,
            Level::Warn => 300,
            Level::Info => 400,
            Level::Debug => 500,
            Level::Trace => 600,
            Level::All => u32::MAX,
        }
    }

    /// `true` if `self` is at least as severe as `other`
    pub fn is_more_specific_than(self, other: Level) -> bool {
        self.intensity() <= other.intensity()
    }

    /// `true` if `self` is at most as severe as `other`
    pub fn is_less_specific_than(self, other: Level) -> bool {
        self.intensity() >= other.intensity()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Off => "OFF",
            Level::Fatal => "FATAL",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
            Level::All => "ALL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Level {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OFF" => Ok(Level::Off),
            "FATAL" => Ok(Level::Fatal),
            "ERROR" => Ok(Level::Error),
            "WARN" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            "ALL" => Ok(Level::All),
            other => Err(crate::config_error!("Unknown level '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error.is_more_specific_than(Level::Info));
        assert!(Level::Info.is_more_specific_than(Level::Info));
        assert!(Level::Debug.is_less_specific_than(Level::Info));
        assert!(!Level::Warn.is_less_specific_than(Level::Info));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!(" DEBUG ".parse::<Level>().unwrap(), Level::Debug);
        assert!("verbose".parse::<Level>().is_err());
        assert_eq!(Level::Fatal.to_string(), "FATAL");
    }
}
