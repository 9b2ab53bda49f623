use std::fmt;

use clap::ValueEnum;

/// LogLevel
///
/// Represents minimum level of messages that will be logged
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error = 0,
    Warn,
    Info,
    Debug,
    Trace,
    None,
}

impl LogLevel {
    fn level(&self) -> usize {
        *self as usize
    }

    pub fn is_none(&self) -> bool {
        self.level() > 4
    }

    pub fn get_level(&self) -> usize {
        if self.level() > 4 {
            0
        } else {
            self.level()
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_str = ["error", "warn", "info", "debug", "trace", "none"];
        write!(f, "{}", level_str[self.level()])
    }
}

/// Initialize stderr logging at the requested level.
pub fn init_log(level: LogLevel) -> Result<(), log::SetLoggerError> {
    stderrlog::new()
        .quiet(level.is_none())
        .verbosity(level.get_level())
        .init()
}
