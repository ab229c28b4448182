//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Logger setup.
//!

use flexi_logger::{DeferredNow, Logger, LoggerHandle};
use log::Record;

#[derive(Copy, Clone, Debug, strum_macros::EnumIter, PartialEq)]
pub enum Level {
    Quiet,
    Info,
    Verbose
}

impl Level {
    /// Log specification understood by `flexi_logger`.
    pub fn spec(&self) -> &'static str {
        match self {
            Level::Quiet   => "warn",
            Level::Info    => "info",
            Level::Verbose => "debug"
        }
    }
}

fn format_record(
    w: &mut dyn std::io::Write,
    _now: &mut DeferredNow,
    record: &Record
) -> Result<(), std::io::Error> {
    write!(w, "{:<5} [{}] {}", record.level(), record.module_path().unwrap_or("<unnamed>"), record.args())
}

/// Starts logging to stderr; `RUST_LOG` (if set) takes precedence over `level`.
///
/// The returned handle must be kept alive for the duration of the program.
///
pub fn init(level: Level) -> Result<LoggerHandle, flexi_logger::FlexiLoggerError> {
    Logger::try_with_env_or_str(level.spec())?
        .format(format_record)
        .log_to_stderr()
        .start()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_level_has_a_valid_spec() {
        for level in Level::iter() {
            assert!(flexi_logger::LogSpecification::parse(level.spec()).is_ok());
        }
    }

    #[test]
    fn quiet_still_reports_warnings() {
        assert_eq!("warn", Level::Quiet.spec());
    }
}
