// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of graystruct.
//
// graystruct is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// graystruct is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with graystruct.  If not,
// see <http://www.gnu.org/licenses/>.

//! Severity & syslog level definitions.
//!
//! GELF borrows its `level` field from syslog, so [`Level`] replicates the names used in
//! `<syslog.h>`. Applications, on the other hand, log at a handful of named severities
//! ([`Severity`]); the mapping between the two is a fixed table rather than something
//! configurable at runtime.

use std::{borrow::Cow, str::FromStr};

type StdResult<T, E> = std::result::Result<T, E>;

/// The eight syslog severity levels, as documented in the `syslog()` manual [page] & defined in
/// `<syslog.h>`.
///
/// [page]: https://man7.org/linux/man-pages/man3/syslog.3.html
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// system is unusable
    LOG_EMERG,
    /// action must be take immediately
    LOG_ALERT,
    /// critical conditions
    LOG_CRIT,
    /// error conditions
    LOG_ERR,
    /// warning conditions
    LOG_WARNING,
    /// normal, but significant condition
    LOG_NOTICE,
    /// informational message
    LOG_INFO,
    /// debug-level message
    LOG_DEBUG,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Level::LOG_EMERG => "LOG_EMERG",
                Level::LOG_ALERT => "LOG_ALERT",
                Level::LOG_CRIT => "LOG_CRIT",
                Level::LOG_ERR => "LOG_ERR",
                Level::LOG_WARNING => "LOG_WARNING",
                Level::LOG_NOTICE => "LOG_NOTICE",
                Level::LOG_INFO => "LOG_INFO",
                Level::LOG_DEBUG => "LOG_DEBUG",
            }
        )
    }
}

/// Application-level severity of an event.
///
/// The five named variants are the severities a structured logger hands us; anything else is
/// carried as [`Severity::Custom`] & passed through to GELF unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    /// A level outside the fixed table; its number is used verbatim as the GELF level
    Custom(u32),
}

impl Severity {
    /// The syslog [`Level`] for this severity, if it has one
    pub fn level(&self) -> Option<Level> {
        match self {
            Severity::Critical => Some(Level::LOG_CRIT),
            Severity::Error => Some(Level::LOG_ERR),
            Severity::Warning => Some(Level::LOG_WARNING),
            Severity::Info => Some(Level::LOG_INFO),
            Severity::Debug => Some(Level::LOG_DEBUG),
            Severity::Custom(_) => None,
        }
    }
    /// The numeric value to be placed in the GELF `level` field
    pub fn syslog_level(&self) -> u32 {
        match self {
            Severity::Custom(n) => *n,
            named => named.level().map_or(Level::LOG_DEBUG as u32, |level| level as u32),
        }
    }
    /// The textual name of this severity, as it appears in `_level_name`
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Severity::Critical => Cow::Borrowed("CRITICAL"),
            Severity::Error => Cow::Borrowed("ERROR"),
            Severity::Warning => Cow::Borrowed("WARNING"),
            Severity::Info => Cow::Borrowed("INFO"),
            Severity::Debug => Cow::Borrowed("DEBUG"),
            Severity::Custom(n) => Cow::Owned(format!("Level {}", n)),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(f, "{}", self.name())
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Severity::Error,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::DEBUG | tracing::Level::TRACE => Severity::Debug,
        }
    }
}

/// The error returned when a string names no known severity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownSeverity(pub String);

impl std::fmt::Display for UnknownSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(f, "'{}' does not name a severity", self.0)
    }
}

impl std::error::Error for UnknownSeverity {}

impl FromStr for Severity {
    type Err = UnknownSeverity;
    /// Parse a logging method name (`warning`, `warn`, `exception` & the like)
    fn from_str(s: &str) -> StdResult<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" | "fatal" => Ok(Severity::Critical),
            "error" | "exception" | "err" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            "debug" | "trace" => Ok(Severity::Debug),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

#[cfg(test)]
mod severity_level_tests {
    use super::*;

    #[test]
    fn fixed_table() {
        assert_eq!(Severity::Critical.syslog_level(), 2);
        assert_eq!(Severity::Error.syslog_level(), 3);
        assert_eq!(Severity::Warning.syslog_level(), 4);
        assert_eq!(Severity::Info.syslog_level(), 6);
        assert_eq!(Severity::Debug.syslog_level(), 7);
        assert_eq!(Severity::Custom(25).syslog_level(), 25);
        assert_eq!(Level::LOG_EMERG as u8, 0);
        assert_eq!(format!("{}", Level::LOG_WARNING), "LOG_WARNING");
    }

    #[test]
    fn names() {
        assert_eq!(Severity::Warning.name(), "WARNING");
        assert_eq!(Severity::Custom(5).name(), "Level 5");
        assert_eq!("warn".parse::<Severity>(), Ok(Severity::Warning));
        assert_eq!("EXCEPTION".parse::<Severity>(), Ok(Severity::Error));
        assert!("loud".parse::<Severity>().is_err());
        assert_eq!(Severity::from(&tracing::Level::TRACE), Severity::Debug);
    }
}
