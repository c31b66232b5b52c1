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
//! [graystruct](crate) errors

use backtrace::Backtrace;

type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// [graystruct](crate) error type
///
/// [graystruct](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of a
/// straightforward enumeration with a few match arms chosen on the basis what the caller will
/// need to respond: configuration problems are fatal, encoding problems mean the event should be
/// dropped, and the two transport arms leave the retry decision to the caller.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// Malformed broker URL, unsupported scheme or unusable address; raised at construction
    Config { reason: String, back: Backtrace },
    /// An event field could not be represented in JSON
    Encoding {
        field: Option<String>,
        reason: String,
        back: Backtrace,
    },
    /// A connection could not be established
    Transport { source: StdError, back: Backtrace },
    /// The connection failed while transmitting a frame
    Send { source: StdError, back: Backtrace },
    /// A frame could not be deflated
    Compress {
        source: std::io::Error,
        back: Backtrace,
    },
    /// A compressed frame could not be inflated
    Decompress {
        source: std::io::Error,
        back: Backtrace,
    },
}

impl Error {
    pub fn config<S: Into<String>>(reason: S) -> Error {
        Error::Config {
            reason: reason.into(),
            back: Backtrace::new(),
        }
    }
    pub fn encoding<S: Into<String>>(field: Option<&str>, reason: S) -> Error {
        Error::Encoding {
            field: field.map(String::from),
            reason: reason.into(),
            back: Backtrace::new(),
        }
    }
    pub fn transport<E: Into<StdError>>(err: E) -> Error {
        Error::Transport {
            source: err.into(),
            back: Backtrace::new(),
        }
    }
    pub fn send<E: Into<StdError>>(err: E) -> Error {
        Error::Send {
            source: err.into(),
            back: Backtrace::new(),
        }
    }
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config { .. })
    }
    pub fn is_encoding(&self) -> bool {
        matches!(self, Error::Encoding { .. })
    }
    /// True if the connection could not be established; the caller may retry
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
    /// True if the connection dropped mid-write; the caller may retry
    pub fn is_send(&self) -> bool {
        matches!(self, Error::Send { .. })
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Config { reason, .. } => write!(f, "Configuration error: {}", reason),
            Error::Encoding {
                field: Some(field),
                reason,
                ..
            } => write!(f, "Field '{}' could not be encoded: {}", field, reason),
            Error::Encoding { reason, .. } => write!(f, "Event could not be encoded: {}", reason),
            Error::Transport { source, .. } => {
                write!(f, "Failed to establish a connection: {}", source)
            }
            Error::Send { source, .. } => write!(f, "While sending a GELF frame, got {}", source),
            Error::Compress { source, .. } => {
                write!(f, "While deflating a GELF frame, got {}", source)
            }
            Error::Decompress { source, .. } => {
                write!(f, "While inflating a GELF frame, got {}", source)
            }
            _ => write!(f, "Other graystruct error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Config { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Encoding { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Send { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Compress { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Decompress { back, .. } => write!(f, "{}\n{:#?}", self, back),
            err => write!(f, "graystruct error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    #[allow(unreachable_patterns)]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport { source, .. } | Error::Send { source, .. } => Some(source.as_ref()),
            Error::Compress { source, .. } | Error::Decompress { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
