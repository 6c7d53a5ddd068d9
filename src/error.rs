// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced at the library boundary.
///
/// Per-record failures inside a batch scan are not reported through this type;
/// they are collected in [`crate::batch::BatchResult`].
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input, detected before any I/O takes place.
    #[error("argument not valid: {0}")]
    ArgumentNotValid(String),
    /// The persisted state does not allow the requested operation.
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("{message}: {source}")]
    IoFailure {
        message: String,
        #[source]
        source: anyhow::Error,
    },
    /// A batch job or a client round trip exceeded its deadline.
    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn argument(message: impl Into<String>) -> Self {
        Self::ArgumentNotValid(message.into())
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    pub fn io_failure(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::IoFailure {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }

    /// Timeouts count as I/O failures.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Self::IoFailure { .. } | Self::Timeout { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }

    pub fn is_argument_not_valid(&self) -> bool {
        matches!(self, Self::ArgumentNotValid(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::io_failure("i/o error", e)
    }
}

impl From<parity_db::Error> for Error {
    fn from(e: parity_db::Error) -> Self {
        Self::io_failure("ledger storage error", e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::io_failure("malformed message", e)
    }
}

/// Rejects empty (or whitespace only) string arguments.
pub fn check_not_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::argument(format!("{name} must not be empty")));
    }
    Ok(())
}
