//! Error taxonomy for fleet operations.
//!
//! Connection-class failures mean no command ran (or its result is unknown).
//! Command failures mean the session worked but the remote side did not do
//! what was asked. Precondition failures are detected locally before any
//! remote call is made.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("cannot connect to {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("{host}: timed out after {after:?}")]
    Timeout { host: String, after: Duration },

    #[error("{host}: {reason}")]
    Command { host: String, reason: String },

    #[error("{0}")]
    Precondition(String),

    #[error("local I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl FleetError {
    pub fn connection(host: &str, reason: impl Into<String>) -> Self {
        Self::Connection {
            host: host.to_string(),
            reason: reason.into(),
        }
    }

    pub fn command(host: &str, reason: impl Into<String>) -> Self {
        Self::Command {
            host: host.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the host could not be reached at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

pub type Result<T, E = FleetError> = std::result::Result<T, E>;
