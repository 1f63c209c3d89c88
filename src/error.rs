// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use thiserror::Error;

/// Fatal error that terminates the server loop.
///
/// Everything below this severity is handled in place: bus-level
/// checksum/parity/sequence errors are counted and logged, user input
/// errors are reported on the event stream.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying serial device failed permanently.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial device could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
}

/// Rejection of a single user set-request.
///
/// These are surfaced on the `error` event stream with the offending
/// key and never affect protocol state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingError {
    /// The setting name is not recognized.
    #[error("unknown setting `{0}`")]
    UnknownKey(String),

    /// The value could not be parsed for the setting's type.
    #[error("`{key}`: cannot parse `{value}`")]
    Parse { key: String, value: String },

    /// The parsed value is outside the setting's domain.
    #[error("`{key}`: value `{value}` out of range")]
    Domain { key: String, value: String },

    /// Two buffered settings contradict each other.
    #[error("`{key}`: {reason}")]
    Conflict { key: String, reason: String },
}

impl SettingError {
    /// The setting name the rejection refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::UnknownKey(key)
            | Self::Parse { key, .. }
            | Self::Domain { key, .. }
            | Self::Conflict { key, .. } => key,
        }
    }
}
