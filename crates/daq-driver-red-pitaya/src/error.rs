//! Error types for the Red Pitaya driver.
//!
//! Errors fall into three categories that callers must be able to tell apart
//! so they can offer different recovery guidance:
//!
//! 1. **Configuration** - `InvalidParameter`
//!    - Raised before anything is sent to the instrument
//!    - Recovery: fix the parameters and retry
//!
//! 2. **Environment** - `Connection`, `Timeout`
//!    - Cable, address, network or trigger conditions
//!    - Recovery: check the link / IP / trigger source, or raise the timeout
//!
//! 3. **Data integrity** - `Decode`, `UnexpectedReply`, `LengthMismatch`
//!    - The instrument answered, but the payload is unusable
//!    - Recovery: retry the acquisition, check the data format setting
//!
//! Use [`RedPitayaError::category`] to branch on the category.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the driver.
pub type RpResult<T> = std::result::Result<T, RedPitayaError>;

/// Broad error category, used by front-ends to pick recovery guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller-side parameter mistake.
    Configuration,
    /// Link, network or timing failure.
    Environment,
    /// Malformed or inconsistent reply data.
    DataIntegrity,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Environment => "environment",
            ErrorCategory::DataIntegrity => "data_integrity",
        };
        write!(f, "{}", label)
    }
}

/// Failure while turning a raw channel reply into samples.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Reply was empty (or whitespace only).
    #[error("empty reply")]
    EmptyReply,

    /// Reply contained no complete numeric element.
    #[error("no numeric data in reply")]
    NoNumericData,

    /// A token could not be parsed as a floating-point number.
    #[error("cannot parse '{token}' as a number")]
    Parse {
        /// The offending token, as received.
        token: String,
    },
}

/// Primary error type for the Red Pitaya driver.
#[derive(Error, Debug)]
pub enum RedPitayaError {
    /// Parameter validation failed. Never reaches the transport.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Transport could not be opened, or failed during a mandatory command.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Buffer fill did not complete before the deadline.
    #[error("Timed out after {elapsed:?} waiting for trigger and buffer fill (timeout {timeout:?})")]
    Timeout {
        /// Time spent since configuration started.
        elapsed: Duration,
        /// Caller-supplied deadline.
        timeout: Duration,
    },

    /// Channel data could not be decoded.
    #[error("Channel {channel} decode failed for '{command}': {source}")]
    Decode {
        /// Channel number (1 or 2).
        channel: u8,
        /// Query that produced the reply.
        command: String,
        /// Underlying decoder failure.
        #[source]
        source: DecodeError,
    },

    /// A scalar query returned something that does not parse.
    #[error("Unexpected reply to '{command}': {reply:?}")]
    UnexpectedReply {
        /// Query that was sent.
        command: String,
        /// Reply as received.
        reply: String,
    },

    /// Decoded channels differ in length by more than the tolerated skew.
    #[error("Channel lengths differ too much: channel 1 has {channel1} samples, channel 2 has {channel2}")]
    LengthMismatch {
        /// Samples decoded on channel 1.
        channel1: usize,
        /// Samples decoded on channel 2.
        channel2: usize,
    },
}

impl RedPitayaError {
    /// Category of this error, for front-end recovery guidance.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RedPitayaError::InvalidParameter(_) => ErrorCategory::Configuration,
            RedPitayaError::Connection(_) | RedPitayaError::Timeout { .. } => {
                ErrorCategory::Environment
            }
            RedPitayaError::Decode { .. }
            | RedPitayaError::UnexpectedReply { .. }
            | RedPitayaError::LengthMismatch { .. } => ErrorCategory::DataIntegrity,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        RedPitayaError::InvalidParameter(message.into())
    }

    pub(crate) fn connection(message: impl Into<String>) -> Self {
        RedPitayaError::Connection(message.into())
    }
}
