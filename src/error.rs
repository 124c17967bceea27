//! Application error type.
//!
//! `DaqError` collects the failures the `rp-scope` front-end can hit:
//!
//! - **`Config`**: figment could not read or deserialize the configuration
//! - **`Configuration`**: the configuration parsed but holds invalid values
//! - **`Instrument`**: anything raised by the Red Pitaya driver
//! - **`Serial`**: anything raised by the serial stream reader
//! - **`Io`**: writing results to a file or stdout failed
//! - **`Logging`**: the tracing subscriber could not be installed
//!
//! Each variant maps to an [`ErrorCategory`] so the CLI can print recovery
//! guidance that matches the kind of failure.

use daq_driver_red_pitaya::{ErrorCategory, RedPitayaError};
use daq_serial_stream::SerialStreamError;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors surfaced by the rp-scope front-end.
#[derive(Error, Debug)]
pub enum DaqError {
    /// The configuration could not be read or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The configuration parsed but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Red Pitaya driver failure.
    #[error(transparent)]
    Instrument(#[from] RedPitayaError),

    /// Serial stream failure.
    #[error(transparent)]
    Serial(#[from] SerialStreamError),

    /// Writing results failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tracing subscriber could not be installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

impl DaqError {
    /// Recovery category of the underlying failure.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DaqError::Config(_) | DaqError::Configuration(_) | DaqError::Logging(_) => {
                ErrorCategory::Configuration
            }
            DaqError::Instrument(e) => e.category(),
            DaqError::Io(_) => ErrorCategory::Environment,
            DaqError::Serial(SerialStreamError::NoDataRecognized(_)) => {
                ErrorCategory::DataIntegrity
            }
            DaqError::Serial(SerialStreamError::NoPortSelected) => ErrorCategory::Configuration,
            DaqError::Serial(_) => ErrorCategory::Environment,
        }
    }

    /// One-line hint for the user, by category.
    pub fn recovery_hint(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => "check the parameters or configuration file and retry",
            ErrorCategory::Environment => {
                "check the cable, address and trigger source, or raise the timeout"
            }
            ErrorCategory::DataIntegrity => {
                "retry the acquisition and check the data format setting"
            }
        }
    }
}
