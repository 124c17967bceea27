//! Errors raised by the serial stream reader.

use thiserror::Error;

/// Result alias for this crate.
pub type SerialResult<T> = std::result::Result<T, SerialStreamError>;

/// Errors from the serial stream reader.
#[derive(Error, Debug)]
pub enum SerialStreamError {
    /// A bunch was empty, never started, or held a non-numeric or ragged row.
    #[error("Data not recognized: {0}")]
    NoDataRecognized(String),

    /// The OS refused to open the port.
    #[error("Failed to open serial port '{port}' at {baud_rate} baud: {source}")]
    PortOpen {
        /// Port name as given.
        port: String,
        /// Requested line speed.
        baud_rate: u32,
        /// Driver error.
        #[source]
        source: serialport::Error,
    },

    /// No port has been selected.
    #[error("No serial port selected")]
    NoPortSelected,

    /// The operation needs an open port.
    #[error("Serial port is not open")]
    NotOpen,

    /// Reading from or writing to an open port failed.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}
