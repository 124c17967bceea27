//! Serial sample stream reader
//!
//! Reads newline-delimited, comma-separated samples from a serial device, in
//! one of two modes:
//!
//! - single sample: [`SerialReader::collect_data`] returns the newest line
//!   that parses
//! - bunch: [`SerialReader::collect_data_bunch`] returns the lines framed by
//!   `start` / `stop` control lines
//!
//! Reads never block waiting for data; each call works on what the port has
//! already buffered.
//!
//! # Usage
//!
//! ```rust,no_run
//! use daq_serial_stream::{search_ports, SerialReader, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};
//!
//! # fn run() -> Result<(), daq_serial_stream::SerialStreamError> {
//! let ports = search_ports()?;
//! if let Some(port) = ports.first() {
//!     let mut reader = SerialReader::open_port(port, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT)?;
//!     if let Some(sample) = reader.collect_data()? {
//!         println!("{:?}", sample.values());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod link;
pub mod reader;

pub use error::{SerialResult, SerialStreamError};
pub use link::{
    filter_ports, search_ports, system_opener, LinkOpener, SerialLink, DEFAULT_BAUD_RATE,
    DEFAULT_READ_TIMEOUT, RESERVED_PORT_PREFIX,
};
pub use reader::{
    parse_line, to_numeric, RawBunch, SerialBunch, SerialReader, SerialSample, MAX_PARTIAL_LINE,
    NO_PORT,
};
