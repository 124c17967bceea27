//! Serial link abstraction and port discovery.
//!
//! [`SerialLink`] is the byte pipe the reader drains. Real hardware goes
//! through the `serialport` crate; tests hand the reader a scripted link via a
//! custom [`LinkOpener`].

use crate::error::{SerialResult, SerialStreamError};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Port names starting with this prefix are on-board UARTs, not devices.
pub const RESERVED_PORT_PREFIX: &str = "/dev/ttyS";

/// Default baud rate for the streaming device.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default blocking read timeout of the underlying port.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// A byte stream that can report how much input is already buffered.
pub trait SerialLink: Read + Write + Send {
    /// Bytes received and not yet read.
    fn bytes_waiting(&mut self) -> io::Result<usize>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn bytes_waiting(&mut self) -> io::Result<usize> {
        let waiting = self.bytes_to_read().map_err(io::Error::from)?;
        Ok(waiting as usize)
    }
}

/// Opens a link for `(port, baud_rate)`.
pub type LinkOpener = Box<dyn Fn(&str, u32) -> SerialResult<Box<dyn SerialLink>> + Send>;

/// Opener backed by the OS serial driver.
pub fn system_opener(read_timeout: Duration) -> LinkOpener {
    Box::new(move |port: &str, baud_rate: u32| {
        let opened = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|source| SerialStreamError::PortOpen {
                port: port.to_string(),
                baud_rate,
                source,
            })?;
        tracing::info!("Serial port '{}' opened at {} baud", port, baud_rate);
        Ok(Box::new(opened) as Box<dyn SerialLink>)
    })
}

/// List serial ports, leaving out on-board UARTs.
pub fn search_ports() -> SerialResult<Vec<String>> {
    let ports = serialport::available_ports().map_err(io::Error::from)?;
    let names = filter_ports(ports.into_iter().map(|p| p.port_name));
    tracing::debug!("Found {} serial ports", names.len());
    Ok(names)
}

/// Drop names under [`RESERVED_PORT_PREFIX`], keeping order.
pub fn filter_ports(names: impl IntoIterator<Item = String>) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| !name.starts_with(RESERVED_PORT_PREFIX))
        .collect()
}
