//! SCPI over TCP communication helpers for Red Pitaya
//!
//! This module provides an async SCPI client for communicating with Red Pitaya
//! devices over TCP. It handles connection management, command/query operations,
//! and IEEE 488.2 arbitrary-block replies used for binary channel data.

use crate::error::{RedPitayaError, RpResult};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default SCPI port for Red Pitaya
pub const DEFAULT_PORT: u16 = 5000;

/// Default command timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Connection establishment timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay after each write, giving the SCPI server time to process.
const COMMAND_SETTLE: Duration = Duration::from_millis(10);

// =============================================================================
// Transport abstraction
// =============================================================================

/// One command per round trip, newline-terminated ASCII.
///
/// Implemented by [`ScpiClient`] for real hardware and by the mock client for
/// offline use; tests inject scripted fakes.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Send a command without expecting a reply.
    async fn write(&self, command: &str) -> RpResult<()>;

    /// Send a query and return its reply line, trimmed.
    async fn query(&self, query: &str) -> RpResult<String>;

    /// Send a query whose reply is an arbitrary block; returns the payload.
    async fn query_block(&self, query: &str) -> RpResult<Vec<u8>>;
}

/// Host and port of an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentAddress {
    /// Hostname or IP address.
    pub host: String,
    /// SCPI server port, normally [`DEFAULT_PORT`].
    pub port: u16,
}

impl InstrumentAddress {
    /// Address of `host` on `port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for InstrumentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// =============================================================================
// ScpiClient
// =============================================================================

/// Async SCPI client for TCP communication with Red Pitaya
pub struct ScpiClient {
    stream: Mutex<BufReader<TcpStream>>,
    timeout: Duration,
}

impl ScpiClient {
    /// Create a new SCPI client connected to the specified address.
    ///
    /// Hostnames (e.g. `rp-f0c5e4.local`) are resolved.
    ///
    /// # Returns
    /// * `Ok(ScpiClient)` on successful connection
    /// * `Err(Connection)` if resolution or connection fails
    pub async fn connect(address: &InstrumentAddress) -> RpResult<Self> {
        let stream = timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((address.host.as_str(), address.port)),
        )
        .await
        .map_err(|_| RedPitayaError::connection(format!("Connection timeout to {}", address)))?
        .map_err(|e| RedPitayaError::connection(format!("Failed to connect to {}: {}", address, e)))?;

        // Disable Nagle's algorithm for low latency
        stream
            .set_nodelay(true)
            .map_err(|e| RedPitayaError::connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

        tracing::info!("Connected to Red Pitaya at {}", address);

        Ok(Self {
            stream: Mutex::new(BufReader::new(stream)),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        })
    }

    /// Set the per-reply timeout.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    async fn send(stream: &mut BufReader<TcpStream>, command: &str) -> RpResult<()> {
        let cmd = format!("{}\r\n", command);
        stream
            .get_mut()
            .write_all(cmd.as_bytes())
            .await
            .map_err(|e| {
                RedPitayaError::connection(format!("Failed to write command '{}': {}", command, e))
            })?;
        stream
            .get_mut()
            .flush()
            .await
            .map_err(|e| RedPitayaError::connection(format!("Failed to flush stream: {}", e)))
    }

    /// Clear any pending data from the input buffer.
    ///
    /// Binary replies leave their trailing line terminator unread; this also
    /// discards that.
    async fn flush_input_buffer(stream: &mut BufReader<TcpStream>) -> RpResult<()> {
        {
            let buf = stream.buffer();
            if !buf.is_empty() {
                tracing::debug!("Flushing {} bytes from buffer", buf.len());
                let len = buf.len();
                stream.consume(len);
            }
        }

        let mut discard = vec![0u8; 256];
        loop {
            match timeout(
                Duration::from_millis(10),
                stream.get_mut().peek(&mut discard),
            )
            .await
            {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => {
                    let mut consume_buf = vec![0u8; n];
                    let _ = stream.get_mut().try_read(&mut consume_buf);
                    tracing::debug!("Flushed {} stale bytes from stream", n);
                }
                Ok(Err(_)) => break,
            }
        }

        Ok(())
    }

    /// Read an IEEE 488.2 definite-length block: `#<n><len><payload>`.
    async fn read_block(stream: &mut BufReader<TcpStream>) -> RpResult<Vec<u8>> {
        let io_err =
            |e: std::io::Error| RedPitayaError::connection(format!("Failed to read block: {}", e));

        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await.map_err(io_err)?;
            match byte[0] {
                b'#' => break,
                b if b.is_ascii_whitespace() => continue,
                other => {
                    return Err(RedPitayaError::connection(format!(
                        "Expected block header '#', got {:?}",
                        other as char
                    )))
                }
            }
        }

        stream.read_exact(&mut byte).await.map_err(io_err)?;
        let digits = (byte[0] as char).to_digit(10).ok_or_else(|| {
            RedPitayaError::connection(format!("Invalid block length digit {:?}", byte[0] as char))
        })? as usize;
        if digits == 0 {
            return Err(RedPitayaError::connection(
                "Indefinite-length blocks are not supported",
            ));
        }

        let mut len_buf = vec![0u8; digits];
        stream.read_exact(&mut len_buf).await.map_err(io_err)?;
        let len: usize = std::str::from_utf8(&len_buf)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                RedPitayaError::connection(format!(
                    "Invalid block length {:?}",
                    String::from_utf8_lossy(&len_buf)
                ))
            })?;

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.map_err(io_err)?;
        tracing::debug!("SCPI block: {} bytes", len);
        Ok(payload)
    }
}

#[async_trait]
impl ScpiTransport for ScpiClient {
    async fn write(&self, command: &str) -> RpResult<()> {
        let mut stream = self.stream.lock().await;
        tracing::debug!("SCPI write: {:?}", command);
        Self::send(&mut stream, command).await?;

        // Small delay for command processing
        tokio::time::sleep(COMMAND_SETTLE).await;
        Ok(())
    }

    async fn query(&self, query: &str) -> RpResult<String> {
        let mut stream = self.stream.lock().await;
        Self::flush_input_buffer(&mut stream).await?;

        tracing::debug!("SCPI query: {:?}", query);
        Self::send(&mut stream, query).await?;

        let mut response = String::new();
        match timeout(self.timeout, stream.read_line(&mut response)).await {
            Ok(Ok(0)) => Err(RedPitayaError::connection("Connection closed by device")),
            Ok(Ok(_)) => {
                let trimmed = response.trim().to_string();
                tracing::debug!("SCPI response: {:?}", trimmed);
                Ok(trimmed)
            }
            Ok(Err(e)) => Err(RedPitayaError::connection(format!(
                "Failed to read response: {}",
                e
            ))),
            Err(_) => Err(RedPitayaError::connection(format!(
                "Timeout waiting for response to: {}",
                query
            ))),
        }
    }

    async fn query_block(&self, query: &str) -> RpResult<Vec<u8>> {
        let mut stream = self.stream.lock().await;
        Self::flush_input_buffer(&mut stream).await?;

        tracing::debug!("SCPI block query: {:?}", query);
        Self::send(&mut stream, query).await?;

        timeout(self.timeout, Self::read_block(&mut stream))
            .await
            .map_err(|_| {
                RedPitayaError::connection(format!("Timeout waiting for block reply to: {}", query))
            })?
    }
}
