//! Red Pitaya STEMlab acquisition and signal generator driver
//!
//! This crate talks to a Red Pitaya board over its SCPI server (TCP, default
//! port 5000) to capture single-shot buffers from both input channels and to
//! drive both generator outputs.
//!
//! # Communication
//!
//! Commands are newline-terminated ASCII, one per round trip. Channel data
//! comes back either as a `{v0,v1,...}` ASCII list or as an IEEE 488.2
//! arbitrary block of big-endian `f32` samples.
//!
//! # Usage
//!
//! ```rust,no_run
//! use daq_driver_red_pitaya::{AcquisitionConfig, InstrumentAddress, RedPitayaClient};
//!
//! # async fn run() -> Result<(), daq_driver_red_pitaya::RedPitayaError> {
//! let address = InstrumentAddress::new("rp-f0c5e4.local", 5000);
//! let mut client = RedPitayaClient::connect(address, false).await?;
//! let frame = client.acquire(&AcquisitionConfig::default()).await?;
//! println!("{} samples at {} Hz", frame.len(), frame.sample_rate_hz);
//! # Ok(())
//! # }
//! ```
//!
//! # Mock Mode
//!
//! Pass `mock = true` to [`RedPitayaClient::connect`] to run against an
//! in-process emulation that loops each generator output back into the input
//! of the same number.

pub mod acquisition;
pub mod commands;
pub mod decode;
pub mod error;
pub mod mock;
pub mod scpi;

pub use acquisition::{
    AcquisitionState, AppliedSettings, ConnectionState, RedPitayaClient, SampleFrame,
    DEFAULT_POLL_INTERVAL, MAX_CHANNEL_LENGTH_SKEW,
};
pub use commands::{
    format_acquire_config, format_generate, AcquisitionConfig, Channel, DataFormat, DataUnits,
    GeneratorConfig, TriggerSource, Waveform,
};
pub use decode::{decode_ascii, decode_binary};
pub use error::{DecodeError, ErrorCategory, RedPitayaError, RpResult};
pub use mock::MockScpiClient;
pub use scpi::{InstrumentAddress, ScpiClient, ScpiTransport, DEFAULT_PORT};
