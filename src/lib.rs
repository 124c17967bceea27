//! # rp-scope
//!
//! Library side of the `rp-scope` command-line front-end for a Red Pitaya
//! board and a companion serial sample stream.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-based configuration (`config/rp_scope.toml` plus
//!   `RP_SCOPE_` environment overrides) and its validation.
//! - **`error`**: The `DaqError` enum wrapping driver, serial and
//!   configuration failures, with a recovery category per error.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`session`**: Builds instrument clients and serial readers from
//!   configuration and renders their output.
//!
//! The protocol work lives in the workspace crates:
//! - `daq-driver-red-pitaya`: SCPI transport, command formatting, reply
//!   decoding and the acquisition client
//! - `daq-serial-stream`: line-framed serial sample reader

pub mod config;
pub mod error;
pub mod logging;
pub mod session;

pub use daq_driver_red_pitaya as red_pitaya;
pub use daq_serial_stream as serial_stream;
