//! Configuration for rp-scope using Figment
//!
//! Configuration is loaded from, in increasing priority:
//! 1. built-in defaults
//! 2. `config/rp_scope.toml` (or the file passed with `--config`)
//! 3. environment variables prefixed with `RP_SCOPE_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use rp_scope::config::AppConfig;
//!
//! # fn main() -> Result<(), rp_scope::error::DaqError> {
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Instrument: {}:{}", config.instrument.host, config.instrument.port);
//! # Ok(())
//! # }
//! ```
//!
//! `RP_SCOPE_INSTRUMENT__HOST=192.168.1.20` overrides `instrument.host`.

use crate::error::{AppResult, DaqError};
use crate::logging::OutputFormat;
use daq_driver_red_pitaya::{
    AcquisitionConfig, DataFormat, DataUnits, GeneratorConfig, InstrumentAddress, TriggerSource,
    Waveform, DEFAULT_PORT,
};
use daq_serial_stream::DEFAULT_BAUD_RATE;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/rp_scope.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "RP_SCOPE_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and logging.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Red Pitaya connection.
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Default acquisition parameters.
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    /// Secondary serial device.
    #[serde(default)]
    pub serial: SerialConfig,
    /// Generator outputs applied by `rp-scope generate` when no flags are given.
    #[serde(default)]
    pub generator: Vec<GeneratorSettings>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Name shown in logs.
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rp-scope".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Compact,
        }
    }
}

/// Red Pitaya connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Hostname or IP address of the board.
    pub host: String,
    /// SCPI server port.
    pub port: u16,
    /// Use the in-process mock instead of a board.
    pub mock: bool,
    /// Per-reply timeout of the SCPI transport.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
    /// Delay between buffer-fill polls.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            host: "rp-f0c5e4.local".to_string(),
            port: DEFAULT_PORT,
            mock: false,
            command_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl InstrumentConfig {
    /// Host and port as a driver address.
    pub fn address(&self) -> InstrumentAddress {
        InstrumentAddress::new(self.host.clone(), self.port)
    }
}

/// Acquisition defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Decimation factor, 1..=65536.
    pub decimation: u32,
    /// Trigger threshold in volts.
    pub trigger_level: f64,
    /// Trigger source token, e.g. `CH1_PE`.
    pub trigger_source: TriggerSource,
    /// Trigger delay in samples.
    pub trigger_delay: i32,
    /// `ASCII` or `BIN`.
    pub data_format: DataFormat,
    /// `VOLTS` or `RAW`.
    pub data_units: DataUnits,
    /// Trigger and fill deadline.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        let d = AcquisitionConfig::default();
        Self {
            decimation: d.decimation,
            trigger_level: d.trigger_level,
            trigger_source: d.trigger_source,
            trigger_delay: d.trigger_delay,
            data_format: d.data_format,
            data_units: d.data_units,
            timeout: d.timeout,
        }
    }
}

impl AcquisitionSettings {
    /// Convert into the driver's acquisition parameters.
    pub fn to_driver(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            decimation: self.decimation,
            trigger_level: self.trigger_level,
            trigger_source: self.trigger_source,
            trigger_delay: self.trigger_delay,
            data_format: self.data_format,
            data_units: self.data_units,
            timeout: self.timeout,
        }
    }
}

/// Secondary serial device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port to open at startup; unset or `"None"` starts closed.
    pub port: Option<String>,
    /// Line speed.
    pub baud_rate: u32,
    /// Blocking read timeout of the port.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Values per line the device is expected to send.
    pub channels: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_secs(1),
            channels: 2,
        }
    }
}

/// One generator output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Output channel, 1 or 2.
    pub channel: u8,
    /// Frequency in Hz.
    pub frequency_hz: f64,
    /// Peak-to-peak amplitude in volts.
    pub amplitude_vpp: f64,
    /// DC offset in volts.
    #[serde(default)]
    pub offset_v: f64,
    /// Waveform name, e.g. `sine`, `sawu`.
    pub waveform: Waveform,
}

impl GeneratorSettings {
    /// Validate and convert into the driver's generator settings.
    pub fn to_driver(&self) -> AppResult<GeneratorConfig> {
        GeneratorConfig::new(
            self.channel,
            self.frequency_hz,
            self.amplitude_vpp,
            self.offset_v,
            self.waveform,
        )
        .map_err(|e| DaqError::Configuration(format!("generator: {}", e)))
    }
}

impl AppConfig {
    /// Load configuration from `config/rp_scope.toml` and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Self::figment(path.as_ref()).extract()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.instrument.host.trim().is_empty() {
            return Err(DaqError::Configuration("instrument.host is empty".into()));
        }
        if self.instrument.port == 0 {
            return Err(DaqError::Configuration("instrument.port must be non-zero".into()));
        }
        if self.instrument.poll_interval.is_zero() {
            return Err(DaqError::Configuration(
                "instrument.poll_interval must be greater than zero".into(),
            ));
        }

        self.acquisition
            .to_driver()
            .validate()
            .map_err(|e| DaqError::Configuration(format!("acquisition: {}", e)))?;

        if self.serial.baud_rate == 0 {
            return Err(DaqError::Configuration("serial.baud_rate must be non-zero".into()));
        }
        if self.serial.channels == 0 {
            return Err(DaqError::Configuration("serial.channels must be at least 1".into()));
        }

        let mut seen = [false; 2];
        for generator in &self.generator {
            let config = generator.to_driver()?;
            let slot = &mut seen[usize::from(config.channel().number() - 1)];
            if *slot {
                return Err(DaqError::Configuration(format!(
                    "Duplicate generator channel: {}",
                    generator.channel
                )));
            }
            *slot = true;
        }

        Ok(())
    }
}
