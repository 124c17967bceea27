//! CLI Entry Point for rp-scope
//!
//! Provides command-line access to:
//! - Single-shot acquisitions from both Red Pitaya inputs
//! - The two generator outputs
//! - The companion serial sample stream (single samples or start/stop bunches)
//!
//! # Usage
//!
//! ```bash
//! rp-scope acquire --decimation 64 --output frame.csv
//! rp-scope generate --channel 1 --frequency 1000 --amplitude 0.5 --waveform sine
//! rp-scope --mock probe
//! rp-scope stream --port /dev/ttyUSB0 --bunch
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use daq_driver_red_pitaya::{
    AcquisitionConfig, DataFormat, DataUnits, GeneratorConfig, TriggerSource, Waveform,
};
use daq_serial_stream::{search_ports, SerialStreamError};
use rp_scope::config::AppConfig;
use rp_scope::error::DaqError;
use rp_scope::{logging, session};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rp-scope")]
#[command(about = "Red Pitaya acquisition, signal generation and serial streaming", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override instrument host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Use the in-process mock instrument
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AcquireArgs {
    #[arg(long)]
    decimation: Option<u32>,

    /// Trigger source token, e.g. CH1_PE, NOW
    #[arg(long)]
    trigger_source: Option<TriggerSource>,

    /// Trigger level in volts
    #[arg(long, allow_negative_numbers = true)]
    trigger_level: Option<f64>,

    /// Trigger delay in samples
    #[arg(long, allow_negative_numbers = true)]
    trigger_delay: Option<i32>,

    /// ASCII or BIN
    #[arg(long)]
    format: Option<DataFormat>,

    /// VOLTS or RAW
    #[arg(long)]
    units: Option<DataUnits>,

    /// Trigger + fill deadline, e.g. "5s"
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Write CSV here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

impl AcquireArgs {
    fn apply(&self, config: &mut AcquisitionConfig) {
        if let Some(d) = self.decimation {
            config.decimation = d;
        }
        if let Some(source) = self.trigger_source {
            config.trigger_source = source;
        }
        if let Some(level) = self.trigger_level {
            config.trigger_level = level;
        }
        if let Some(delay) = self.trigger_delay {
            config.trigger_delay = delay;
        }
        if let Some(format) = self.format {
            config.data_format = format;
        }
        if let Some(units) = self.units {
            config.data_units = units;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Capture one buffer from both input channels
    Acquire(AcquireArgs),

    /// Configure and enable a generator output (all configured outputs if no channel is given)
    Generate {
        #[arg(long)]
        channel: Option<u8>,

        #[arg(long, default_value_t = 1000.0)]
        frequency: f64,

        /// Peak-to-peak amplitude in volts
        #[arg(long, default_value_t = 0.5)]
        amplitude: f64,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        offset: f64,

        #[arg(long, default_value = "sine")]
        waveform: Waveform,

        /// Send the request to the serial device instead of the Red Pitaya
        #[arg(long)]
        serial: bool,
    },

    /// Disable a generator output
    Stop {
        #[arg(long)]
        channel: u8,
    },

    /// Fire the internal trigger of both generator outputs
    Trigger,

    /// Check that the instrument answers
    Probe,

    /// List serial ports
    Ports,

    /// Read the serial sample stream
    Stream {
        /// Serial port, overrides configuration
        #[arg(long)]
        port: Option<String>,

        #[arg(long)]
        baud: Option<u32>,

        /// Read start/stop bunches instead of single samples
        #[arg(long)]
        bunch: bool,

        /// Number of reads before exiting
        #[arg(long, default_value_t = 10)]
        count: usize,

        /// Delay between reads, e.g. "100ms"
        #[arg(long, value_parser = parse_duration, default_value = "100ms")]
        interval: Duration,
    },
}

fn parse_duration(s: &str) -> Result<Duration, humantime_serde::re::humantime::DurationError> {
    humantime_serde::re::humantime::parse_duration(s)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;
    if let Some(host) = &cli.host {
        config.instrument.host = host.clone();
    }
    if cli.mock {
        config.instrument.mock = true;
    }
    config.validate()?;
    logging::init_from_config(&config)?;

    tracing::debug!("Starting {}", config.application.name);

    if let Err(e) = run(cli.command, config).await {
        tracing::error!("{}", e);
        eprintln!("error: {}\nhint: {}", e, e.recovery_hint());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Commands, config: AppConfig) -> Result<(), DaqError> {
    match command {
        Commands::Acquire(args) => {
            let mut acquisition = config.acquisition.to_driver();
            args.apply(&mut acquisition);
            let mut client = session::connect_instrument(&config.instrument).await?;
            let frame = client.acquire(&acquisition).await?;
            tracing::info!(
                "Captured {} samples per channel at {} Hz",
                frame.len(),
                frame.sample_rate_hz
            );
            match &args.output {
                Some(path) => {
                    let file = std::fs::File::create(path)?;
                    session::write_frame_csv(&frame, std::io::BufWriter::new(file))?;
                    println!("Wrote {} samples to {}", frame.len(), path.display());
                }
                None => session::write_frame_csv(&frame, std::io::stdout().lock())?,
            }
        }

        Commands::Generate {
            channel,
            frequency,
            amplitude,
            offset,
            waveform,
            serial,
        } => {
            if serial {
                let mut reader = session::open_serial(&config.serial);
                let channel = channel.unwrap_or(1);
                let waveform = waveform.to_string().to_lowercase();
                reader.send_generate(channel, amplitude, frequency, &waveform)?;
                println!("Sent generate request for channel {} over serial", channel);
                return Ok(());
            }

            let client = session::connect_instrument(&config.instrument).await?;
            match channel {
                Some(channel) => {
                    let generator =
                        GeneratorConfig::new(channel, frequency, amplitude, offset, waveform)?;
                    client.configure_generator(&generator).await?;
                    println!("Output {} enabled", channel);
                }
                None => {
                    let applied = session::apply_generators(&client, &config.generator).await?;
                    println!("{} configured output(s) enabled", applied);
                }
            }
        }

        Commands::Stop { channel } => {
            let client = session::connect_instrument(&config.instrument).await?;
            client.stop_output(channel).await?;
            println!("Output {} disabled", channel);
        }

        Commands::Trigger => {
            let client = session::connect_instrument(&config.instrument).await?;
            client.trigger_generation().await?;
            println!("Generator trigger sent");
        }

        Commands::Probe => {
            let client = session::connect_instrument(&config.instrument).await?;
            let connected = client.is_connected().await;
            println!(
                "{}: {}",
                client.address(),
                if connected { "connected" } else { "not responding" }
            );
            if connected {
                println!("decimation: {}", client.query_decimation().await?);
            }
        }

        Commands::Ports => {
            for port in search_ports()? {
                println!("{}", port);
            }
        }

        Commands::Stream {
            port,
            baud,
            bunch,
            count,
            interval,
        } => {
            let mut serial = config.serial.clone();
            if port.is_some() {
                serial.port = port;
            }
            if let Some(baud) = baud {
                serial.baud_rate = baud;
            }
            let mut reader = session::open_serial(&serial);
            reader.open()?;

            for _ in 0..count {
                if bunch {
                    match reader.collect_data_bunch() {
                        Ok(b) => println!("{}", session::format_bunch(&b)),
                        Err(SerialStreamError::NoDataRecognized(reason)) => {
                            tracing::debug!("No bunch yet: {}", reason)
                        }
                        Err(e) => return Err(e.into()),
                    }
                } else if let Some(sample) = reader.collect_data()? {
                    session::check_width(&sample, serial.channels);
                    println!("{}", session::format_sample(&sample));
                }
                tokio::time::sleep(interval).await;
            }
            reader.close();
        }
    }
    Ok(())
}
