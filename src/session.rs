//! Wiring between configuration and the instrument/serial front-ends.
//!
//! These helpers build the driver objects the CLI works with and render
//! their results, so the binary stays a thin argument dispatcher.

use crate::config::{GeneratorSettings, InstrumentConfig, SerialConfig};
use crate::error::AppResult;
use daq_driver_red_pitaya::{RedPitayaClient, SampleFrame};
use daq_serial_stream::{system_opener, SerialBunch, SerialReader, SerialSample};
use std::io::Write;

/// Connect to the configured instrument (or its mock).
pub async fn connect_instrument(config: &InstrumentConfig) -> AppResult<RedPitayaClient> {
    let address = config.address();
    let mut client = RedPitayaClient::disconnected(address.clone(), config.mock)
        .with_reply_timeout(config.command_timeout)
        .with_poll_interval(config.poll_interval);
    client.reconnect(address).await?;
    Ok(client)
}

/// Apply every configured generator output, in order.
pub async fn apply_generators(
    client: &RedPitayaClient,
    generators: &[GeneratorSettings],
) -> AppResult<usize> {
    for settings in generators {
        client.configure_generator(&settings.to_driver()?).await?;
    }
    Ok(generators.len())
}

/// Open the configured serial port, falling back to a closed reader.
pub fn open_serial(config: &SerialConfig) -> SerialReader {
    SerialReader::open_or_closed(
        config.port.as_deref(),
        config.baud_rate,
        system_opener(config.read_timeout),
    )
}

/// Write a frame as CSV: `time_us,ch1,ch2`.
pub fn write_frame_csv<W: Write>(frame: &SampleFrame, mut out: W) -> std::io::Result<()> {
    writeln!(out, "time_us,ch1,ch2")?;
    let times = frame.time_axis_us();
    for ((t, a), b) in times.iter().zip(&frame.channel1).zip(&frame.channel2) {
        writeln!(out, "{},{},{}", t, a, b)?;
    }
    Ok(())
}

/// Render a serial sample as one CSV line.
pub fn format_sample(sample: &SerialSample) -> String {
    sample
        .values()
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Render a bunch as CSV lines, one sample per line.
pub fn format_bunch(bunch: &SerialBunch) -> String {
    bunch
        .samples
        .iter()
        .map(format_sample)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Warn when a sample's width differs from the configured channel count.
pub fn check_width(sample: &SerialSample, expected: usize) {
    if sample.channels() != expected {
        tracing::warn!(
            "Serial sample has {} values, configured for {}",
            sample.channels(),
            expected
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_driver_red_pitaya::{AcquisitionConfig, Waveform};
    use std::time::Duration;

    #[test]
    fn test_frame_csv() {
        let frame = SampleFrame {
            channel1: vec![0.5, 0.25],
            channel2: vec![-1.0, 0.0],
            sample_rate_hz: 1e6,
        };
        let mut out = Vec::new();
        write_frame_csv(&frame, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "time_us,ch1,ch2\n0,0.5,-1\n1,0.25,0\n"
        );
    }

    #[test]
    fn test_format_bunch() {
        let bunch = SerialBunch {
            samples: vec![SerialSample(vec![1.0, 2.5]), SerialSample(vec![3.0, 4.0])],
        };
        assert_eq!(format_bunch(&bunch), "1,2.5\n3,4");
    }

    #[tokio::test]
    async fn test_mock_session_end_to_end() {
        let config = InstrumentConfig {
            mock: true,
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        };
        let mut client = connect_instrument(&config).await.unwrap();
        assert!(client.is_connected().await);

        let generators = vec![GeneratorSettings {
            channel: 2,
            frequency_hz: 1000.0,
            amplitude_vpp: 0.4,
            offset_v: 0.0,
            waveform: Waveform::Sine,
        }];
        assert_eq!(apply_generators(&client, &generators).await.unwrap(), 1);

        let frame = client
            .acquire(&AcquisitionConfig::default().with_decimation(64))
            .await
            .unwrap();
        let peak = frame.channel2.iter().cloned().fold(f64::MIN, f64::max);
        assert!((peak - 0.2).abs() < 1e-3, "peak {}", peak);
    }

    #[test]
    fn test_open_serial_without_port_is_closed() {
        let reader = open_serial(&SerialConfig::default());
        assert!(!reader.is_open());
    }
}
