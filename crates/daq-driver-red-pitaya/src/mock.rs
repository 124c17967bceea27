//! Mock SCPI client for running without hardware.
//!
//! Emulates the subset of the Red Pitaya SCPI server this driver talks to:
//! acquisition configuration, trigger/fill status, channel data in both
//! encodings, and generator output state. Channel data is synthesised from the
//! generator settings of the matching output, as if each output were looped
//! back into the input of the same number.

use crate::commands::{
    sample_rate_hz, Channel, DataFormat, DataUnits, Waveform, ACQ_DECIMATION_QUERY,
    ACQ_FILL_QUERY, FILL_COMPLETE, IDN_QUERY,
};
use crate::error::{RedPitayaError, RpResult};
use crate::scpi::ScpiTransport;
use async_trait::async_trait;
use std::f64::consts::TAU;
use tokio::sync::Mutex;

/// Samples per channel in the Red Pitaya acquisition buffer.
pub const BUFFER_LEN: usize = 16_384;

/// Full-scale count for RAW units (14-bit ADC, +/- 1 V).
const RAW_FULL_SCALE: f64 = 8192.0;

#[derive(Debug, Clone, Copy)]
struct OutputState {
    enabled: bool,
    waveform: Waveform,
    frequency_hz: f64,
    amplitude_vpp: f64,
    offset_v: f64,
}

impl Default for OutputState {
    fn default() -> Self {
        Self {
            enabled: false,
            waveform: Waveform::Sine,
            frequency_hz: 1000.0,
            amplitude_vpp: 1.0,
            offset_v: 0.0,
        }
    }
}

#[derive(Debug)]
struct MockState {
    decimation: u32,
    format: DataFormat,
    units: DataUnits,
    started: bool,
    armed: bool,
    polls_left: Option<u32>,
    outputs: [OutputState; 2],
    log: Vec<String>,
}

/// Mock SCPI client for testing without hardware
pub struct MockScpiClient {
    state: Mutex<MockState>,
    polls_until_fill: Option<u32>,
    buffer_len: usize,
}

impl Default for MockScpiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScpiClient {
    /// Create a mock that reports a full buffer on the third fill poll.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                decimation: 1,
                format: DataFormat::Ascii,
                units: DataUnits::Volts,
                started: false,
                armed: false,
                polls_left: None,
                outputs: [OutputState::default(); 2],
                log: Vec::new(),
            }),
            polls_until_fill: Some(3),
            buffer_len: BUFFER_LEN,
        }
    }

    /// Number of fill polls answered with `0` before the buffer reports full.
    /// `None` never fills.
    pub fn with_fill_after(mut self, polls: Option<u32>) -> Self {
        self.polls_until_fill = polls;
        self
    }

    /// Samples returned per channel (default [`BUFFER_LEN`]).
    pub fn with_buffer_len(mut self, len: usize) -> Self {
        self.buffer_len = len;
        self
    }

    /// Commands written so far, in order.
    pub async fn command_log(&self) -> Vec<String> {
        self.state.lock().await.log.clone()
    }

    /// Whether generator output `channel` is currently enabled.
    pub async fn output_enabled(&self, channel: Channel) -> bool {
        self.state.lock().await.outputs[index(channel)].enabled
    }

    fn samples(&self, state: &MockState, channel: Channel) -> Vec<f64> {
        let out = state.outputs[index(channel)];
        let fs = sample_rate_hz(state.decimation);
        (0..self.buffer_len)
            .map(|i| {
                let volts = if out.enabled {
                    let phase = (out.frequency_hz * i as f64 / fs).fract();
                    out.offset_v + out.amplitude_vpp / 2.0 * shape(out.waveform, phase)
                } else {
                    0.0
                };
                match state.units {
                    DataUnits::Volts => volts,
                    DataUnits::Raw => (volts * RAW_FULL_SCALE).round(),
                }
            })
            .collect()
    }

    fn apply(&self, state: &mut MockState, command: &str) -> RpResult<()> {
        let (head, arg) = match command.split_once(' ') {
            Some((head, arg)) => (head.to_ascii_uppercase(), Some(arg.trim())),
            None => (command.to_ascii_uppercase(), None),
        };

        match (head.as_str(), arg) {
            ("ACQ:RST", None) => {
                state.started = false;
                state.armed = false;
                state.polls_left = None;
            }
            ("ACQ:START", None) => state.started = true,
            ("ACQ:STOP", None) => {
                state.started = false;
                state.armed = false;
            }
            ("ACQ:DATA:FORMAT", Some(v)) => state.format = v.parse()?,
            ("ACQ:DATA:UNITS", Some(v)) => state.units = v.parse()?,
            ("ACQ:DEC", Some(v)) => state.decimation = parse_num(command, v)?,
            ("ACQ:TRIG:DLY", Some(v)) => {
                parse_num::<i32>(command, v)?;
            }
            ("ACQ:TRIG:LEV", Some(v)) => {
                parse_num::<f64>(command, v)?;
            }
            ("ACQ:TRIG", Some(v)) => {
                let disabled = v.eq_ignore_ascii_case("DISABLED");
                state.armed = !disabled;
                state.polls_left = if disabled { None } else { self.polls_until_fill };
            }
            ("SOUR:TRIG:INT", None) => {}
            _ => return self.apply_output(state, &head, arg, command),
        }
        Ok(())
    }

    fn apply_output(
        &self,
        state: &mut MockState,
        head: &str,
        arg: Option<&str>,
        command: &str,
    ) -> RpResult<()> {
        if let Some(rest) = head.strip_prefix("OUTPUT") {
            let Some((n, tail)) = split_channel(rest) else {
                return unknown(command);
            };
            let out = &mut state.outputs[output_index(n, command)?];
            match (tail, arg) {
                (":STATE", Some(v)) => out.enabled = v.eq_ignore_ascii_case("ON"),
                _ => return unknown(command),
            }
            return Ok(());
        }

        if let Some(rest) = head.strip_prefix("SOUR") {
            let Some((n, tail)) = split_channel(rest) else {
                return unknown(command);
            };
            let out = &mut state.outputs[output_index(n, command)?];
            match (tail, arg) {
                (":FUNC:RESET", None) => *out = OutputState::default(),
                (":FUNC", Some(v)) => out.waveform = v.parse()?,
                (":FREQ:FIX", Some(v)) => out.frequency_hz = parse_num(command, v)?,
                (":VOLT", Some(v)) => out.amplitude_vpp = parse_num(command, v)?,
                (":VOLT:OFFS", Some(v)) => out.offset_v = parse_num(command, v)?,
                (":TRIG:INT", None) => {}
                _ => return unknown(command),
            }
            return Ok(());
        }

        unknown(command)
    }
}

#[async_trait]
impl ScpiTransport for MockScpiClient {
    async fn write(&self, command: &str) -> RpResult<()> {
        tracing::debug!("Mock SCPI write: {}", command);
        let mut state = self.state.lock().await;
        state.log.push(command.to_string());
        self.apply(&mut state, command)
    }

    async fn query(&self, query: &str) -> RpResult<String> {
        tracing::debug!("Mock SCPI query: {}", query);
        let mut state = self.state.lock().await;
        let upper = query.to_ascii_uppercase();

        match upper.as_str() {
            IDN_QUERY => Ok("REDPITAYA,INSTR2020,MOCK,0.0.0".to_string()),
            ACQ_DECIMATION_QUERY => Ok(state.decimation.to_string()),
            ACQ_FILL_QUERY => {
                if !(state.started && state.armed) {
                    return Ok("0".to_string());
                }
                match state.polls_left {
                    Some(0) => Ok(FILL_COMPLETE.to_string()),
                    Some(n) => {
                        state.polls_left = Some(n - 1);
                        Ok("0".to_string())
                    }
                    None => Ok("0".to_string()),
                }
            }
            _ => {
                let channel = data_query_channel(&upper).ok_or_else(|| {
                    RedPitayaError::connection(format!("Unknown mock query: {}", query))
                })?;
                let values = self.samples(&state, channel);
                let body = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                Ok(format!("{{{}}}", body))
            }
        }
    }

    async fn query_block(&self, query: &str) -> RpResult<Vec<u8>> {
        tracing::debug!("Mock SCPI block query: {}", query);
        let state = self.state.lock().await;
        let channel = data_query_channel(&query.to_ascii_uppercase()).ok_or_else(|| {
            RedPitayaError::connection(format!("Unknown mock block query: {}", query))
        })?;
        if state.format != DataFormat::Binary {
            tracing::warn!("Mock block query while data format is {:?}", state.format);
        }
        Ok(self
            .samples(&state, channel)
            .into_iter()
            .flat_map(|v| (v as f32).to_be_bytes())
            .collect())
    }
}

fn index(channel: Channel) -> usize {
    usize::from(channel.number() - 1)
}

fn split_channel(rest: &str) -> Option<(char, &str)> {
    let mut chars = rest.chars();
    let n = chars.next()?;
    Some((n, chars.as_str()))
}

fn output_index(n: char, command: &str) -> RpResult<usize> {
    n.to_digit(10)
        .and_then(|d| Channel::try_from(d as u8).ok())
        .map(index)
        .ok_or_else(|| RedPitayaError::invalid(format!("Bad channel in mock command: {}", command)))
}

fn data_query_channel(upper: &str) -> Option<Channel> {
    match upper {
        "ACQ:SOUR1:DATA?" => Some(Channel::One),
        "ACQ:SOUR2:DATA?" => Some(Channel::Two),
        _ => None,
    }
}

fn parse_num<T: std::str::FromStr>(command: &str, value: &str) -> RpResult<T> {
    value
        .parse()
        .map_err(|_| RedPitayaError::invalid(format!("Bad value in mock command: {}", command)))
}

fn unknown(command: &str) -> RpResult<()> {
    tracing::warn!("Unknown mock command: {}", command);
    Ok(())
}

/// Normalised waveform value in [-1, 1] for `phase` in [0, 1).
fn shape(waveform: Waveform, phase: f64) -> f64 {
    match waveform {
        Waveform::Sine | Waveform::Arbitrary => (TAU * phase).sin(),
        Waveform::Square | Waveform::Pwm => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        Waveform::SawUp => 2.0 * phase - 1.0,
        Waveform::SawDown => 1.0 - 2.0 * phase,
        Waveform::Dc => 1.0,
        Waveform::DcNeg => -1.0,
    }
}
