//! SCPI command vocabulary and formatting.
//!
//! Everything in here is pure: typed parameters go in, command strings come
//! out. Validation happens before any string is built, so an invalid request
//! can never reach the transport.
//!
//! # Acquisition order
//!
//! [`format_acquire_config`] emits:
//!
//! ```text
//! ACQ:RST
//! ACQ:DATA:FORMAT <ASCII|BIN>
//! ACQ:DATA:UNITS <VOLTS|RAW>
//! ACQ:DEC <n>
//! ACQ:TRIG:DLY <samples>
//! ACQ:TRIG:LEV <volts>
//! ACQ:START
//! ACQ:TRIG <source>
//! ```
//!
//! The trigger is armed last, after the buffer is configured and started.

use crate::error::{RedPitayaError, RpResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Highest generator frequency supported by the fast DAC.
pub const MAX_FREQUENCY_HZ: f64 = 62.5e6;

/// Trigger delay bound, in samples, either side of the trigger point.
pub const MAX_TRIGGER_DELAY: i32 = 8192;

/// Largest decimation factor accepted by `ACQ:DEC`.
pub const MAX_DECIMATION: u32 = 65_536;

/// Undecimated ADC sample clock.
pub const BASE_SAMPLE_RATE_HZ: f64 = 125e6;

/// Reset acquisition settings to defaults.
pub const ACQ_RESET: &str = "ACQ:RST";
/// Start continuous sampling into the buffer.
pub const ACQ_START: &str = "ACQ:START";
/// Stop sampling.
pub const ACQ_STOP: &str = "ACQ:STOP";
/// Buffer-full flag; replies `1` once the post-trigger buffer is filled.
pub const ACQ_FILL_QUERY: &str = "ACQ:TRIG:FILL?";
/// Current decimation factor.
pub const ACQ_DECIMATION_QUERY: &str = "ACQ:DEC?";
/// Fire the internal trigger of both generator outputs.
pub const GEN_TRIGGER_ALL: &str = "SOUR:TRIG:INT";
/// Instrument identification.
pub const IDN_QUERY: &str = "*IDN?";

/// Reply to [`ACQ_FILL_QUERY`] once the buffer is full.
pub const FILL_COMPLETE: &str = "1";

// =============================================================================
// Parameter enums
// =============================================================================

/// Fast analog channel (input or output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Channel {
    /// Input/output 1.
    One,
    /// Input/output 2.
    Two,
}

impl Channel {
    /// Both channels, in fetch order.
    pub const ALL: [Channel; 2] = [Channel::One, Channel::Two];

    /// Channel number as used in SCPI headers.
    pub fn number(self) -> u8 {
        match self {
            Channel::One => 1,
            Channel::Two => 2,
        }
    }
}

impl TryFrom<u8> for Channel {
    type Error = RedPitayaError;

    fn try_from(value: u8) -> RpResult<Self> {
        match value {
            1 => Ok(Channel::One),
            2 => Ok(Channel::Two),
            other => Err(RedPitayaError::invalid(format!(
                "channel must be 1 or 2, got {}",
                other
            ))),
        }
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        channel.number()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Generator waveform shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    /// Sine wave.
    Sine,
    /// Square wave.
    Square,
    /// Triangle wave.
    Triangle,
    /// Rising sawtooth.
    #[serde(rename = "sawu")]
    SawUp,
    /// Falling sawtooth.
    #[serde(rename = "sawd")]
    SawDown,
    /// Pulse-width modulated square.
    Pwm,
    /// User-defined arbitrary waveform.
    Arbitrary,
    /// Constant positive level.
    Dc,
    /// Constant negative level.
    DcNeg,
}

impl Waveform {
    /// Every waveform, in SCPI token order.
    pub const ALL: [Waveform; 9] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Triangle,
        Waveform::SawUp,
        Waveform::SawDown,
        Waveform::Pwm,
        Waveform::Arbitrary,
        Waveform::Dc,
        Waveform::DcNeg,
    ];

    /// Token used by `SOUR<n>:FUNC`.
    pub fn as_scpi(self) -> &'static str {
        match self {
            Waveform::Sine => "SINE",
            Waveform::Square => "SQUARE",
            Waveform::Triangle => "TRIANGLE",
            Waveform::SawUp => "SAWU",
            Waveform::SawDown => "SAWD",
            Waveform::Pwm => "PWM",
            Waveform::Arbitrary => "ARBITRARY",
            Waveform::Dc => "DC",
            Waveform::DcNeg => "DC_NEG",
        }
    }
}

impl FromStr for Waveform {
    type Err = RedPitayaError;

    fn from_str(s: &str) -> RpResult<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Waveform::ALL
            .into_iter()
            .find(|wf| wf.as_scpi() == wanted)
            .ok_or_else(|| {
                RedPitayaError::invalid(format!(
                    "waveform must be one of sine, square, triangle, sawu, sawd, pwm, arbitrary, dc, dc_neg; got '{}'",
                    s
                ))
            })
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_scpi())
    }
}

/// Acquisition trigger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSource {
    /// Trigger immediately.
    Now,
    /// Channel 1, rising edge.
    Ch1Pe,
    /// Channel 1, falling edge.
    Ch1Ne,
    /// Channel 2, rising edge.
    Ch2Pe,
    /// Channel 2, falling edge.
    Ch2Ne,
    /// External trigger input, rising edge.
    ExtPe,
    /// External trigger input, falling edge.
    ExtNe,
    /// Generator trigger, rising edge.
    AwgPe,
    /// Generator trigger, falling edge.
    AwgNe,
    /// Trigger off; the buffer never reports full.
    Disabled,
}

impl TriggerSource {
    /// Every trigger source.
    pub const ALL: [TriggerSource; 10] = [
        TriggerSource::Now,
        TriggerSource::Ch1Pe,
        TriggerSource::Ch1Ne,
        TriggerSource::Ch2Pe,
        TriggerSource::Ch2Ne,
        TriggerSource::ExtPe,
        TriggerSource::ExtNe,
        TriggerSource::AwgPe,
        TriggerSource::AwgNe,
        TriggerSource::Disabled,
    ];

    /// SCPI token, e.g. `CH1_PE`.
    pub fn as_scpi(self) -> &'static str {
        match self {
            TriggerSource::Now => "NOW",
            TriggerSource::Ch1Pe => "CH1_PE",
            TriggerSource::Ch1Ne => "CH1_NE",
            TriggerSource::Ch2Pe => "CH2_PE",
            TriggerSource::Ch2Ne => "CH2_NE",
            TriggerSource::ExtPe => "EXT_PE",
            TriggerSource::ExtNe => "EXT_NE",
            TriggerSource::AwgPe => "AWG_PE",
            TriggerSource::AwgNe => "AWG_NE",
            TriggerSource::Disabled => "DISABLED",
        }
    }
}

impl FromStr for TriggerSource {
    type Err = RedPitayaError;

    fn from_str(s: &str) -> RpResult<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        TriggerSource::ALL
            .into_iter()
            .find(|src| src.as_scpi() == wanted)
            .ok_or_else(|| RedPitayaError::invalid(format!("unknown trigger source '{}'", s)))
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_scpi())
    }
}

/// Encoding of channel data replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFormat {
    /// Comma-separated text in braces.
    #[serde(rename = "ASCII", alias = "ascii")]
    Ascii,
    /// Big-endian f32 arbitrary block.
    #[serde(rename = "BIN", alias = "bin", alias = "BINARY", alias = "binary")]
    Binary,
}

impl DataFormat {
    /// SCPI token used by `ACQ:DATA:FORMAT`.
    pub fn as_scpi(self) -> &'static str {
        match self {
            DataFormat::Ascii => "ASCII",
            DataFormat::Binary => "BIN",
        }
    }
}

impl FromStr for DataFormat {
    type Err = RedPitayaError;

    fn from_str(s: &str) -> RpResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASCII" => Ok(DataFormat::Ascii),
            "BIN" | "BINARY" => Ok(DataFormat::Binary),
            _ => Err(RedPitayaError::invalid(format!("unknown data format '{}'", s))),
        }
    }
}

/// Units of channel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataUnits {
    /// Samples scaled to volts.
    #[serde(rename = "VOLTS", alias = "volts")]
    Volts,
    /// Raw ADC counts.
    #[serde(rename = "RAW", alias = "raw")]
    Raw,
}

impl DataUnits {
    /// SCPI token used by `ACQ:DATA:UNITS`.
    pub fn as_scpi(self) -> &'static str {
        match self {
            DataUnits::Volts => "VOLTS",
            DataUnits::Raw => "RAW",
        }
    }
}

impl FromStr for DataUnits {
    type Err = RedPitayaError;

    fn from_str(s: &str) -> RpResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VOLTS" => Ok(DataUnits::Volts),
            "RAW" => Ok(DataUnits::Raw),
            _ => Err(RedPitayaError::invalid(format!("unknown data units '{}'", s))),
        }
    }
}

// =============================================================================
// AcquisitionConfig
// =============================================================================

/// Parameters for one acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Divisor applied to the 125 MS/s sample clock.
    pub decimation: u32,
    /// Trigger threshold in volts.
    pub trigger_level: f64,
    /// Edge that triggers the capture.
    pub trigger_source: TriggerSource,
    /// Trigger delay in samples, within +/- [`MAX_TRIGGER_DELAY`].
    pub trigger_delay: i32,
    /// Encoding of channel data replies.
    pub data_format: DataFormat,
    /// Units of channel data.
    pub data_units: DataUnits,
    /// Deadline for the trigger + buffer fill phase.
    pub timeout: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            decimation: 8,
            trigger_level: 0.1,
            trigger_source: TriggerSource::Ch1Pe,
            trigger_delay: 0,
            data_format: DataFormat::Binary,
            data_units: DataUnits::Volts,
            timeout: Duration::from_secs(5),
        }
    }
}

impl AcquisitionConfig {
    /// Set the decimation factor.
    pub fn with_decimation(mut self, decimation: u32) -> Self {
        self.decimation = decimation;
        self
    }

    /// Set the trigger source and threshold in volts.
    pub fn with_trigger(mut self, source: TriggerSource, level: f64) -> Self {
        self.trigger_source = source;
        self.trigger_level = level;
        self
    }

    /// Set the trigger delay in samples.
    pub fn with_trigger_delay(mut self, delay: i32) -> Self {
        self.trigger_delay = delay;
        self
    }

    /// Set the reply encoding.
    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.data_format = format;
        self
    }

    /// Set the data units.
    pub fn with_units(mut self, units: DataUnits) -> Self {
        self.data_units = units;
        self
    }

    /// Set the trigger and fill deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check every field against the instrument's accepted ranges.
    pub fn validate(&self) -> RpResult<()> {
        validate_decimation(self.decimation)?;
        if !self.trigger_level.is_finite() {
            return Err(RedPitayaError::invalid(format!(
                "trigger level must be finite, got {}",
                self.trigger_level
            )));
        }
        if !(-MAX_TRIGGER_DELAY..=MAX_TRIGGER_DELAY).contains(&self.trigger_delay) {
            return Err(RedPitayaError::invalid(format!(
                "trigger delay must be within [-{max}, {max}] samples, got {}",
                self.trigger_delay,
                max = MAX_TRIGGER_DELAY
            )));
        }
        if self.timeout.is_zero() {
            return Err(RedPitayaError::invalid("timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Effective sample rate after decimation.
    pub fn sample_rate_hz(&self) -> f64 {
        sample_rate_hz(self.decimation)
    }
}

/// Effective sample rate for a decimation factor.
pub fn sample_rate_hz(decimation: u32) -> f64 {
    BASE_SAMPLE_RATE_HZ / f64::from(decimation.max(1))
}

pub(crate) fn validate_decimation(decimation: u32) -> RpResult<()> {
    if !(1..=MAX_DECIMATION).contains(&decimation) {
        return Err(RedPitayaError::invalid(format!(
            "decimation must be within 1..={}, got {}",
            MAX_DECIMATION, decimation
        )));
    }
    Ok(())
}

// =============================================================================
// GeneratorConfig
// =============================================================================

/// Validated signal generator settings for one output channel.
///
/// Fields are private: a `GeneratorConfig` that exists has already passed
/// the supply-rail checks.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    channel: Channel,
    frequency_hz: f64,
    amplitude_vpp: f64,
    offset_v: f64,
    waveform: Waveform,
    rearm_trigger: bool,
}

impl GeneratorConfig {
    /// Validate and build generator settings.
    ///
    /// # Errors
    /// `InvalidParameter` when the channel is not 1 or 2, the frequency is
    /// outside (0, 62.5 MHz], the amplitude is outside [0, 1] Vpp, or
    /// `|offset| + amplitude` exceeds 1 V.
    pub fn new(
        channel: u8,
        frequency_hz: f64,
        amplitude_vpp: f64,
        offset_v: f64,
        waveform: Waveform,
    ) -> RpResult<Self> {
        let channel = Channel::try_from(channel)?;
        if !(frequency_hz > 0.0 && frequency_hz <= MAX_FREQUENCY_HZ) {
            return Err(RedPitayaError::invalid(format!(
                "frequency must be within (0, {}] Hz, got {}",
                MAX_FREQUENCY_HZ, frequency_hz
            )));
        }
        if !(0.0..=1.0).contains(&amplitude_vpp) {
            return Err(RedPitayaError::invalid(format!(
                "amplitude must be within [0, 1] Vpp, got {}",
                amplitude_vpp
            )));
        }
        if !offset_v.is_finite() || offset_v.abs() + amplitude_vpp > 1.0 {
            return Err(RedPitayaError::invalid(format!(
                "|offset| + amplitude exceeds the 1 V supply rail (offset {}, amplitude {})",
                offset_v, amplitude_vpp
            )));
        }
        Ok(Self {
            channel,
            frequency_hz,
            amplitude_vpp,
            offset_v,
            waveform,
            rearm_trigger: true,
        })
    }

    /// Whether to send `SOUR<n>:TRIG:INT` before enabling the output.
    pub fn with_trigger_rearm(mut self, rearm: bool) -> Self {
        self.rearm_trigger = rearm;
        self
    }

    /// Output channel.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Frequency in Hz.
    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    /// Peak-to-peak amplitude in volts.
    pub fn amplitude_vpp(&self) -> f64 {
        self.amplitude_vpp
    }

    /// DC offset in volts.
    pub fn offset_v(&self) -> f64 {
        self.offset_v
    }

    /// Waveform shape.
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Command sequence that applies these settings and enables the output.
    pub fn commands(&self) -> Vec<String> {
        let n = self.channel.number();
        let mut cmds = vec![
            reset_channel(self.channel),
            format!("SOUR{}:FUNC {}", n, self.waveform.as_scpi()),
            format!("SOUR{}:FREQ:FIX {}", n, self.frequency_hz),
            format!("SOUR{}:VOLT {}", n, self.amplitude_vpp),
            format!("SOUR{}:VOLT:OFFS {}", n, self.offset_v),
        ];
        if self.rearm_trigger {
            cmds.push(format!("SOUR{}:TRIG:INT", n));
        }
        cmds.push(format!("OUTPUT{}:STATE ON", n));
        cmds
    }
}

// =============================================================================
// Formatters
// =============================================================================

/// Validate generator parameters and build their command sequence.
pub fn format_generate(
    channel: u8,
    frequency_hz: f64,
    amplitude_vpp: f64,
    offset_v: f64,
    waveform: &str,
) -> RpResult<Vec<String>> {
    let waveform: Waveform = waveform.parse()?;
    let config = GeneratorConfig::new(channel, frequency_hz, amplitude_vpp, offset_v, waveform)?;
    Ok(config.commands())
}

/// Validate an acquisition config and build the configure/start/arm sequence.
pub fn format_acquire_config(config: &AcquisitionConfig) -> RpResult<Vec<String>> {
    config.validate()?;
    Ok(vec![
        ACQ_RESET.to_string(),
        format!("ACQ:DATA:FORMAT {}", config.data_format.as_scpi()),
        format!("ACQ:DATA:UNITS {}", config.data_units.as_scpi()),
        set_decimation(config.decimation),
        format!("ACQ:TRIG:DLY {}", config.trigger_delay),
        format!("ACQ:TRIG:LEV {}", config.trigger_level),
        ACQ_START.to_string(),
        arm_trigger(config.trigger_source),
    ])
}

/// Acquisition settings without reset, start or delay.
///
/// Used to pre-load the instrument while no capture is running.
pub fn format_acquisition_settings(config: &AcquisitionConfig) -> RpResult<Vec<String>> {
    config.validate()?;
    Ok(vec![
        set_decimation(config.decimation),
        format!("ACQ:DATA:UNITS {}", config.data_units.as_scpi()),
        format!("ACQ:DATA:FORMAT {}", config.data_format.as_scpi()),
        format!("ACQ:TRIG:LEV {}", config.trigger_level),
        arm_trigger(config.trigger_source),
    ])
}

/// `ACQ:DEC <n>`.
pub fn set_decimation(decimation: u32) -> String {
    format!("ACQ:DEC {}", decimation)
}

/// `ACQ:TRIG <source>`.
pub fn arm_trigger(source: TriggerSource) -> String {
    format!("ACQ:TRIG {}", source.as_scpi())
}

/// `ACQ:SOUR<n>:DATA?`.
pub fn channel_data_query(channel: Channel) -> String {
    format!("ACQ:SOUR{}:DATA?", channel.number())
}

/// `SOUR<n>:FUNC:RESET`.
pub fn reset_channel(channel: Channel) -> String {
    format!("SOUR{}:FUNC:RESET", channel.number())
}

/// `OUTPUT<n>:STATE OFF`.
pub fn output_off(channel: Channel) -> String {
    format!("OUTPUT{}:STATE OFF", channel.number())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of(cmd: &str) -> f64 {
        cmd.rsplit(' ').next().unwrap().parse().unwrap()
    }

    #[test]
    fn generate_sequence_order() {
        let cmds = format_generate(1, 15000.0, 0.75, 0.0, "sine").unwrap();
        assert_eq!(
            cmds,
            vec![
                "SOUR1:FUNC:RESET",
                "SOUR1:FUNC SINE",
                "SOUR1:FREQ:FIX 15000",
                "SOUR1:VOLT 0.75",
                "SOUR1:VOLT:OFFS 0",
                "SOUR1:TRIG:INT",
                "OUTPUT1:STATE ON",
            ]
        );
    }

    #[test]
    fn generate_without_rearm() {
        let cfg = GeneratorConfig::new(2, 1e3, 0.5, 0.1, Waveform::Square)
            .unwrap()
            .with_trigger_rearm(false);
        let cmds = cfg.commands();
        assert_eq!(cmds.len(), 6);
        assert!(!cmds.iter().any(|c| c.contains("TRIG")));
        assert_eq!(cmds.last().unwrap(), "OUTPUT2:STATE ON");
    }

    #[test]
    fn numeric_tokens_round_trip() {
        let cases = [
            (1.0, 0.123456789, -0.000001),
            (62.5e6, 1.0, 0.0),
            (0.001, 0.333333333333, 0.666666666666),
            (12345.678901234, 0.1, -0.2),
        ];
        for (freq, amp, offset) in cases {
            let cmds = format_generate(1, freq, amp, offset, "triangle").unwrap();
            assert_eq!(value_of(&cmds[2]), freq);
            assert_eq!(value_of(&cmds[3]), amp);
            assert_eq!(value_of(&cmds[4]), offset);
        }
    }

    #[test]
    fn waveform_tokens_round_trip() {
        for wf in Waveform::ALL {
            let cmds = format_generate(2, 100.0, 0.5, 0.0, &wf.to_string()).unwrap();
            let token = cmds[1].rsplit(' ').next().unwrap();
            assert_eq!(token.parse::<Waveform>().unwrap(), wf);
        }
        assert_eq!("dc_neg".parse::<Waveform>().unwrap(), Waveform::DcNeg);
        assert_eq!("SawU".parse::<Waveform>().unwrap(), Waveform::SawUp);
    }

    #[test]
    fn rail_violation_rejected() {
        let cases = [(0.6, 0.5), (1.0, 0.1), (1.0, -0.1), (0.0, 1.01), (0.5, -0.75)];
        for (amp, offset) in cases {
            let err = format_generate(1, 1000.0, amp, offset, "sine").unwrap_err();
            assert!(
                matches!(err, RedPitayaError::InvalidParameter(_)),
                "amp {} offset {}",
                amp,
                offset
            );
        }
        // exactly on the rail is fine
        assert!(format_generate(1, 1000.0, 0.25, 0.75, "sine").is_ok());
    }

    #[test]
    fn out_of_range_parameters_rejected() {
        assert!(format_generate(0, 1000.0, 0.5, 0.0, "sine").is_err());
        assert!(format_generate(3, 1000.0, 0.5, 0.0, "sine").is_err());
        assert!(format_generate(1, 0.0, 0.5, 0.0, "sine").is_err());
        assert!(format_generate(1, 62.5e6 + 1.0, 0.5, 0.0, "sine").is_err());
        assert!(format_generate(1, f64::NAN, 0.5, 0.0, "sine").is_err());
        assert!(format_generate(1, 1000.0, -0.1, 0.0, "sine").is_err());
        assert!(format_generate(1, 1000.0, 1.5, 0.0, "sine").is_err());
        assert!(format_generate(1, 1000.0, 0.5, f64::NAN, "sine").is_err());
        assert!(format_generate(1, 1000.0, 0.5, 0.0, "sinc").is_err());
    }

    #[test]
    fn acquire_sequence_arms_last() {
        let cfg = AcquisitionConfig::default()
            .with_decimation(64)
            .with_trigger(TriggerSource::Ch2Ne, -0.25)
            .with_trigger_delay(-100)
            .with_format(DataFormat::Ascii)
            .with_units(DataUnits::Raw);
        let cmds = format_acquire_config(&cfg).unwrap();
        assert_eq!(
            cmds,
            vec![
                "ACQ:RST",
                "ACQ:DATA:FORMAT ASCII",
                "ACQ:DATA:UNITS RAW",
                "ACQ:DEC 64",
                "ACQ:TRIG:DLY -100",
                "ACQ:TRIG:LEV -0.25",
                "ACQ:START",
                "ACQ:TRIG CH2_NE",
            ]
        );
    }

    #[test]
    fn acquire_config_validation() {
        let base = AcquisitionConfig::default();
        assert!(format_acquire_config(&base.clone().with_decimation(0)).is_err());
        assert!(format_acquire_config(&base.clone().with_decimation(MAX_DECIMATION + 1)).is_err());
        assert!(format_acquire_config(&base.clone().with_trigger_delay(8193)).is_err());
        assert!(format_acquire_config(&base.clone().with_trigger_delay(-8193)).is_err());
        assert!(format_acquire_config(&base.clone().with_trigger_delay(8192)).is_ok());
        assert!(format_acquire_config(&base.clone().with_timeout(Duration::ZERO)).is_err());
        assert!(
            format_acquire_config(&base.with_trigger(TriggerSource::Now, f64::INFINITY)).is_err()
        );
    }

    #[test]
    fn settings_sequence_has_no_start() {
        let cmds = format_acquisition_settings(&AcquisitionConfig::default()).unwrap();
        assert_eq!(cmds[0], "ACQ:DEC 8");
        assert!(!cmds.iter().any(|c| c == ACQ_START || c == ACQ_RESET));
        assert_eq!(cmds.last().unwrap(), "ACQ:TRIG CH1_PE");
    }

    #[test]
    fn parse_enums_case_insensitive() {
        assert_eq!("ch1_pe".parse::<TriggerSource>().unwrap(), TriggerSource::Ch1Pe);
        assert_eq!("NOW".parse::<TriggerSource>().unwrap(), TriggerSource::Now);
        assert!("CH3_PE".parse::<TriggerSource>().is_err());
        assert_eq!("bin".parse::<DataFormat>().unwrap(), DataFormat::Binary);
        assert_eq!("Ascii".parse::<DataFormat>().unwrap(), DataFormat::Ascii);
        assert_eq!("Volts".parse::<DataUnits>().unwrap(), DataUnits::Volts);
    }

    #[test]
    fn sample_rate_follows_decimation() {
        let cfg = AcquisitionConfig::default().with_decimation(8);
        assert_eq!(cfg.sample_rate_hz(), 15.625e6);
        assert_eq!(sample_rate_hz(1), 125e6);
    }

    #[test]
    fn single_command_helpers() {
        assert_eq!(channel_data_query(Channel::Two), "ACQ:SOUR2:DATA?");
        assert_eq!(output_off(Channel::One), "OUTPUT1:STATE OFF");
        assert_eq!(reset_channel(Channel::Two), "SOUR2:FUNC:RESET");
        assert!(Channel::try_from(0).is_err());
    }
}
