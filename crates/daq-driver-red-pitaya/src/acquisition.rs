//! Red Pitaya acquisition and generator client.
//!
//! [`RedPitayaClient`] owns one transport to one instrument and drives a
//! single-shot capture through its states:
//!
//! ```text
//! Idle -> Configuring -> Armed -> Polling -> Fetching -> Done
//!                                   |           |
//!                                   v           v
//!                               TimedOut      Failed
//! ```
//!
//! `Configuring` sends the reset/format/decimation/trigger sequence and arms
//! the trigger. `Polling` queries `ACQ:TRIG:FILL?` until the instrument
//! reports a full buffer or the caller's deadline passes. `Fetching` reads
//! channel 1 then channel 2. Whatever the outcome after arming, a best-effort
//! `ACQ:STOP` is sent and its failure is only logged.
//!
//! Only one acquisition runs at a time; `acquire` takes `&mut self`.

use crate::commands::{
    arm_trigger, channel_data_query, format_acquire_config, format_acquisition_settings,
    output_off, reset_channel, sample_rate_hz, set_decimation, validate_decimation,
    AcquisitionConfig, Channel, DataFormat, GeneratorConfig, TriggerSource,
    ACQ_DECIMATION_QUERY, ACQ_FILL_QUERY, ACQ_STOP, FILL_COMPLETE, GEN_TRIGGER_ALL, IDN_QUERY,
};
use crate::decode::{decode_ascii, decode_binary};
use crate::error::{RedPitayaError, RpResult};
use crate::mock::MockScpiClient;
use crate::scpi::{InstrumentAddress, ScpiClient, ScpiTransport, DEFAULT_TIMEOUT_MS};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

/// Delay between two `ACQ:TRIG:FILL?` polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Largest channel length difference that is truncated instead of rejected.
pub const MAX_CHANNEL_LENGTH_SKEW: usize = 16;

/// Phase of the most recent acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    /// No acquisition has run yet.
    #[default]
    Idle,
    /// Writing the configuration sequence.
    Configuring,
    /// Trigger armed on a running acquisition.
    Armed,
    /// Waiting for the buffer-full flag.
    Polling,
    /// Reading channel data.
    Fetching,
    /// Both channels decoded.
    Done,
    /// The buffer did not fill before the deadline.
    TimedOut,
    /// A command, query or decode step failed.
    Failed,
}

/// Whether the client currently holds a live transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    /// A transport is open.
    pub connected: bool,
}

/// Acquisition settings last written to the instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedSettings {
    /// Decimation factor.
    pub decimation: u32,
    /// Trigger threshold in volts.
    pub trigger_level: f64,
    /// Trigger source the acquisition was armed with.
    pub trigger_source: TriggerSource,
}

impl From<&AcquisitionConfig> for AppliedSettings {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            decimation: config.decimation,
            trigger_level: config.trigger_level,
            trigger_source: config.trigger_source,
        }
    }
}

/// One captured buffer from both input channels.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    /// Input 1 samples.
    pub channel1: Vec<f64>,
    /// Input 2 samples, same length as `channel1`.
    pub channel2: Vec<f64>,
    /// Effective sample rate the frame was captured at.
    pub sample_rate_hz: f64,
}

impl SampleFrame {
    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channel1.len()
    }

    /// True when no samples were captured.
    pub fn is_empty(&self) -> bool {
        self.channel1.is_empty()
    }

    /// Sample timestamps in microseconds from the start of the buffer.
    pub fn time_axis_us(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| i as f64 / self.sample_rate_hz * 1e6)
            .collect()
    }
}

/// Client for one Red Pitaya board.
pub struct RedPitayaClient {
    address: InstrumentAddress,
    transport: Option<Arc<dyn ScpiTransport>>,
    mock: bool,
    reply_timeout: Duration,
    poll_interval: Duration,
    state: AcquisitionState,
    applied: Option<AppliedSettings>,
}

impl RedPitayaClient {
    /// Connect to the instrument at `address`.
    ///
    /// With `mock` set, an in-process [`MockScpiClient`] stands in for the
    /// board and nothing touches the network.
    ///
    /// # Errors
    /// `Connection` if the host cannot be resolved or reached.
    pub async fn connect(address: InstrumentAddress, mock: bool) -> RpResult<Self> {
        let mut client = Self::disconnected(address, mock);
        client.transport = Some(open_transport(&client.address, mock, client.reply_timeout).await?);
        tracing::info!("Red Pitaya client initialized (mock={})", mock);
        Ok(client)
    }

    /// Build a client around an existing transport.
    pub fn with_transport(address: InstrumentAddress, transport: Arc<dyn ScpiTransport>) -> Self {
        let mut client = Self::disconnected(address, false);
        client.transport = Some(transport);
        client
    }

    /// A client with no transport. Every instrument operation fails with
    /// `Connection` until [`reconnect`](Self::reconnect) succeeds.
    pub fn disconnected(address: InstrumentAddress, mock: bool) -> Self {
        Self {
            address,
            transport: None,
            mock,
            reply_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: AcquisitionState::Idle,
            applied: None,
        }
    }

    /// Delay between fill-status polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Per-reply timeout used for transports opened after this call.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Instrument this client talks to.
    pub fn address(&self) -> &InstrumentAddress {
        &self.address
    }

    /// Whether the mock instrument replaces the network transport.
    pub fn is_mock(&self) -> bool {
        self.mock
    }

    /// Phase reached by the most recent acquisition.
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Settings last written by `acquire`, `configure_acquisition` or
    /// `set_decimation`.
    pub fn applied_settings(&self) -> Option<AppliedSettings> {
        self.applied
    }

    /// Whether a transport is held. Does not probe the instrument.
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState {
            connected: self.transport.is_some(),
        }
    }

    fn transport(&self) -> RpResult<Arc<dyn ScpiTransport>> {
        self.transport.clone().ok_or_else(|| {
            RedPitayaError::connection(format!("Not connected to {}", self.address))
        })
    }

    fn enter(&mut self, state: AcquisitionState) {
        tracing::trace!(from = ?self.state, to = ?state, "Acquisition state change");
        self.state = state;
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    /// Run one complete single-shot acquisition.
    ///
    /// The whole configuration is validated before any command is sent.
    ///
    /// # Errors
    /// - `InvalidParameter` for out-of-range settings (nothing is sent)
    /// - `Connection` if not connected or a mandatory command fails
    /// - `Timeout` if the buffer is not full within `config.timeout`
    /// - `Decode` or `LengthMismatch` if the channel data is unusable
    #[instrument(skip_all, fields(address = %self.address, decimation = config.decimation))]
    pub async fn acquire(&mut self, config: &AcquisitionConfig) -> RpResult<SampleFrame> {
        let commands = format_acquire_config(config)?;
        let transport = self.transport()?;
        let started = Instant::now();

        self.enter(AcquisitionState::Configuring);
        for command in &commands {
            if let Err(e) = transport.write(command).await {
                self.enter(AcquisitionState::Failed);
                return Err(e);
            }
        }
        self.applied = Some(AppliedSettings::from(config));
        self.enter(AcquisitionState::Armed);

        self.enter(AcquisitionState::Polling);
        if let Err(e) = self
            .wait_for_fill(transport.as_ref(), started, config.timeout)
            .await
        {
            let next = if matches!(e, RedPitayaError::Timeout { .. }) {
                AcquisitionState::TimedOut
            } else {
                AcquisitionState::Failed
            };
            self.enter(next);
            stop_best_effort(transport.as_ref()).await;
            return Err(e);
        }

        self.enter(AcquisitionState::Fetching);
        let result = fetch_frame(transport.as_ref(), config).await;
        stop_best_effort(transport.as_ref()).await;

        match result {
            Ok(frame) => {
                self.enter(AcquisitionState::Done);
                tracing::info!(
                    samples = frame.len(),
                    elapsed = ?started.elapsed(),
                    "Acquisition complete"
                );
                Ok(frame)
            }
            Err(e) => {
                self.enter(AcquisitionState::Failed);
                Err(e)
            }
        }
    }

    /// Poll the fill flag until it reads complete or the deadline passes.
    async fn wait_for_fill(
        &self,
        transport: &dyn ScpiTransport,
        started: Instant,
        limit: Duration,
    ) -> RpResult<()> {
        let deadline = started + limit;
        let timed_out = || RedPitayaError::Timeout {
            elapsed: started.elapsed(),
            timeout: limit,
        };

        loop {
            let reply = match tokio::time::timeout_at(deadline, transport.query(ACQ_FILL_QUERY))
                .await
            {
                Ok(reply) => reply?,
                Err(_) => return Err(timed_out()),
            };
            if reply.trim() == FILL_COMPLETE {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out());
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Write acquisition settings without starting a capture.
    pub async fn configure_acquisition(&mut self, config: &AcquisitionConfig) -> RpResult<()> {
        let commands = format_acquisition_settings(config)?;
        let transport = self.transport()?;
        for command in &commands {
            transport.write(command).await?;
        }
        self.applied = Some(AppliedSettings::from(config));
        Ok(())
    }

    /// Write a new decimation factor and record it in the applied settings.
    pub async fn set_decimation(&mut self, decimation: u32) -> RpResult<()> {
        validate_decimation(decimation)?;
        let transport = self.transport()?;
        transport.write(&set_decimation(decimation)).await?;
        if let Some(applied) = self.applied.as_mut() {
            applied.decimation = decimation;
        }
        Ok(())
    }

    /// Read the decimation factor currently set on the instrument.
    pub async fn query_decimation(&self) -> RpResult<u32> {
        let reply = self.transport()?.query(ACQ_DECIMATION_QUERY).await?;
        reply
            .trim()
            .parse()
            .map_err(|_| RedPitayaError::UnexpectedReply {
                command: ACQ_DECIMATION_QUERY.to_string(),
                reply,
            })
    }

    /// Re-arm the trigger with the source last applied (or `source` if given).
    pub async fn rearm_trigger(&mut self, source: Option<TriggerSource>) -> RpResult<()> {
        let source = source
            .or_else(|| self.applied.map(|a| a.trigger_source))
            .ok_or_else(|| RedPitayaError::invalid("no trigger source applied yet"))?;
        self.transport()?.write(&arm_trigger(source)).await?;
        if let Some(applied) = self.applied.as_mut() {
            applied.trigger_source = source;
        }
        Ok(())
    }

    // =========================================================================
    // Signal generator
    // =========================================================================

    /// Apply generator settings and enable the output.
    pub async fn configure_generator(&self, config: &GeneratorConfig) -> RpResult<()> {
        let transport = self.transport()?;
        for command in config.commands() {
            transport.write(&command).await?;
        }
        tracing::info!(
            channel = %config.channel(),
            waveform = %config.waveform(),
            frequency_hz = config.frequency_hz(),
            amplitude_vpp = config.amplitude_vpp(),
            "Generator output enabled"
        );
        Ok(())
    }

    /// Fire the internal trigger of both generator outputs.
    pub async fn trigger_generation(&self) -> RpResult<()> {
        self.transport()?.write(GEN_TRIGGER_ALL).await
    }

    /// Disable generator output `channel` (1 or 2).
    pub async fn stop_output(&self, channel: u8) -> RpResult<()> {
        let channel = Channel::try_from(channel)?;
        self.transport()?.write(&output_off(channel)).await
    }

    /// Return generator `channel` (1 or 2) to its power-on settings.
    pub async fn reset_channel(&self, channel: u8) -> RpResult<()> {
        let channel = Channel::try_from(channel)?;
        self.transport()?.write(&reset_channel(channel)).await
    }

    // =========================================================================
    // Connection management
    // =========================================================================

    /// Probe the instrument with `*IDN?`. Never fails; any error reads as
    /// disconnected.
    pub async fn is_connected(&self) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            return false;
        };
        match tokio::time::timeout(self.reply_timeout, transport.query(IDN_QUERY)).await {
            Ok(Ok(reply)) => !reply.trim().is_empty(),
            Ok(Err(e)) => {
                tracing::debug!("Connection probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!("Connection probe timed out after {:?}", self.reply_timeout);
                false
            }
        }
    }

    /// Drop the current transport and connect to `address`.
    ///
    /// Also used to bring up a [`disconnected`](Self::disconnected) client.
    /// On failure the client stays disconnected.
    pub async fn reconnect(&mut self, address: InstrumentAddress) -> RpResult<()> {
        self.transport = None;
        self.address = address;
        self.state = AcquisitionState::Idle;
        self.applied = None;

        match open_transport(&self.address, self.mock, self.reply_timeout).await {
            Ok(transport) => {
                self.transport = Some(transport);
                tracing::info!("Connected to {}", self.address);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Reconnect to {} failed: {}", self.address, e);
                Err(e)
            }
        }
    }

    /// Release the transport.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            tracing::info!("Closed connection to {}", self.address);
        }
    }
}

async fn open_transport(
    address: &InstrumentAddress,
    mock: bool,
    reply_timeout: Duration,
) -> RpResult<Arc<dyn ScpiTransport>> {
    if mock {
        tracing::info!("Creating mock Red Pitaya for {}", address);
        return Ok(Arc::new(MockScpiClient::new()));
    }
    tracing::info!("Connecting to Red Pitaya at {}", address);
    let client = ScpiClient::connect(address).await?.with_timeout(reply_timeout);
    Ok(Arc::new(client))
}

async fn stop_best_effort(transport: &dyn ScpiTransport) {
    if let Err(e) = transport.write(ACQ_STOP).await {
        tracing::warn!("Ignoring failed best-effort {}: {}", ACQ_STOP, e);
    }
}

async fn fetch_frame(
    transport: &dyn ScpiTransport,
    config: &AcquisitionConfig,
) -> RpResult<SampleFrame> {
    let mut fetched: [Vec<f64>; 2] = Default::default();
    for (slot, channel) in fetched.iter_mut().zip(Channel::ALL) {
        *slot = fetch_channel(transport, channel, config.data_format).await?;
    }
    let [channel1, channel2] = fetched;
    let (channel1, channel2) = equalize_lengths(channel1, channel2)?;
    Ok(SampleFrame {
        channel1,
        channel2,
        sample_rate_hz: sample_rate_hz(config.decimation),
    })
}

async fn fetch_channel(
    transport: &dyn ScpiTransport,
    channel: Channel,
    format: DataFormat,
) -> RpResult<Vec<f64>> {
    let command = channel_data_query(channel);
    let decoded = match format {
        DataFormat::Ascii => decode_ascii(&transport.query(&command).await?),
        DataFormat::Binary => decode_binary(&transport.query_block(&command).await?),
    };
    decoded.map_err(|source| RedPitayaError::Decode {
        channel: channel.number(),
        command,
        source,
    })
}

fn equalize_lengths(
    mut channel1: Vec<f64>,
    mut channel2: Vec<f64>,
) -> RpResult<(Vec<f64>, Vec<f64>)> {
    let (len1, len2) = (channel1.len(), channel2.len());
    if len1.abs_diff(len2) > MAX_CHANNEL_LENGTH_SKEW {
        return Err(RedPitayaError::LengthMismatch {
            channel1: len1,
            channel2: len2,
        });
    }
    if len1 != len2 {
        tracing::warn!("Truncating channels to common length ({} vs {})", len1, len2);
        let common = len1.min(len2);
        channel1.truncate(common);
        channel2.truncate(common);
    }
    Ok((channel1, channel2))
}
