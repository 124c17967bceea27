//! Line-framed serial reader.
//!
//! The device prints one sample per line as comma-separated numbers. In
//! bunch mode it brackets a batch of lines with `start` and `stop` control
//! lines:
//!
//! ```text
//! start
//! 0.12,0.40
//! 0.13,0.41
//! stop
//! ```
//!
//! Every read drains only what the OS has already buffered and never waits
//! for more input. Incomplete trailing lines are held back until their
//! newline arrives.

use crate::error::{SerialResult, SerialStreamError};
use crate::link::{system_opener, LinkOpener, SerialLink, DEFAULT_READ_TIMEOUT};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Port name that means "no port".
pub const NO_PORT: &str = "None";

const START_TOKEN: &str = "start";
const STOP_TOKEN: &str = "stop";

/// Longest unterminated line kept while waiting for its newline.
pub const MAX_PARTIAL_LINE: usize = 4096;

/// One decoded line: one value per logical channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSample(pub Vec<f64>);

impl SerialSample {
    /// Values in channel order.
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Number of values on the line.
    pub fn channels(&self) -> usize {
        self.0.len()
    }
}

/// Lines captured between `start` and `stop`, split on commas, not yet parsed.
pub type RawBunch = Vec<Vec<String>>;

/// A numeric batch of samples, all with the same channel count.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialBunch {
    /// Samples in arrival order.
    pub samples: Vec<SerialSample>,
}

impl SerialBunch {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the batch holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Values of one channel across the batch.
    pub fn column(&self, channel: usize) -> Vec<f64> {
        self.samples
            .iter()
            .filter_map(|s| s.0.get(channel).copied())
            .collect()
    }
}

/// Parse a data line into a sample. `None` for control or garbage lines.
pub fn parse_line(line: &str) -> Option<SerialSample> {
    let values: Result<Vec<f64>, _> = line.split(',').map(|t| t.trim().parse::<f64>()).collect();
    match values {
        Ok(values) if !values.is_empty() => Some(SerialSample(values)),
        _ => None,
    }
}

/// Coerce a raw bunch into a numeric table.
///
/// # Errors
/// `NoDataRecognized` if the bunch is empty, a token is not a number, or the
/// rows have different lengths.
pub fn to_numeric(raw: &RawBunch) -> SerialResult<SerialBunch> {
    let Some(first) = raw.first() else {
        return Err(SerialStreamError::NoDataRecognized(
            "no lines between start and stop".into(),
        ));
    };
    let width = first.len();

    let mut samples = Vec::with_capacity(raw.len());
    for (row, tokens) in raw.iter().enumerate() {
        if tokens.len() != width {
            return Err(SerialStreamError::NoDataRecognized(format!(
                "line {} has {} values, expected {}",
                row,
                tokens.len(),
                width
            )));
        }
        let values = tokens
            .iter()
            .map(|t| {
                t.trim().parse::<f64>().map_err(|_| {
                    SerialStreamError::NoDataRecognized(format!(
                        "line {}: '{}' is not a number",
                        row, t
                    ))
                })
            })
            .collect::<SerialResult<Vec<f64>>>()?;
        samples.push(SerialSample(values));
    }
    Ok(SerialBunch { samples })
}

/// Reader for a line-oriented serial sample stream.
pub struct SerialReader {
    port: Option<String>,
    baud_rate: u32,
    link: Option<Box<dyn SerialLink>>,
    opener: LinkOpener,
    partial: Vec<u8>,
    lines: VecDeque<String>,
}

impl SerialReader {
    /// Open `port` through the OS serial driver.
    ///
    /// # Errors
    /// `PortOpen` if the port cannot be opened.
    pub fn open_port(port: &str, baud_rate: u32, read_timeout: Duration) -> SerialResult<Self> {
        let mut reader = Self::closed(baud_rate, system_opener(read_timeout));
        reader.port = Some(port.to_string());
        reader.open()?;
        Ok(reader)
    }

    /// Try to open `port`; on failure keep a closed reader and log why.
    ///
    /// A closed reader can be pointed at another port with
    /// [`select_port`](Self::select_port).
    pub fn open_or_closed(port: Option<&str>, baud_rate: u32, opener: LinkOpener) -> Self {
        let mut reader = Self::closed(baud_rate, opener);
        reader.port = port
            .filter(|p| !p.eq_ignore_ascii_case(NO_PORT))
            .map(str::to_string);
        if reader.port.is_some() {
            if let Err(e) = reader.open() {
                tracing::warn!("{}; continuing without a serial port", e);
            }
        }
        reader
    }

    /// A reader with no port, using the OS serial driver once a port is selected.
    pub fn detached(baud_rate: u32) -> Self {
        Self::closed(baud_rate, system_opener(DEFAULT_READ_TIMEOUT))
    }

    fn closed(baud_rate: u32, opener: LinkOpener) -> Self {
        Self {
            port: None,
            baud_rate,
            link: None,
            opener,
            partial: Vec::new(),
            lines: VecDeque::new(),
        }
    }

    /// Selected port, if any.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Current line speed.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Whether a port is currently open.
    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Open the selected port. No-op if already open.
    pub fn open(&mut self) -> SerialResult<()> {
        if self.link.is_some() {
            return Ok(());
        }
        let port = self.port.as_deref().ok_or(SerialStreamError::NoPortSelected)?;
        let link = (self.opener)(port, self.baud_rate)?;
        self.link = Some(link);
        Ok(())
    }

    /// Close the port and discard buffered input.
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            tracing::info!("Serial port '{}' closed", self.port.as_deref().unwrap_or(NO_PORT));
        }
        self.partial.clear();
        self.lines.clear();
    }

    /// Switch to `port`. `"None"` just closes.
    pub fn select_port(&mut self, port: &str) -> SerialResult<()> {
        self.close();
        tracing::info!("{} was selected", port);
        if port.eq_ignore_ascii_case(NO_PORT) {
            self.port = None;
            return Ok(());
        }
        self.port = Some(port.to_string());
        self.open()
    }

    /// Change the baud rate, reopening the port if it was open.
    pub fn update_baud_rate(&mut self, baud_rate: u32) -> SerialResult<()> {
        let was_open = self.is_open();
        self.close();
        self.baud_rate = baud_rate;
        if was_open {
            self.open()?;
        }
        Ok(())
    }

    /// Ask the device to drive its own generator.
    pub fn send_generate(
        &mut self,
        channel: u8,
        amplitude_vpp: f64,
        frequency_hz: f64,
        waveform: &str,
    ) -> SerialResult<()> {
        let link = self.link.as_mut().ok_or(SerialStreamError::NotOpen)?;
        let line = format!(
            "generate {} {} {} {}\n",
            channel, amplitude_vpp, frequency_hz, waveform
        );
        link.write_all(line.as_bytes())?;
        link.flush()?;
        tracing::debug!("Serial write: {:?}", line.trim_end());
        Ok(())
    }

    /// Move the bytes already waiting on the port into the line queue.
    fn fill(&mut self) -> SerialResult<()> {
        let link = self.link.as_mut().ok_or(SerialStreamError::NotOpen)?;
        let waiting = link.bytes_waiting()?;
        if waiting == 0 {
            return Ok(());
        }

        let mut buf = vec![0u8; waiting];
        let mut filled = 0;
        while filled < waiting {
            match link.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.partial.extend_from_slice(&buf[..filled]);

        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..pos]);
            self.lines.push_back(line.trim_end_matches('\r').to_string());
        }
        if self.partial.len() > MAX_PARTIAL_LINE {
            tracing::warn!(
                "Dropping {} bytes without a line terminator; check the baud rate",
                self.partial.len()
            );
            self.partial.clear();
        }
        Ok(())
    }

    /// Latest parseable sample among the lines available now.
    ///
    /// Earlier samples are discarded and unparseable lines skipped. Returns
    /// `None` when nothing parsed or the port is closed.
    pub fn collect_data(&mut self) -> SerialResult<Option<SerialSample>> {
        if !self.is_open() {
            tracing::trace!("collect_data on closed serial reader");
            return Ok(None);
        }
        self.fill()?;

        let mut last = None;
        while let Some(line) = self.lines.pop_front() {
            match parse_line(&line) {
                Some(sample) => last = Some(sample),
                None => tracing::trace!("Skipping serial line {:?}", line),
            }
        }
        Ok(last)
    }

    /// Gather the lines between `start` and `stop` from what is available now.
    ///
    /// Capture always begins inactive. Lines after `stop` stay queued for the
    /// next call.
    pub fn extract_bunch(&mut self) -> SerialResult<RawBunch> {
        self.fill()?;

        let mut active = false;
        let mut bunch = RawBunch::new();
        while let Some(line) = self.lines.pop_front() {
            if line.starts_with(STOP_TOKEN) && active {
                break;
            } else if line.starts_with(START_TOKEN) && !active {
                active = true;
                continue;
            }
            if active {
                bunch.push(line.split(',').map(str::to_string).collect());
            }
        }
        if active {
            tracing::debug!("Bunch ended without '{}' after {} lines", STOP_TOKEN, bunch.len());
        }
        Ok(bunch)
    }

    /// [`extract_bunch`](Self::extract_bunch) followed by [`to_numeric`].
    pub fn collect_data_bunch(&mut self) -> SerialResult<SerialBunch> {
        let raw = self.extract_bunch()?;
        let bunch = to_numeric(&raw)?;
        tracing::debug!("Collected bunch of {} samples", bunch.len());
        Ok(bunch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Wire {
        incoming: Vec<u8>,
        written: Vec<u8>,
        opens: Vec<(String, u32)>,
    }

    struct ScriptedLink {
        wire: Arc<Mutex<Wire>>,
    }

    impl Read for ScriptedLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut wire = self.wire.lock().unwrap();
            let n = buf.len().min(wire.incoming.len());
            buf[..n].copy_from_slice(&wire.incoming[..n]);
            wire.incoming.drain(..n);
            Ok(n)
        }
    }

    impl Write for ScriptedLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.wire.lock().unwrap().written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLink for ScriptedLink {
        fn bytes_waiting(&mut self) -> io::Result<usize> {
            Ok(self.wire.lock().unwrap().incoming.len())
        }
    }

    fn scripted(wire: &Arc<Mutex<Wire>>) -> LinkOpener {
        let wire = wire.clone();
        Box::new(move |port: &str, baud: u32| {
            if port == "/dev/missing" {
                return Err(SerialStreamError::NotOpen);
            }
            wire.lock().unwrap().opens.push((port.to_string(), baud));
            Ok(Box::new(ScriptedLink { wire: wire.clone() }) as Box<dyn SerialLink>)
        })
    }

    fn reader() -> (SerialReader, Arc<Mutex<Wire>>) {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let reader = SerialReader::open_or_closed(Some("/dev/ttyUSB0"), 115_200, scripted(&wire));
        (reader, wire)
    }

    fn feed(wire: &Arc<Mutex<Wire>>, data: &str) {
        wire.lock().unwrap().incoming.extend_from_slice(data.as_bytes());
    }

    #[test]
    fn test_collect_data_keeps_last_good_line() {
        let (mut reader, wire) = reader();
        feed(&wire, "1.0,2.0\n3.0,4.0\ngarbage\n");
        assert_eq!(
            reader.collect_data().unwrap(),
            Some(SerialSample(vec![3.0, 4.0]))
        );
        assert_eq!(reader.collect_data().unwrap(), None);
    }

    #[test]
    fn test_collect_data_holds_partial_line() {
        let (mut reader, wire) = reader();
        feed(&wire, "1.5,2.5\r\n7.0,8");
        assert_eq!(
            reader.collect_data().unwrap(),
            Some(SerialSample(vec![1.5, 2.5]))
        );
        feed(&wire, ".5\n");
        assert_eq!(
            reader.collect_data().unwrap(),
            Some(SerialSample(vec![7.0, 8.5]))
        );
    }

    #[test]
    #[traced_test]
    fn test_unterminated_input_is_dropped_past_limit() {
        let (mut reader, wire) = reader();
        feed(&wire, &"7".repeat(MAX_PARTIAL_LINE + 1));
        assert_eq!(reader.collect_data().unwrap(), None);
        assert!(logs_contain("without a line terminator"));

        feed(&wire, "1,2\n");
        assert_eq!(
            reader.collect_data().unwrap(),
            Some(SerialSample(vec![1.0, 2.0]))
        );
    }

    #[test]
    fn test_collect_data_on_closed_reader_is_none() {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let mut reader = SerialReader::open_or_closed(None, 9600, scripted(&wire));
        assert!(!reader.is_open());
        assert_eq!(reader.collect_data().unwrap(), None);
    }

    #[test]
    fn test_bunch_between_start_and_stop() {
        let (mut reader, wire) = reader();
        feed(&wire, "0.9,0.9\nstart\n1,2\n3,4\nstop\n5,6\n");
        let bunch = reader.collect_data_bunch().unwrap();
        assert_eq!(bunch.len(), 2);
        assert_eq!(bunch.column(0), vec![1.0, 3.0]);
        assert_eq!(bunch.column(1), vec![2.0, 4.0]);

        // the line after stop is still queued
        assert_eq!(
            reader.collect_data().unwrap(),
            Some(SerialSample(vec![5.0, 6.0]))
        );
    }

    #[test]
    fn test_bunch_state_resets_each_call() {
        let (mut reader, wire) = reader();
        feed(&wire, "start\n1,2\n");
        let raw = reader.extract_bunch().unwrap();
        assert_eq!(raw, vec![vec!["1".to_string(), "2".to_string()]]);

        // capture does not carry over, so these lines are ignored
        feed(&wire, "3,4\nstop\n");
        let err = reader.collect_data_bunch().unwrap_err();
        assert!(matches!(err, SerialStreamError::NoDataRecognized(_)));
    }

    #[test]
    fn test_stop_before_start_is_ignored() {
        let (mut reader, wire) = reader();
        feed(&wire, "stop\nstart\n1.0\nstop\n");
        let bunch = reader.collect_data_bunch().unwrap();
        assert_eq!(bunch.samples, vec![SerialSample(vec![1.0])]);
    }

    #[test]
    fn test_bunch_rejects_non_numeric_and_ragged_rows() {
        let raw = vec![vec!["1".to_string()], vec!["x".to_string()]];
        assert!(matches!(
            to_numeric(&raw),
            Err(SerialStreamError::NoDataRecognized(_))
        ));
        let ragged = vec![vec!["1".to_string(), "2".to_string()], vec!["3".to_string()]];
        assert!(matches!(
            to_numeric(&ragged),
            Err(SerialStreamError::NoDataRecognized(_))
        ));
        assert!(matches!(
            to_numeric(&RawBunch::new()),
            Err(SerialStreamError::NoDataRecognized(_))
        ));
    }

    #[test]
    fn test_bunch_on_closed_reader_fails() {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let mut reader = SerialReader::open_or_closed(Some("None"), 9600, scripted(&wire));
        assert!(matches!(
            reader.collect_data_bunch(),
            Err(SerialStreamError::NotOpen)
        ));
        assert!(wire.lock().unwrap().opens.is_empty());
    }

    #[test]
    fn test_select_port_reopens_and_none_closes() {
        let (mut reader, wire) = reader();
        reader.select_port("/dev/ttyACM0").unwrap();
        assert!(reader.is_open());
        assert_eq!(reader.port(), Some("/dev/ttyACM0"));

        reader.select_port("None").unwrap();
        assert!(!reader.is_open());
        assert_eq!(reader.port(), None);

        let opens = wire.lock().unwrap().opens.clone();
        assert_eq!(
            opens,
            vec![
                ("/dev/ttyUSB0".to_string(), 115_200),
                ("/dev/ttyACM0".to_string(), 115_200)
            ]
        );
    }

    #[test]
    fn test_update_baud_rate_reopens_open_port() {
        let (mut reader, wire) = reader();
        reader.update_baud_rate(9600).unwrap();
        assert!(reader.is_open());
        assert_eq!(reader.baud_rate(), 9600);
        assert_eq!(
            wire.lock().unwrap().opens.last().cloned(),
            Some(("/dev/ttyUSB0".to_string(), 9600))
        );

        reader.close();
        reader.update_baud_rate(57_600).unwrap();
        assert!(!reader.is_open());
        assert_eq!(wire.lock().unwrap().opens.len(), 2);
    }

    #[test]
    #[traced_test]
    fn test_failed_open_falls_back_to_closed_reader() {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let reader = SerialReader::open_or_closed(Some("/dev/missing"), 9600, scripted(&wire));
        assert!(!reader.is_open());
        assert_eq!(reader.port(), Some("/dev/missing"));
        assert!(logs_contain("continuing without a serial port"));
    }

    #[test]
    fn test_send_generate_line() {
        let (mut reader, wire) = reader();
        reader.send_generate(1, 0.5, 1000.0, "sine").unwrap();
        assert_eq!(wire.lock().unwrap().written, b"generate 1 0.5 1000 sine\n");

        reader.close();
        assert!(matches!(
            reader.send_generate(1, 0.5, 1000.0, "sine"),
            Err(SerialStreamError::NotOpen)
        ));
    }

    #[test]
    fn test_open_without_port_selected() {
        let mut reader = SerialReader::detached(9600);
        assert!(matches!(
            reader.open(),
            Err(SerialStreamError::NoPortSelected)
        ));
    }
}
