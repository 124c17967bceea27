//! Integration tests against a fake Red Pitaya SCPI server.
//!
//! The server listens on a loopback TCP port, records every line it receives
//! and answers the queries the acquisition client issues: fill status in
//! `ACQ:TRIG:FILL?`, channel data as an ASCII list or an arbitrary block
//! depending on the last `ACQ:DATA:FORMAT`.

use rp_scope::config::InstrumentConfig;
use rp_scope::red_pitaya::{
    AcquisitionConfig, AcquisitionState, DataFormat, GeneratorConfig, RedPitayaError, Waveform,
};
use rp_scope::session;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

struct FakeState {
    log: Vec<String>,
    fill_after: Option<usize>,
    polls: usize,
    binary: bool,
    channels: [Vec<f32>; 2],
}

type Shared = Arc<Mutex<FakeState>>;

async fn spawn_fake(fill_after: Option<usize>, channels: [Vec<f32>; 2]) -> (InstrumentConfig, Shared) {
    let state = Arc::new(Mutex::new(FakeState {
        log: Vec::new(),
        fill_after,
        polls: 0,
        binary: false,
        channels,
    }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server_state = state.clone();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let state = server_state.clone();
            tokio::spawn(async move {
                let mut socket = BufReader::new(socket);
                loop {
                    let mut line = String::new();
                    match socket.read_line(&mut line).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => {}
                    }
                    let command = line.trim().to_string();
                    let reply = respond(&state, &command);
                    if let Some(reply) = reply {
                        if socket.get_mut().write_all(&reply).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    let config = InstrumentConfig {
        host: "127.0.0.1".into(),
        port,
        mock: false,
        command_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(5),
    };
    (config, state)
}

fn respond(state: &Shared, command: &str) -> Option<Vec<u8>> {
    let mut s = state.lock().unwrap();
    s.log.push(command.to_string());

    match command {
        "*IDN?" => Some(b"REDPITAYA,INSTR2020,FAKE,1.0\r\n".to_vec()),
        "ACQ:DEC?" => Some(b"8\r\n".to_vec()),
        "ACQ:TRIG:FILL?" => {
            let n = s.polls;
            s.polls += 1;
            let full = s.fill_after.is_some_and(|after| n >= after);
            Some(if full { b"1\r\n".to_vec() } else { b"0\r\n".to_vec() })
        }
        "ACQ:DATA:FORMAT BIN" => {
            s.binary = true;
            None
        }
        "ACQ:DATA:FORMAT ASCII" => {
            s.binary = false;
            None
        }
        "ACQ:SOUR1:DATA?" | "ACQ:SOUR2:DATA?" => {
            let idx = if command.contains("SOUR1") { 0 } else { 1 };
            let values = &s.channels[idx];
            if s.binary {
                let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
                let len = payload.len().to_string();
                let mut reply = format!("#{}{}", len.len(), len).into_bytes();
                reply.extend_from_slice(&payload);
                reply.extend_from_slice(b"\r\n");
                Some(reply)
            } else {
                let body: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                Some(format!("{{{}}}\r\n", body.join(",")).into_bytes())
            }
        }
        _ => None,
    }
}

fn log(state: &Shared) -> Vec<String> {
    state.lock().unwrap().log.clone()
}

#[tokio::test]
async fn binary_acquisition_over_tcp() {
    let (config, state) = spawn_fake(Some(2), [vec![0.5, -0.25, 1.0], vec![0.0, 0.125, -1.0]]).await;
    let mut client = session::connect_instrument(&config).await.unwrap();

    let frame = client
        .acquire(&AcquisitionConfig::default().with_timeout(Duration::from_secs(2)))
        .await
        .unwrap();

    assert_eq!(frame.channel1, vec![0.5, -0.25, 1.0]);
    assert_eq!(frame.channel2, vec![0.0, 0.125, -1.0]);
    assert_eq!(client.state(), AcquisitionState::Done);

    let log = log(&state);
    let first_poll = log.iter().position(|c| c == "ACQ:TRIG:FILL?").unwrap();
    assert_eq!(
        &log[..first_poll],
        &[
            "ACQ:RST",
            "ACQ:DATA:FORMAT BIN",
            "ACQ:DATA:UNITS VOLTS",
            "ACQ:DEC 8",
            "ACQ:TRIG:DLY 0",
            "ACQ:TRIG:LEV 0.1",
            "ACQ:START",
            "ACQ:TRIG CH1_PE",
        ]
    );
    assert_eq!(log.last().map(String::as_str), Some("ACQ:STOP"));
}

#[tokio::test]
async fn ascii_acquisition_over_tcp() {
    let (config, _state) = spawn_fake(Some(0), [vec![1.5, 2.5], vec![-1.5, -2.5]]).await;
    let mut client = session::connect_instrument(&config).await.unwrap();

    let frame = client
        .acquire(
            &AcquisitionConfig::default()
                .with_format(DataFormat::Ascii)
                .with_decimation(1024),
        )
        .await
        .unwrap();
    assert_eq!(frame.channel1, vec![1.5, 2.5]);
    assert_eq!(frame.channel2, vec![-1.5, -2.5]);
    assert_eq!(frame.sample_rate_hz, 125e6 / 1024.0);
}

#[tokio::test]
async fn acquisition_times_out_and_stops() {
    let (config, state) = spawn_fake(None, [vec![0.0], vec![0.0]]).await;
    let mut client = session::connect_instrument(&config).await.unwrap();

    let timeout = Duration::from_millis(300);
    let start = Instant::now();
    let err = client
        .acquire(&AcquisitionConfig::default().with_timeout(timeout))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, RedPitayaError::Timeout { .. }), "{err}");
    assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
    assert!(elapsed < timeout + Duration::from_secs(1), "took {:?}", elapsed);
    assert_eq!(client.state(), AcquisitionState::TimedOut);

    // the stop write is flushed before acquire returns; give the server a moment to log it
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log(&state).last().map(String::as_str), Some("ACQ:STOP"));
}

#[tokio::test]
async fn generator_commands_over_tcp() {
    let (config, state) = spawn_fake(Some(0), [vec![0.0], vec![0.0]]).await;
    let client = session::connect_instrument(&config).await.unwrap();
    assert!(client.is_connected().await);
    assert_eq!(client.query_decimation().await.unwrap(), 8);

    let generator = GeneratorConfig::new(2, 2500.0, 0.6, 0.1, Waveform::Triangle).unwrap();
    client.configure_generator(&generator).await.unwrap();
    client.trigger_generation().await.unwrap();
    client.stop_output(2).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let log = log(&state);
    for expected in [
        "SOUR2:FUNC:RESET",
        "SOUR2:FUNC TRIANGLE",
        "SOUR2:FREQ:FIX 2500",
        "SOUR2:VOLT 0.6",
        "SOUR2:VOLT:OFFS 0.1",
        "OUTPUT2:STATE ON",
        "SOUR:TRIG:INT",
        "OUTPUT2:STATE OFF",
    ] {
        assert!(log.iter().any(|c| c == expected), "missing {expected}: {log:?}");
    }
}

#[tokio::test]
async fn connection_refused_reports_environment_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = InstrumentConfig {
        host: "127.0.0.1".into(),
        port,
        ..Default::default()
    };
    let err = session::connect_instrument(&config).await.err().unwrap();
    assert!(err.to_string().contains("Connection error"));
}
