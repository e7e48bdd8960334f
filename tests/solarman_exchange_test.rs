//! End-to-end exchange tests against a mock SolarmanV5 logger
//!
//! A tokio TCP listener plays the data-logging stick: it unwraps request
//! envelopes, hands the inner RTU frame to a per-test reply function, and
//! writes whatever envelope that function produces.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use voltage_solarman::checksum::sum8;
use voltage_solarman::constants::{
    CONTROL_RESPONSE, FRAME_END, FRAME_START, FRAME_TYPE_INVERTER, STATUS_OK,
};
use voltage_solarman::rtu;
use voltage_solarman::{FrameLogger, ModbusClient, SolarmanClient, SolarmanError};

const LOGGER_SERIAL: u32 = 0x1234_5678;

/// Wrap an RTU frame in a well-formed response envelope
fn encode_response(rtu: &[u8], sequence: u16, status: u8) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.push(FRAME_START);
    frame.extend_from_slice(&((14 + rtu.len()) as u16).to_le_bytes());
    frame.extend_from_slice(&CONTROL_RESPONSE.to_le_bytes());
    frame.extend_from_slice(&sequence.to_le_bytes());
    frame.extend_from_slice(&LOGGER_SERIAL.to_le_bytes());
    frame.push(FRAME_TYPE_INVERTER);
    frame.push(status);
    frame.extend_from_slice(&[0u8; 12]); // working time, power-on time, offset time
    frame.extend_from_slice(rtu);
    let checksum = sum8(&frame[1..]);
    frame.push(checksum);
    frame.push(FRAME_END);
    frame
}

/// Read one request envelope and return (sequence, inner RTU frame).
///
/// Request frames declare a 15-byte payload prefix in the length field but
/// emit 11 prefix bytes; with the 2-byte trailer the remainder on the wire
/// is `declared - 2` bytes.
async fn read_request(stream: &mut TcpStream) -> Option<(u16, Vec<u8>)> {
    let mut header = [0u8; 11];
    stream.read_exact(&mut header).await.ok()?;
    assert_eq!(header[0], FRAME_START);

    let declared = u16::from_le_bytes([header[1], header[2]]) as usize;
    let sequence = u16::from_le_bytes([header[5], header[6]]);

    let mut rest = vec![0u8; declared - 2];
    stream.read_exact(&mut rest).await.ok()?;
    assert_eq!(*rest.last().unwrap(), FRAME_END);

    Some((sequence, rest[11..rest.len() - 2].to_vec()))
}

/// Spawn a mock logger; `reply` maps (sequence, request RTU) to the envelope
/// to send back, or `None` to swallow the request.
async fn spawn_logger<F>(reply: F) -> String
where
    F: Fn(u16, Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            while let Some((sequence, rtu)) = read_request(&mut stream).await {
                if let Some(envelope) = reply(sequence, rtu) {
                    if stream.write_all(&envelope).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    addr.to_string()
}

async fn connect(addr: &str) -> SolarmanClient {
    let mut client = SolarmanClient::new(addr, LOGGER_SERIAL).unwrap();
    client.set_timeout(Duration::from_millis(500));
    client
}

// ============================================================================
// Happy Path
// ============================================================================

#[tokio::test]
async fn test_read_holding_registers_roundtrip() {
    // Two registers: 0x000A and 0x0102
    let addr = spawn_logger(|sequence, _rtu| {
        let response = rtu::build_request(0x01, 0x03, &[0x04, 0x00, 0x0A, 0x01, 0x02]);
        Some(encode_response(&response, sequence, STATUS_OK))
    })
    .await;

    let mut client = connect(&addr).await;
    let data = client.read_holding_registers(100, 2).await.unwrap();
    assert_eq!(data, &[0x04, 0x00, 0x0A, 0x01, 0x02]);

    let stats = client.stats().await;
    assert_eq!(stats.requests_sent, 1);
    assert_eq!(stats.responses_received, 1);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn test_write_and_mask_operations() {
    let addr = spawn_logger(|sequence, request| {
        // Echo-style replies: single writes and FC22 mirror the request body,
        // FC16 answers with address + quantity
        let response = match request[1] {
            0x10 => rtu::build_request(request[0], 0x10, &request[2..6]),
            fc => rtu::build_request(request[0], fc, &request[2..request.len() - 2]),
        };
        Some(encode_response(&response, sequence, STATUS_OK))
    })
    .await;

    let mut client = connect(&addr).await;

    let data = client.write_single_register(0x0100, 0x1234).await.unwrap();
    assert_eq!(data, &[0x01, 0x00, 0x12, 0x34]);

    let data = client.write_single_coil(0x0002, 0xFF00).await.unwrap();
    assert_eq!(data, &[0x00, 0x02, 0xFF, 0x00]);

    let data = client
        .write_multiple_registers(0x0010, 2, &[0x00, 0x0A, 0x01, 0x02])
        .await
        .unwrap();
    assert_eq!(data, &[0x00, 0x10, 0x00, 0x02]);

    let data = client
        .mask_write_register(0x0004, 0x00F2, 0x0025)
        .await
        .unwrap();
    assert_eq!(data, &[0x00, 0x04, 0x00, 0xF2, 0x00, 0x25]);
}

// ============================================================================
// Sequence Numbering
// ============================================================================

#[tokio::test]
async fn test_sequence_monotonicity() {
    let seen: Arc<Mutex<Vec<u16>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();

    let addr = spawn_logger(move |sequence, _rtu| {
        recorder.lock().unwrap().push(sequence);
        let response = rtu::build_request(0x01, 0x04, &[0x02, 0x00, 0x2A]);
        Some(encode_response(&response, sequence, STATUS_OK))
    })
    .await;

    let mut client = connect(&addr).await;
    for _ in 0..4 {
        client.read_input_registers(0, 1).await.unwrap();
    }

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
}

// ============================================================================
// Error Propagation
// ============================================================================

#[tokio::test]
async fn test_exception_response() {
    let addr = spawn_logger(|sequence, _rtu| {
        // FC03 exception, code 02 (illegal data address), CRC appended
        Some(encode_response(
            &[0x01, 0x83, 0x02, 0xC0, 0xF1],
            sequence,
            STATUS_OK,
        ))
    })
    .await;

    let mut client = connect(&addr).await;
    let err = client.read_holding_registers(0, 1).await.unwrap_err();
    assert_eq!(
        err,
        SolarmanError::ModbusException {
            function: 0x03,
            code: 0x02
        }
    );

    // Modbus-level errors leave the link up
    assert!(client.session().is_connected().await);
}

#[tokio::test]
async fn test_logger_status_error_closes_link() {
    let addr = spawn_logger(|sequence, _rtu| {
        let response = rtu::build_request(0x01, 0x03, &[0x02, 0x00, 0x01]);
        Some(encode_response(&response, sequence, 0x00))
    })
    .await;

    let mut client = connect(&addr).await;
    let err = client.read_holding_registers(0, 1).await.unwrap_err();
    assert_eq!(err, SolarmanError::LoggerStatus { status: 0 });

    // Envelope-level failures tear the link down
    assert!(!client.session().is_connected().await);
}

#[tokio::test]
async fn test_slave_id_mismatch_is_recoverable() {
    let addr = spawn_logger(|sequence, _rtu| {
        let response = rtu::build_request(0x02, 0x03, &[0x02, 0x00, 0x01]);
        Some(encode_response(&response, sequence, STATUS_OK))
    })
    .await;

    let mut client = connect(&addr).await;
    let err = client.read_holding_registers(0, 1).await.unwrap_err();
    assert_eq!(
        err,
        SolarmanError::SlaveIdMismatch {
            expected: 1,
            actual: 2
        }
    );
    assert!(err.is_recoverable());
    assert!(client.session().is_connected().await);
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    // Nothing listens on the reserved port
    let mut client = SolarmanClient::new("127.0.0.1:1", LOGGER_SERIAL).unwrap();
    client.set_timeout(Duration::from_millis(500));

    let err = client.read_holding_registers(0, 1).await.unwrap_err();
    assert!(
        matches!(
            err,
            SolarmanError::Transport(_) | SolarmanError::Timeout(_)
        ),
        "{err}"
    );
}

// ============================================================================
// Timeout and Reconnection
// ============================================================================

#[tokio::test]
async fn test_timeout_then_reconnect() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let addr = spawn_logger(move |sequence, _rtu| {
        // Swallow the first request; answer from the second one on
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return None;
        }
        let response = rtu::build_request(0x01, 0x03, &[0x02, 0x00, 0x2A]);
        Some(encode_response(&response, sequence, STATUS_OK))
    })
    .await;

    let mut client = connect(&addr).await;
    client.set_timeout(Duration::from_millis(200));

    let err = client.read_holding_registers(0, 1).await.unwrap_err();
    assert!(matches!(err, SolarmanError::Timeout(_)), "{err}");
    assert!(!client.session().is_connected().await);

    // Next call reconnects on a fresh socket and succeeds
    let data = client.read_holding_registers(0, 1).await.unwrap();
    assert_eq!(data, &[0x02, 0x00, 0x2A]);

    let stats = client.stats().await;
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.errors, 1);
}

// ============================================================================
// Device Quirks and Diagnostics
// ============================================================================

#[tokio::test]
async fn test_double_crc_response_is_compensated() {
    let addr = spawn_logger(|sequence, _rtu| {
        // Valid frame plus the redundant trailer some inverters append
        let mut response = rtu::build_request(0x01, 0x03, &[0x02, 0x12, 0x34]);
        response.extend_from_slice(&[0xAB, 0xCD]);
        Some(encode_response(&response, sequence, STATUS_OK))
    })
    .await;

    let mut client = connect(&addr).await;
    let data = client.read_holding_registers(0, 1).await.unwrap();
    assert_eq!(data, &[0x02, 0x12, 0x34]);
}

#[tokio::test]
async fn test_frame_logger_sees_tx_and_rx() {
    let addr = spawn_logger(|sequence, _rtu| {
        let response = rtu::build_request(0x01, 0x03, &[0x02, 0x00, 0x01]);
        Some(encode_response(&response, sequence, STATUS_OK))
    })
    .await;

    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();

    let mut client = connect(&addr).await;
    client.set_logger(Some(FrameLogger::new(move |line| {
        sink.lock().unwrap().push(line.to_string())
    })));

    client.read_holding_registers(0, 1).await.unwrap();

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("solarmanv5 tx: a5 "));
    assert!(lines[1].starts_with("solarmanv5 rx: a5 "));
    assert!(lines[0].ends_with(" 15"));
}
