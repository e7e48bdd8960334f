//! SolarmanV5 connection session
//!
//! One [`SolarmanSession`] owns one TCP link to a data-logging stick and
//! serializes request/response exchanges over it. The socket is opened
//! lazily, torn down on every transport or framing error, and reopened on
//! the next exchange.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::constants::{
    DEFAULT_TCP_PORT, HEADER_LEN, MAX_RESPONSE_PAYLOAD, RESPONSE_PAYLOAD_MIN, TRAILER_LEN,
};
use crate::error::{EnvelopeFault, SolarmanError, SolarmanResult};
use crate::frame::{self, EnvelopeHeader};
use crate::logging::FrameLogger;
use crate::rtu;

/// Default exchange deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default Modbus slave ID
pub const DEFAULT_SLAVE_ID: u8 = 1;

/// Transport layer statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Socket and counters guarded by the exchange lock
#[derive(Debug, Default)]
struct Link {
    stream: Option<TcpStream>,
    stats: TransportStats,
}

/// Connection session to one SolarmanV5 data logger.
///
/// The exchange lock guarantees that request/response pairs never interleave:
/// if caller A enters [`exchange`](Self::exchange) before caller B, A's
/// request is fully written and its response fully read before B begins.
#[derive(Debug)]
pub struct SolarmanSession {
    address: String,
    logger_serial: u32,
    slave_id: u8,
    timeout: Duration,
    logger: Option<FrameLogger>,
    /// Advances once per request build; wraps at 2^16. Written only while the
    /// link lock is held, read lock-free by [`clone_with_slave`](Self::clone_with_slave).
    sequence: AtomicU16,
    link: Mutex<Link>,
}

/// Append the default port when the address carries none
fn with_default_port(address: &str) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{address}:{DEFAULT_TCP_PORT}")
    }
}

impl SolarmanSession {
    /// Create a session for the logger at `address` (port 8899 assumed when
    /// missing). The logger serial is immutable for the session's lifetime;
    /// talking to a different logger requires a new session.
    pub fn new(address: &str, logger_serial: u32) -> SolarmanResult<Self> {
        if address.is_empty() {
            return Err(SolarmanError::config("address cannot be empty"));
        }

        Ok(Self {
            address: with_default_port(address),
            logger_serial,
            slave_id: DEFAULT_SLAVE_ID,
            timeout: DEFAULT_TIMEOUT,
            logger: None,
            sequence: AtomicU16::new(1),
            link: Mutex::new(Link::default()),
        })
    }

    /// Resolved address including port
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Serial of the data logger this session addresses
    pub fn logger_serial(&self) -> u32 {
        self.logger_serial
    }

    /// Modbus slave ID used by the client façade
    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    /// Set the Modbus slave ID. Safe between exchanges.
    pub fn set_slave(&mut self, slave_id: u8) {
        self.slave_id = slave_id;
    }

    /// Current exchange deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the exchange deadline, returning the previous one
    pub fn set_timeout(&mut self, timeout: Duration) -> Duration {
        std::mem::replace(&mut self.timeout, timeout)
    }

    /// Attach or detach the diagnostic frame logger
    pub fn set_logger(&mut self, logger: Option<FrameLogger>) {
        self.logger = logger;
    }

    /// Accepted for interface uniformity with serial transports; TCP needs
    /// no settle delay, so this does nothing.
    pub fn connect_delay(&mut self, _delay: Duration) {}

    /// Create an independent session to the same logger with a different
    /// slave ID. The clone starts disconnected, does not share the socket or
    /// lock, and inherits the source's current sequence number.
    pub fn clone_with_slave(&self, slave_id: u8) -> Self {
        Self {
            address: self.address.clone(),
            logger_serial: self.logger_serial,
            slave_id,
            timeout: self.timeout,
            logger: None,
            sequence: AtomicU16::new(self.sequence.load(Ordering::Relaxed)),
            link: Mutex::new(Link::default()),
        }
    }

    /// Close the TCP link. Idempotent; the next exchange reconnects.
    pub async fn close(&self) {
        let mut link = self.link.lock().await;
        if link.stream.take().is_some() {
            debug!("disconnected: {}", self.address);
        }
    }

    /// Whether a TCP link is currently held
    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.stream.is_some()
    }

    /// Snapshot of the transport statistics
    pub async fn stats(&self) -> TransportStats {
        self.link.lock().await.stats.clone()
    }

    fn next_sequence(&self) -> u16 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    async fn connect(&self) -> SolarmanResult<TcpStream> {
        debug!("connecting: {}", self.address);
        match timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {e}");
                }
                debug!("connected: {}", self.address);
                Ok(stream)
            },
            Ok(Err(e)) => Err(SolarmanError::transport(format!(
                "failed to connect to {}: {e}",
                self.address
            ))),
            Err(_) => Err(SolarmanError::timeout(format!(
                "connection to {} timed out",
                self.address
            ))),
        }
    }

    /// Write one request envelope and read back the complete response
    /// envelope. The stream is a byte stream: the response header is read
    /// first, then exactly the declared remainder.
    async fn transfer(
        stream: &mut TcpStream,
        packet: &[u8],
        deadline: Duration,
    ) -> SolarmanResult<Vec<u8>> {
        match timeout(deadline, stream.write_all(packet)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(SolarmanError::transport(format!("send failed: {e}"))),
            Err(_) => return Err(SolarmanError::timeout("send deadline exceeded")),
        }

        let mut header = [0u8; HEADER_LEN];
        match timeout(deadline, stream.read_exact(&mut header)).await {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => return Err(SolarmanError::transport(format!("read header failed: {e}"))),
            Err(_) => return Err(SolarmanError::timeout("response deadline exceeded")),
        }

        // Validates the start sentinel before anything else is read
        let declared = EnvelopeHeader::decode(&header)?.length;
        if (declared as usize) < RESPONSE_PAYLOAD_MIN || declared as usize > MAX_RESPONSE_PAYLOAD {
            return Err(SolarmanError::MalformedEnvelope(EnvelopeFault::PayloadLength(declared)));
        }

        let mut rest = vec![0u8; declared as usize + TRAILER_LEN];
        match timeout(deadline, stream.read_exact(&mut rest)).await {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => return Err(SolarmanError::transport(format!("read payload failed: {e}"))),
            Err(_) => return Err(SolarmanError::timeout("response deadline exceeded")),
        }

        let mut raw = Vec::with_capacity(HEADER_LEN + rest.len());
        raw.extend_from_slice(&header);
        raw.extend_from_slice(&rest);
        Ok(raw)
    }

    /// Perform one synchronous request/response exchange: wrap the RTU frame
    /// in a SolarmanV5 envelope, send it, read and unwrap the response, and
    /// run the double-CRC compensator over the inner frame.
    ///
    /// Transport failures and envelope violations tear down the socket so
    /// the next call starts on a fresh connection. The sequence number
    /// advances exactly once per call, also when the exchange fails later.
    pub async fn exchange(&self, rtu_request: &[u8]) -> SolarmanResult<Vec<u8>> {
        let mut link = self.link.lock().await;

        if link.stream.is_none() {
            link.stream = Some(self.connect().await?);
        }

        let sequence = self.next_sequence();
        let packet = frame::build_request(rtu_request, sequence, self.logger_serial);

        debug!(
            "exchange: seq={} rtu={}B envelope={}B",
            sequence,
            rtu_request.len(),
            packet.len()
        );
        if let Some(logger) = &self.logger {
            logger.tx(&packet);
        }

        link.stats.requests_sent += 1;
        link.stats.bytes_sent += packet.len() as u64;

        let Some(stream) = link.stream.as_mut() else {
            return Err(SolarmanError::transport("not connected"));
        };

        let raw = match Self::transfer(stream, &packet, self.timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                link.stream = None;
                link.stats.errors += 1;
                if matches!(e, SolarmanError::Timeout(_)) {
                    link.stats.timeouts += 1;
                }
                return Err(e);
            },
        };

        link.stats.responses_received += 1;
        link.stats.bytes_received += raw.len() as u64;
        if let Some(logger) = &self.logger {
            logger.rx(&raw);
        }

        match frame::parse_response(&raw) {
            Ok(rtu_frame) => Ok(rtu::fix_double_crc(rtu_frame)),
            Err(e) => {
                // Framing state is indeterminate; next call reconnects
                link.stream = None;
                link.stats.errors += 1;
                Err(e)
            },
        }
    }
}
