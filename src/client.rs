//! Modbus client façade over a SolarmanV5 session
//!
//! One typed operation per Modbus function code: arguments are range-checked,
//! the RTU request frame is assembled and exchanged through the session, and
//! the validated data portion of the response PDU comes back to the caller.
//!
//! The [`ModbusClient`] trait is the capability surface the meter dispatcher
//! consumes; each transport (plain TCP, RTU-over-TCP, serial, SolarmanV5)
//! provides one implementation so they substitute freely.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::constants::{
    FC_MASK_WRITE_REGISTER, FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_FIFO_QUEUE,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_READ_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, MAX_READWRITE_WRITE_REGISTERS, MAX_READ_COILS, MAX_READ_REGISTERS,
    MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};
use crate::error::{SolarmanError, SolarmanResult};
use crate::logging::FrameLogger;
use crate::rtu;
use crate::session::{SolarmanSession, TransportStats};

/// Modbus client operations over one transport.
///
/// Read and write operations return the raw data portion of the response PDU
/// (the bytes after the function code and before the CRC); decoding register
/// values is the caller's concern.
#[async_trait]
pub trait ModbusClient: Send + Sync {
    /// Connection descriptor, e.g. `solarmanv5://192.168.1.100:8899/1`
    fn connection_string(&self) -> String;

    /// Set the Modbus slave ID for subsequent operations
    fn set_slave(&mut self, slave_id: u8);

    /// Set the exchange deadline, returning the previous one
    fn set_timeout(&mut self, timeout: Duration) -> Duration;

    /// Attach or detach a diagnostic frame logger
    fn set_logger(&mut self, logger: Option<FrameLogger>);

    /// Settle delay after connecting; only serial transports act on it
    fn connect_delay(&mut self, delay: Duration);

    /// Independent client to the same endpoint with a different slave ID
    fn clone_with_slave(&self, slave_id: u8) -> Box<dyn ModbusClient>;

    /// Close the connection. Idempotent.
    async fn close(&mut self);

    /// Transport statistics snapshot
    async fn stats(&self) -> TransportStats;

    /// Read coils (FC01); quantity 1..=2000
    async fn read_coils(&mut self, address: u16, quantity: u16) -> SolarmanResult<Vec<u8>>;

    /// Read discrete inputs (FC02); quantity 1..=2000
    async fn read_discrete_inputs(&mut self, address: u16, quantity: u16)
        -> SolarmanResult<Vec<u8>>;

    /// Read holding registers (FC03); quantity 1..=125
    async fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> SolarmanResult<Vec<u8>>;

    /// Read input registers (FC04); quantity 1..=125
    async fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> SolarmanResult<Vec<u8>>;

    /// Write single coil (FC05); value must be 0x0000 or 0xFF00
    async fn write_single_coil(&mut self, address: u16, value: u16) -> SolarmanResult<Vec<u8>>;

    /// Write single register (FC06)
    async fn write_single_register(&mut self, address: u16, value: u16)
        -> SolarmanResult<Vec<u8>>;

    /// Write multiple coils (FC15); quantity 1..=1968, one data byte per
    /// eight coils
    async fn write_multiple_coils(
        &mut self,
        address: u16,
        quantity: u16,
        data: &[u8],
    ) -> SolarmanResult<Vec<u8>>;

    /// Write multiple registers (FC16); quantity 1..=123, two data bytes per
    /// register
    async fn write_multiple_registers(
        &mut self,
        address: u16,
        quantity: u16,
        data: &[u8],
    ) -> SolarmanResult<Vec<u8>>;

    /// Mask write register (FC22)
    async fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> SolarmanResult<Vec<u8>>;

    /// Read/write multiple registers (FC23); read quantity 1..=125, write
    /// quantity 1..=121
    async fn read_write_multiple_registers(
        &mut self,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        write_quantity: u16,
        data: &[u8],
    ) -> SolarmanResult<Vec<u8>>;

    /// Read FIFO queue (FC24); response layout is device-specific
    async fn read_fifo_queue(&mut self, address: u16) -> SolarmanResult<Vec<u8>>;
}

/// Modbus client speaking SolarmanV5 over TCP
#[derive(Debug)]
pub struct SolarmanClient {
    session: SolarmanSession,
}

impl SolarmanClient {
    /// Create a client for the logger at `address` (default port 8899),
    /// slave ID 1
    pub fn new(address: &str, logger_serial: u32) -> SolarmanResult<Self> {
        Ok(Self {
            session: SolarmanSession::new(address, logger_serial)?,
        })
    }

    /// Create a client with an explicit slave ID
    pub fn with_slave(address: &str, logger_serial: u32, slave_id: u8) -> SolarmanResult<Self> {
        let mut session = SolarmanSession::new(address, logger_serial)?;
        session.set_slave(slave_id);
        Ok(Self { session })
    }

    /// Wrap an existing session
    pub fn from_session(session: SolarmanSession) -> Self {
        Self { session }
    }

    /// The underlying session, e.g. for raw [`exchange`](SolarmanSession::exchange)
    /// calls with vendor-specific PDUs
    pub fn session(&self) -> &SolarmanSession {
        &self.session
    }

    /// Mutable access to the underlying session
    pub fn session_mut(&mut self) -> &mut SolarmanSession {
        &mut self.session
    }

    /// Build, exchange and validate one RTU request for `function`
    async fn request(&self, function: u8, body: &[u8]) -> SolarmanResult<Vec<u8>> {
        let slave_id = self.session.slave_id();
        let frame = rtu::build_request(slave_id, function, body);
        let response = self.session.exchange(&frame).await?;
        rtu::validate_response(&response, slave_id, function)
    }

    /// Requests whose body is two big-endian words: the read functions
    /// (address + quantity) and the single-write functions (address + value)
    async fn request_pair(&self, function: u8, address: u16, word: u16) -> SolarmanResult<Vec<u8>> {
        let mut body = [0u8; 4];
        body[..2].copy_from_slice(&address.to_be_bytes());
        body[2..].copy_from_slice(&word.to_be_bytes());
        self.request(function, &body).await
    }
}

impl fmt::Display for SolarmanClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "solarmanv5://{}/{}",
            self.session.address(),
            self.session.slave_id()
        )
    }
}

#[async_trait]
impl ModbusClient for SolarmanClient {
    fn connection_string(&self) -> String {
        self.to_string()
    }

    fn set_slave(&mut self, slave_id: u8) {
        self.session.set_slave(slave_id);
    }

    fn set_timeout(&mut self, timeout: Duration) -> Duration {
        self.session.set_timeout(timeout)
    }

    fn set_logger(&mut self, logger: Option<FrameLogger>) {
        self.session.set_logger(logger);
    }

    fn connect_delay(&mut self, delay: Duration) {
        self.session.connect_delay(delay);
    }

    fn clone_with_slave(&self, slave_id: u8) -> Box<dyn ModbusClient> {
        Box::new(Self {
            session: self.session.clone_with_slave(slave_id),
        })
    }

    async fn close(&mut self) {
        self.session.close().await;
    }

    async fn stats(&self) -> TransportStats {
        self.session.stats().await
    }

    async fn read_coils(&mut self, address: u16, quantity: u16) -> SolarmanResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_READ_COILS {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid quantity: {quantity} (must be 1-{MAX_READ_COILS})"
            )));
        }
        self.request_pair(FC_READ_COILS, address, quantity).await
    }

    async fn read_discrete_inputs(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> SolarmanResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_READ_COILS {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid quantity: {quantity} (must be 1-{MAX_READ_COILS})"
            )));
        }
        self.request_pair(FC_READ_DISCRETE_INPUTS, address, quantity).await
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> SolarmanResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_READ_REGISTERS {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid quantity: {quantity} (must be 1-{MAX_READ_REGISTERS})"
            )));
        }
        self.request_pair(FC_READ_HOLDING_REGISTERS, address, quantity).await
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> SolarmanResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_READ_REGISTERS {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid quantity: {quantity} (must be 1-{MAX_READ_REGISTERS})"
            )));
        }
        self.request_pair(FC_READ_INPUT_REGISTERS, address, quantity).await
    }

    async fn write_single_coil(&mut self, address: u16, value: u16) -> SolarmanResult<Vec<u8>> {
        if value != 0x0000 && value != 0xFF00 {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid coil value: 0x{value:04X} (must be 0x0000 or 0xFF00)"
            )));
        }
        self.request_pair(FC_WRITE_SINGLE_COIL, address, value).await
    }

    async fn write_single_register(&mut self, address: u16, value: u16) -> SolarmanResult<Vec<u8>> {
        self.request_pair(FC_WRITE_SINGLE_REGISTER, address, value).await
    }

    async fn write_multiple_coils(
        &mut self,
        address: u16,
        quantity: u16,
        data: &[u8],
    ) -> SolarmanResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_WRITE_COILS {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid quantity: {quantity} (must be 1-{MAX_WRITE_COILS})"
            )));
        }
        let expected = (quantity as usize).div_ceil(8);
        if data.len() != expected {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid data length: got {}, expected {expected} bytes",
                data.len()
            )));
        }

        let mut body = Vec::with_capacity(5 + data.len());
        body.extend_from_slice(&address.to_be_bytes());
        body.extend_from_slice(&quantity.to_be_bytes());
        body.push(data.len() as u8);
        body.extend_from_slice(data);
        self.request(FC_WRITE_MULTIPLE_COILS, &body).await
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        quantity: u16,
        data: &[u8],
    ) -> SolarmanResult<Vec<u8>> {
        if quantity < 1 || quantity > MAX_WRITE_REGISTERS {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid quantity: {quantity} (must be 1-{MAX_WRITE_REGISTERS})"
            )));
        }
        let expected = quantity as usize * 2;
        if data.len() != expected {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid data length: got {}, expected {expected} bytes",
                data.len()
            )));
        }

        let mut body = Vec::with_capacity(5 + data.len());
        body.extend_from_slice(&address.to_be_bytes());
        body.extend_from_slice(&quantity.to_be_bytes());
        body.push(data.len() as u8);
        body.extend_from_slice(data);
        self.request(FC_WRITE_MULTIPLE_REGISTERS, &body).await
    }

    async fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> SolarmanResult<Vec<u8>> {
        let mut body = [0u8; 6];
        body[..2].copy_from_slice(&address.to_be_bytes());
        body[2..4].copy_from_slice(&and_mask.to_be_bytes());
        body[4..].copy_from_slice(&or_mask.to_be_bytes());
        self.request(FC_MASK_WRITE_REGISTER, &body).await
    }

    async fn read_write_multiple_registers(
        &mut self,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        write_quantity: u16,
        data: &[u8],
    ) -> SolarmanResult<Vec<u8>> {
        if read_quantity < 1 || read_quantity > MAX_READ_REGISTERS {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid read quantity: {read_quantity} (must be 1-{MAX_READ_REGISTERS})"
            )));
        }
        if write_quantity < 1 || write_quantity > MAX_READWRITE_WRITE_REGISTERS {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid write quantity: {write_quantity} (must be 1-{MAX_READWRITE_WRITE_REGISTERS})"
            )));
        }
        let expected = write_quantity as usize * 2;
        if data.len() != expected {
            return Err(SolarmanError::invalid_argument(format!(
                "invalid data length: got {}, expected {expected} bytes",
                data.len()
            )));
        }

        let mut body = Vec::with_capacity(9 + data.len());
        body.extend_from_slice(&read_address.to_be_bytes());
        body.extend_from_slice(&read_quantity.to_be_bytes());
        body.extend_from_slice(&write_address.to_be_bytes());
        body.extend_from_slice(&write_quantity.to_be_bytes());
        body.push(data.len() as u8);
        body.extend_from_slice(data);
        self.request(FC_READ_WRITE_MULTIPLE_REGISTERS, &body).await
    }

    async fn read_fifo_queue(&mut self, address: u16) -> SolarmanResult<Vec<u8>> {
        self.request(FC_READ_FIFO_QUEUE, &address.to_be_bytes())
            .await
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn client() -> SolarmanClient {
        // Port 1 is never connected to; argument guards must fire before any I/O
        SolarmanClient::new("127.0.0.1:1", 0x12345678).unwrap()
    }

    // ========================================================================
    // Capability Surface Tests
    // ========================================================================

    #[test]
    fn test_connection_string() {
        let client = SolarmanClient::with_slave("192.168.1.100", 1, 3).unwrap();
        assert_eq!(
            client.connection_string(),
            "solarmanv5://192.168.1.100:8899/3"
        );
        assert_eq!(client.to_string(), client.connection_string());
    }

    #[test]
    fn test_set_slave_changes_connection_string() {
        let mut client = client();
        client.set_slave(9);
        assert!(client.connection_string().ends_with("/9"));
    }

    #[test]
    fn test_clone_with_slave_is_boxed_trait_object() {
        let client = client();
        let clone: Box<dyn ModbusClient> = client.clone_with_slave(7);
        assert!(clone.connection_string().ends_with("/7"));
        // Source unchanged
        assert!(client.connection_string().ends_with("/1"));
    }

    #[test]
    fn test_set_timeout_returns_previous() {
        let mut client = client();
        let previous = client.set_timeout(Duration::from_millis(100));
        assert_eq!(previous, Duration::from_secs(5));
    }

    // ========================================================================
    // Argument Guard Tests (no I/O may happen: the endpoint is unreachable,
    // so any attempt to send would surface as a transport error instead)
    // ========================================================================

    #[tokio::test]
    async fn test_read_holding_registers_quantity_guard() {
        let mut client = client();
        for quantity in [0u16, 126, 1000] {
            let err = client.read_holding_registers(0, quantity).await.unwrap_err();
            assert!(
                matches!(err, SolarmanError::InvalidArgument(_)),
                "quantity {quantity}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_read_coils_quantity_guard() {
        let mut client = client();
        for quantity in [0u16, 2001] {
            let err = client.read_coils(0, quantity).await.unwrap_err();
            assert!(matches!(err, SolarmanError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn test_read_input_registers_quantity_guard() {
        let mut client = client();
        let err = client.read_input_registers(0, 126).await.unwrap_err();
        assert!(matches!(err, SolarmanError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_write_single_coil_value_guard() {
        let mut client = client();
        let err = client.write_single_coil(0, 0x1234).await.unwrap_err();
        assert!(matches!(err, SolarmanError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_write_multiple_coils_guards() {
        let mut client = client();

        let err = client.write_multiple_coils(0, 0, &[]).await.unwrap_err();
        assert!(matches!(err, SolarmanError::InvalidArgument(_)));

        let err = client
            .write_multiple_coils(0, 1969, &[0u8; 247])
            .await
            .unwrap_err();
        assert!(matches!(err, SolarmanError::InvalidArgument(_)));

        // 10 coils need 2 bytes, not 3
        let err = client
            .write_multiple_coils(0, 10, &[0x00, 0x01, 0x02])
            .await
            .unwrap_err();
        assert!(matches!(err, SolarmanError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_write_multiple_registers_guards() {
        let mut client = client();

        let err = client
            .write_multiple_registers(0, 124, &[0u8; 248])
            .await
            .unwrap_err();
        assert!(matches!(err, SolarmanError::InvalidArgument(_)));

        // 2 registers need 4 bytes, not 2
        let err = client
            .write_multiple_registers(0, 2, &[0x00, 0x01])
            .await
            .unwrap_err();
        assert!(matches!(err, SolarmanError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_read_write_multiple_registers_guards() {
        let mut client = client();

        let err = client
            .read_write_multiple_registers(0, 0, 0, 1, &[0x00, 0x01])
            .await
            .unwrap_err();
        assert!(matches!(err, SolarmanError::InvalidArgument(_)));

        let err = client
            .read_write_multiple_registers(0, 1, 0, 122, &[0u8; 244])
            .await
            .unwrap_err();
        assert!(matches!(err, SolarmanError::InvalidArgument(_)));

        let err = client
            .read_write_multiple_registers(0, 1, 0, 1, &[0x00])
            .await
            .unwrap_err();
        assert!(matches!(err, SolarmanError::InvalidArgument(_)));
    }
}
