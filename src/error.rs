//! Error types for the SolarmanV5 transport
//!
//! One flat error enum covers configuration, transport, envelope and Modbus
//! level failures so callers can match on exactly what went wrong.

use thiserror::Error;

/// Result type for voltage-solarman operations
pub type SolarmanResult<T> = std::result::Result<T, SolarmanError>;

/// Faults detected while validating a SolarmanV5 envelope
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeFault {
    /// Envelope shorter than header + minimum payload + trailer
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),

    /// Start sentinel is not 0xA5
    #[error("bad start byte 0x{0:02X}")]
    StartByte(u8),

    /// End sentinel is not 0x15
    #[error("bad end byte 0x{0:02X}")]
    EndByte(u8),

    /// Declared payload length does not match the buffer
    #[error("declared payload length {declared} does not match frame of {actual} bytes")]
    Length { declared: u16, actual: usize },

    /// Declared payload length outside the plausible range for a response
    #[error("implausible payload length {0}")]
    PayloadLength(u16),

    /// Payload frame type is not 0x02 (solar inverter)
    #[error("unexpected frame type 0x{0:02X}")]
    FrameType(u8),

    /// Envelope carried no inner Modbus frame
    #[error("empty inner frame")]
    EmptyFrame,
}

/// SolarmanV5 transport errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolarmanError {
    /// Configuration errors (empty address, missing logger serial, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// TCP connect/read/write failures
    #[error("transport error: {0}")]
    Transport(String),

    /// Deadline elapsed during connect, send or receive
    #[error("timeout: {0}")]
    Timeout(String),

    /// Envelope framing violations
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(EnvelopeFault),

    /// Envelope sum-8 checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Modbus RTU CRC-16 mismatch
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Logger replied with a status byte other than 0x01
    #[error("logger status 0x{status:02X}")]
    LoggerStatus { status: u8 },

    /// Slave replied with FC | 0x80 and an exception code
    #[error("modbus exception: function 0x{function:02X}, code 0x{code:02X}")]
    ModbusException { function: u8, code: u8 },

    /// Response came from a different slave than addressed
    #[error("slave ID mismatch: expected {expected}, got {actual}")]
    SlaveIdMismatch { expected: u8, actual: u8 },

    /// Response function code differs from the request (and is no exception)
    #[error("unexpected function code: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedFunctionCode { expected: u8, actual: u8 },

    /// Structurally invalid RTU response
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Caller violated a documented argument range; nothing was sent
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

// Helper methods for creating errors
impl SolarmanError {
    pub fn config(msg: impl Into<String>) -> Self {
        SolarmanError::Config(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        SolarmanError::Transport(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        SolarmanError::Timeout(msg.into())
    }

    pub fn malformed_response(msg: impl Into<String>) -> Self {
        SolarmanError::MalformedResponse(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        SolarmanError::InvalidArgument(msg.into())
    }

    /// Check if this error indicates the socket was (or must be) torn down,
    /// so the next exchange starts on a fresh connection
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            SolarmanError::Transport(_)
                | SolarmanError::Timeout(_)
                | SolarmanError::MalformedEnvelope(_)
                | SolarmanError::ChecksumMismatch { .. }
                | SolarmanError::LoggerStatus { .. }
        )
    }

    /// Check if this error is an integrity failure (checksum or CRC)
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            SolarmanError::ChecksumMismatch { .. } | SolarmanError::CrcMismatch { .. }
        )
    }

    /// Check if the caller may simply retry the request on the same session.
    /// A slave ID mismatch usually means a stale frame was drained.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SolarmanError::SlaveIdMismatch { .. })
    }
}

impl From<std::io::Error> for SolarmanError {
    fn from(err: std::io::Error) -> Self {
        SolarmanError::Transport(err.to_string())
    }
}
