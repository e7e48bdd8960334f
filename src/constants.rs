//! Protocol constants for SolarmanV5 framing and the embedded Modbus RTU layer
//!
//! The SolarmanV5 values mirror what the data-logging sticks actually emit on
//! port 8899. The Modbus quantity limits are derived from the official
//! specification (PDU capped at 253 bytes, inherited from the RS485 ADU
//! limit of 256 bytes).

// ============================================================================
// SolarmanV5 Envelope Constants
// ============================================================================

/// Envelope start sentinel
pub const FRAME_START: u8 = 0xA5;

/// Envelope end sentinel
pub const FRAME_END: u8 = 0x15;

/// Control code carried by requests (little-endian on the wire)
pub const CONTROL_REQUEST: u16 = 0x4510;

/// Control code carried by responses (little-endian on the wire)
pub const CONTROL_RESPONSE: u16 = 0x1510;

/// Default TCP port of Solarman data-logging sticks
pub const DEFAULT_TCP_PORT: u16 = 8899;

/// Frame type for solar inverter traffic
pub const FRAME_TYPE_INVERTER: u8 = 0x02;

/// Sensor type field (always zero for Modbus passthrough)
pub const SENSOR_TYPE: u16 = 0x0000;

/// Response payload status byte for real-time data
pub const STATUS_OK: u8 = 0x01;

// ============================================================================
// Envelope Size Constants
// ============================================================================

/// Envelope header: start(1) + length(2) + control(2) + sequence(2) + serial(4)
pub const HEADER_LEN: usize = 11;

/// Trailer: checksum(1) + end(1)
pub const TRAILER_LEN: usize = 2;

/// Value the length field of a request declares on top of the RTU frame.
/// Loggers accept it even though the emitted request payload prefix is
/// [`REQUEST_PREFIX_LEN`] bytes; kept for wire compatibility.
pub const REQUEST_PAYLOAD_MIN: usize = 15;

/// Bytes of request payload before the RTU frame:
/// frame_type(1) + sensor_type(2) + total_working_time(4) + power_on_time(4)
pub const REQUEST_PREFIX_LEN: usize = 11;

/// Bytes of response payload before the RTU frame:
/// frame_type(1) + status(1) + total_working_time(4) + power_on_time(4) + offset_time(4)
pub const RESPONSE_PAYLOAD_MIN: usize = 14;

/// Smallest parseable response envelope
pub const MIN_RESPONSE_SIZE: usize = HEADER_LEN + RESPONSE_PAYLOAD_MIN + TRAILER_LEN;

/// Largest RTU frame a response may carry
/// (RS485 ADU limit: slave(1) + PDU(253) + CRC(2))
pub const MAX_RTU_FRAME_SIZE: usize = 256;

/// Largest plausible response payload length field
pub const MAX_RESPONSE_PAYLOAD: usize = RESPONSE_PAYLOAD_MIN + MAX_RTU_FRAME_SIZE;

// ============================================================================
// Modbus Quantity Limits
// ============================================================================

/// Maximum coils for FC01/FC02 reads
pub const MAX_READ_COILS: u16 = 2000;

/// Maximum registers for FC03/FC04 reads
/// (1 + 1 + N * 2 <= 253 -> N <= 125)
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum coils for FC15 writes
pub const MAX_WRITE_COILS: u16 = 1968;

/// Maximum registers for FC16 writes
/// (1 + 2 + 2 + 1 + N * 2 <= 253 -> N <= 123)
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Maximum registers written by FC23 (read side shares [`MAX_READ_REGISTERS`])
pub const MAX_READWRITE_WRITE_REGISTERS: u16 = 121;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Mask Write Register (FC22)
pub const FC_MASK_WRITE_REGISTER: u8 = 0x16;

/// Read/Write Multiple Registers (FC23)
pub const FC_READ_WRITE_MULTIPLE_REGISTERS: u8 = 0x17;

/// Read FIFO Queue (FC24)
pub const FC_READ_FIFO_QUEUE: u8 = 0x18;

/// Exception flag ORed into the function code of error replies
pub const EXCEPTION_FLAG: u8 = 0x80;
