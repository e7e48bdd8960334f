//! SolarmanV5 envelope codec
//!
//! Builds request envelopes around a caller-supplied Modbus RTU frame and
//! parses response envelopes back down to the inner RTU frame. The codec is
//! stateless: the sequence number is an explicit argument and the connection
//! session owns the counter.
//!
//! Mixed endianness warning: every multi-byte field of the envelope is
//! little-endian, while the embedded Modbus PDU is big-endian and the Modbus
//! CRC trailer is little-endian. Do not hoist one byte-order policy across
//! the layer boundary.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::checksum::sum8;
use crate::constants::{
    CONTROL_REQUEST, CONTROL_RESPONSE, FRAME_END, FRAME_START, FRAME_TYPE_INVERTER, HEADER_LEN,
    MIN_RESPONSE_SIZE, REQUEST_PAYLOAD_MIN, REQUEST_PREFIX_LEN, RESPONSE_PAYLOAD_MIN, SENSOR_TYPE,
    STATUS_OK, TRAILER_LEN,
};
use crate::error::{EnvelopeFault, SolarmanError, SolarmanResult};

/// Envelope header: start sentinel plus four little-endian fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Declared payload length
    pub length: u16,
    /// Control code (0x4510 request, 0x1510 response)
    pub control: u16,
    /// Per-session sequence number
    pub sequence: u16,
    /// Serial number of the data logger
    pub logger_serial: u32,
}

impl EnvelopeHeader {
    /// Append the 11 header bytes to `out`
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(FRAME_START);
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.control.to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&self.logger_serial.to_le_bytes());
    }

    /// Decode a header from the first 11 bytes of an envelope, validating the
    /// start sentinel
    pub fn decode(bytes: &[u8]) -> SolarmanResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(SolarmanError::MalformedEnvelope(EnvelopeFault::TooShort(
                bytes.len(),
            )));
        }
        if bytes[0] != FRAME_START {
            return Err(SolarmanError::MalformedEnvelope(EnvelopeFault::StartByte(
                bytes[0],
            )));
        }
        Ok(Self {
            length: u16::from_le_bytes([bytes[1], bytes[2]]),
            control: u16::from_le_bytes([bytes[3], bytes[4]]),
            sequence: u16::from_le_bytes([bytes[5], bytes[6]]),
            logger_serial: u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]),
        })
    }
}

/// Request payload: fixed prefix followed by the opaque RTU frame
#[derive(Debug, Clone, Copy)]
struct RequestPayload<'a> {
    frame_type: u8,
    sensor_type: u16,
    total_working_time: u32,
    power_on_time: u32,
    rtu_frame: &'a [u8],
}

impl RequestPayload<'_> {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.frame_type);
        out.extend_from_slice(&self.sensor_type.to_le_bytes());
        out.extend_from_slice(&self.total_working_time.to_le_bytes());
        out.extend_from_slice(&self.power_on_time.to_le_bytes());
        out.extend_from_slice(self.rtu_frame);
    }
}

/// Trailer: additive checksum over everything after the start sentinel, then
/// the end sentinel
#[derive(Debug, Clone, Copy)]
struct Trailer {
    checksum: u8,
}

impl Trailer {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.checksum);
        out.push(FRAME_END);
    }
}

/// Current Unix time truncated to 32 bits; informational only to the logger
fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Build a SolarmanV5 request envelope around a Modbus RTU frame.
///
/// `power_on_time` is stamped with the current Unix time; use
/// [`build_request_with_uptime`] when a fixed value is needed.
pub fn build_request(rtu_frame: &[u8], sequence: u16, logger_serial: u32) -> Vec<u8> {
    build_request_with_uptime(rtu_frame, sequence, logger_serial, unix_now())
}

/// Build a request envelope with an explicit `power_on_time` value.
///
/// The length field declares `15 + len(rtu_frame)` while the emitted payload
/// prefix is 11 bytes; loggers tolerate the overdeclaration and it is kept
/// for wire compatibility with deployed firmware.
pub fn build_request_with_uptime(
    rtu_frame: &[u8],
    sequence: u16,
    logger_serial: u32,
    power_on_time: u32,
) -> Vec<u8> {
    let declared = (REQUEST_PAYLOAD_MIN + rtu_frame.len()) as u16;
    let mut packet =
        Vec::with_capacity(HEADER_LEN + REQUEST_PREFIX_LEN + rtu_frame.len() + TRAILER_LEN);

    EnvelopeHeader {
        length: declared,
        control: CONTROL_REQUEST,
        sequence,
        logger_serial,
    }
    .encode(&mut packet);

    RequestPayload {
        frame_type: FRAME_TYPE_INVERTER,
        sensor_type: SENSOR_TYPE,
        total_working_time: 0,
        power_on_time,
        rtu_frame,
    }
    .encode(&mut packet);

    Trailer {
        checksum: sum8(&packet[1..]),
    }
    .encode(&mut packet);

    packet
}

/// Parse a complete SolarmanV5 response envelope and extract the inner
/// Modbus RTU frame.
///
/// Validates, in order: minimum size, start sentinel, declared payload
/// length, sum-8 checksum, end sentinel, frame type and logger status. The
/// response control code is not enforced; a value other than 0x1510 is
/// logged and otherwise ignored.
pub fn parse_response(frame: &[u8]) -> SolarmanResult<Vec<u8>> {
    if frame.len() < MIN_RESPONSE_SIZE {
        return Err(SolarmanError::MalformedEnvelope(EnvelopeFault::TooShort(
            frame.len(),
        )));
    }

    let header = EnvelopeHeader::decode(frame)?;

    if HEADER_LEN + header.length as usize + TRAILER_LEN != frame.len() {
        return Err(SolarmanError::MalformedEnvelope(EnvelopeFault::Length {
            declared: header.length,
            actual: frame.len(),
        }));
    }

    let checksum_offset = frame.len() - TRAILER_LEN;
    let expected = sum8(&frame[1..checksum_offset]);
    let actual = frame[checksum_offset];
    if expected != actual {
        return Err(SolarmanError::ChecksumMismatch { expected, actual });
    }

    let end = frame[frame.len() - 1];
    if end != FRAME_END {
        return Err(SolarmanError::MalformedEnvelope(EnvelopeFault::EndByte(
            end,
        )));
    }

    if header.control != CONTROL_RESPONSE {
        warn!(
            "unexpected response control code 0x{:04X} (expected 0x{:04X})",
            header.control, CONTROL_RESPONSE
        );
    }

    let payload = &frame[HEADER_LEN..checksum_offset];

    let frame_type = payload[0];
    if frame_type != FRAME_TYPE_INVERTER {
        return Err(SolarmanError::MalformedEnvelope(EnvelopeFault::FrameType(
            frame_type,
        )));
    }

    let status = payload[1];
    if status != STATUS_OK {
        return Err(SolarmanError::LoggerStatus { status });
    }

    let rtu_frame = &payload[RESPONSE_PAYLOAD_MIN..];
    if rtu_frame.is_empty() {
        return Err(SolarmanError::MalformedEnvelope(EnvelopeFault::EmptyFrame));
    }

    Ok(rtu_frame.to_vec())
}
