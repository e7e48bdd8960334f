//! Modbus RTU frame layer
//!
//! The SolarmanV5 envelope carries plain Modbus RTU frames: slave ID,
//! function code, big-endian body, little-endian CRC-16. This module builds
//! request frames, validates response frames, and compensates for inverter
//! firmware that appends a redundant second CRC.

use crate::checksum::crc16;
use crate::constants::EXCEPTION_FLAG;
use crate::error::{SolarmanError, SolarmanResult};

/// Assemble an RTU request frame: slave ID + function code + body + CRC-16.
///
/// The body must already be big-endian encoded; the CRC is appended
/// little-endian per Modbus convention.
pub fn build_request(slave_id: u8, function: u8, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(2 + body.len() + 2);
    frame.push(slave_id);
    frame.push(function);
    frame.extend_from_slice(body);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Validate an RTU response frame and return its data portion (the bytes
/// after the function code and before the CRC).
///
/// Checks run in this order: minimum length, slave ID, exception flag,
/// function code, CRC. A slave ID mismatch is recoverable: the caller may
/// retry on the same session.
pub fn validate_response(frame: &[u8], slave_id: u8, function: u8) -> SolarmanResult<Vec<u8>> {
    if frame.len() < 3 {
        return Err(SolarmanError::malformed_response(format!(
            "response too short: {} bytes",
            frame.len()
        )));
    }

    if frame[0] != slave_id {
        return Err(SolarmanError::SlaveIdMismatch {
            expected: slave_id,
            actual: frame[0],
        });
    }

    if frame[1] == (function | EXCEPTION_FLAG) {
        if frame.len() < 5 {
            return Err(SolarmanError::malformed_response(
                "exception response too short",
            ));
        }
        return Err(SolarmanError::ModbusException {
            function,
            code: frame[2],
        });
    }

    if frame[1] != function {
        return Err(SolarmanError::UnexpectedFunctionCode {
            expected: function,
            actual: frame[1],
        });
    }

    if frame.len() >= 4 {
        let crc_offset = frame.len() - 2;
        let expected = crc16(&frame[..crc_offset]);
        let actual = u16::from_le_bytes([frame[crc_offset], frame[crc_offset + 1]]);
        if expected != actual {
            return Err(SolarmanError::CrcMismatch { expected, actual });
        }
    }

    if frame.len() > 4 {
        Ok(frame[2..frame.len() - 2].to_vec())
    } else {
        Ok(Vec::new())
    }
}

/// Strip the redundant trailing CRC some inverter families (notably DEYE)
/// append to responses.
///
/// If the frame minus its last two bytes already ends in a valid CRC, those
/// two bytes are the duplicate and are dropped; otherwise the frame is
/// returned unchanged. Frames whose final CRC is the only valid one are
/// never touched: the inner CRC over the shorter slice cannot match.
pub fn fix_double_crc(frame: Vec<u8>) -> Vec<u8> {
    if frame.len() < 4 {
        return frame;
    }

    let inner = &frame[..frame.len() - 2];
    if inner.len() < 3 {
        return frame;
    }

    let expected = crc16(&inner[..inner.len() - 2]);
    let actual = u16::from_le_bytes([inner[inner.len() - 2], inner[inner.len() - 1]]);

    if expected == actual {
        inner.to_vec()
    } else {
        frame
    }
}
