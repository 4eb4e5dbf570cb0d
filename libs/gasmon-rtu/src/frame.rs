//! RTU frame encoding and response checks
//!
//! Wire layout: `[address][function][payload...][crc_lo][crc_hi]`.
//! The CRC covers every byte before the trailing two.

use crate::constants::{
    FunctionCode, CRC_LEN, FIXED_RESPONSE_LEN, MIN_FRAME_LEN, READ_RESPONSE_OVERHEAD,
};
use tracing::debug;

/// One request frame, CRC included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// CRC16, Modbus variant (reflected polynomial 0xA001, initial value 0xFFFF)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn seal(mut body: Vec<u8>) -> Frame {
    let crc = crc16(&body);
    // Low byte first
    body.extend_from_slice(&crc.to_le_bytes());
    Frame(body)
}

/// Build a fixed-shape request: two big-endian 16-bit fields after the
/// function code (start/count for reads, subfunction/data for FC08).
pub fn build_request(address: u8, function: FunctionCode, field1: u16, field2: u16) -> Frame {
    debug!(
        "Building RTU frame: unit_id={}, {}, field1={}, field2={}",
        address, function, field1, field2
    );
    let mut body = Vec::with_capacity(8);
    body.push(address);
    body.push(function.code());
    body.extend_from_slice(&field1.to_be_bytes());
    body.extend_from_slice(&field2.to_be_bytes());
    seal(body)
}

/// Build an FC16 request carrying `values` starting at register `start`.
///
/// The caller bounds `values.len()`; the byte-count field is `2 * len` truncated to u8.
pub fn build_write_multiple(address: u8, start: u16, values: &[u16]) -> Frame {
    let count = values.len() as u16;
    debug!(
        "Building RTU frame: unit_id={}, FC16, start={}, count={}",
        address, start, count
    );
    let mut body = Vec::with_capacity(9 + values.len() * 2);
    body.push(address);
    body.push(FunctionCode::WriteMultipleRegisters.code());
    body.extend_from_slice(&start.to_be_bytes());
    body.extend_from_slice(&count.to_be_bytes());
    body.push((values.len() * 2) as u8);
    for value in values {
        body.extend_from_slice(&value.to_be_bytes());
    }
    seal(body)
}

/// Recompute the CRC over everything except the trailing two bytes and
/// compare against them (low, high).
pub fn validate_response(bytes: &[u8]) -> bool {
    if bytes.len() < MIN_FRAME_LEN {
        return false;
    }
    let split = bytes.len() - CRC_LEN;
    let expected = crc16(&bytes[..split]);
    let received = u16::from_le_bytes([bytes[split], bytes[split + 1]]);
    expected == received
}

/// Seal an arbitrary frame body with its CRC. Used by slave-side code.
pub fn with_crc(body: &[u8]) -> Vec<u8> {
    seal(body.to_vec()).into_vec()
}

/// Packed byte count of an FC02 reply for `count` inputs
pub fn discrete_byte_count(count: u16) -> usize {
    usize::from(count).div_ceil(8)
}

/// Total wire length of the response the slave owes for this request
pub fn expected_response_len(function: FunctionCode, count: u16) -> usize {
    match function {
        FunctionCode::ReadDiscreteInputs => READ_RESPONSE_OVERHEAD + discrete_byte_count(count),
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            READ_RESPONSE_OVERHEAD + 2 * usize::from(count)
        },
        FunctionCode::Diagnostics | FunctionCode::WriteMultipleRegisters => FIXED_RESPONSE_LEN,
    }
}

/// Data bytes of a read response (between byte count and CRC)
pub fn read_payload(response: &[u8]) -> &[u8] {
    if response.len() < READ_RESPONSE_OVERHEAD {
        return &[];
    }
    &response[3..response.len() - CRC_LEN]
}

/// Render bytes as upper-case hex pairs separated by spaces
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_crc16_calculation() {
        let data = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16(&data), 0x0A84);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_build_request_layout() {
        let frame = build_request(1, FunctionCode::ReadHoldingRegisters, 0x0000, 0x0001);
        // Well-known reference frame: 01 03 00 00 00 01 84 0A
        assert_eq!(
            frame.as_bytes(),
            &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]
        );
        assert!(validate_response(frame.as_bytes()));
    }

    #[test]
    fn test_build_request_big_endian_fields() {
        let frame = build_request(0x11, FunctionCode::Diagnostics, 0x0000, 0xABCD);
        assert_eq!(&frame.as_bytes()[..6], &[0x11, 0x08, 0x00, 0x00, 0xAB, 0xCD]);
        assert_eq!(frame.len(), 8);
    }

    #[test]
    fn test_build_write_multiple_layout() {
        let frame = build_write_multiple(1, 0x0010, &[0x1234, 0xABCD]);
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), 9 + 2 * 2);
        assert_eq!(bytes[1], 0x10);
        assert_eq!(&bytes[2..4], &[0x00, 0x10]);
        assert_eq!(&bytes[4..6], &[0x00, 0x02]);
        assert_eq!(bytes[6], 4);
        assert_eq!(&bytes[7..11], &[0x12, 0x34, 0xAB, 0xCD]);
        assert!(validate_response(bytes));
    }

    #[test]
    fn test_validate_rejects_short_and_corrupt() {
        assert!(!validate_response(&[]));
        assert!(!validate_response(&[0x01, 0x03, 0xFF]));

        let mut bytes = build_request(1, FunctionCode::ReadInputRegisters, 0, 2).into_vec();
        bytes[3] ^= 0x01;
        assert!(!validate_response(&bytes));
    }

    #[test]
    fn test_expected_response_len() {
        assert_eq!(expected_response_len(FunctionCode::ReadDiscreteInputs, 1), 6);
        assert_eq!(expected_response_len(FunctionCode::ReadDiscreteInputs, 8), 6);
        assert_eq!(expected_response_len(FunctionCode::ReadDiscreteInputs, 9), 7);
        assert_eq!(expected_response_len(FunctionCode::ReadInputRegisters, 2), 9);
        assert_eq!(expected_response_len(FunctionCode::ReadHoldingRegisters, 125), 255);
        assert_eq!(expected_response_len(FunctionCode::Diagnostics, 0xABCD), 8);
        assert_eq!(expected_response_len(FunctionCode::WriteMultipleRegisters, 3), 8);
    }

    #[test]
    fn test_read_payload_and_hex() {
        let response = with_crc(&[0x01, 0x04, 0x04, 0x41, 0xA0, 0x1E, 0x1F]);
        assert_eq!(read_payload(&response), &[0x41, 0xA0, 0x1E, 0x1F]);
        assert_eq!(to_hex(read_payload(&response)), "41 A0 1E 1F");
        assert_eq!(to_hex(&[]), "");
    }
}
