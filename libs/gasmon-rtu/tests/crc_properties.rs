//! CRC16 framing properties
//!
//! Any sealed frame validates; any single flipped bit before the CRC slot
//! makes validation fail.

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable

use gasmon_rtu::frame::{build_request, crc16, expected_response_len, validate_response, with_crc};
use gasmon_rtu::FunctionCode;
use proptest::prelude::*;

fn function_code() -> impl Strategy<Value = FunctionCode> {
    prop_oneof![
        Just(FunctionCode::ReadDiscreteInputs),
        Just(FunctionCode::ReadHoldingRegisters),
        Just(FunctionCode::ReadInputRegisters),
        Just(FunctionCode::Diagnostics),
    ]
}

proptest! {
    #[test]
    fn sealed_body_always_validates(body in proptest::collection::vec(any::<u8>(), 2..256)) {
        let frame = with_crc(&body);
        prop_assert!(validate_response(&frame));
        let crc = crc16(&body);
        prop_assert_eq!(frame[frame.len() - 2], (crc & 0xFF) as u8);
        prop_assert_eq!(frame[frame.len() - 1], (crc >> 8) as u8);
    }

    #[test]
    fn single_bit_flip_in_payload_fails(
        body in proptest::collection::vec(any::<u8>(), 2..64),
        index in any::<proptest::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut frame = with_crc(&body);
        let at = index.index(body.len());
        frame[at] ^= 1 << bit;
        prop_assert!(!validate_response(&frame));
    }

    #[test]
    fn built_requests_validate(
        address in 1u8..=247,
        function in function_code(),
        field1 in any::<u16>(),
        field2 in any::<u16>(),
    ) {
        let frame = build_request(address, function, field1, field2);
        prop_assert_eq!(frame.len(), 8);
        prop_assert!(validate_response(frame.as_bytes()));
    }

    #[test]
    fn register_reads_expect_two_bytes_per_register(count in 1u16..=125) {
        prop_assert_eq!(
            expected_response_len(FunctionCode::ReadInputRegisters, count),
            5 + 2 * usize::from(count)
        );
        prop_assert_eq!(
            expected_response_len(FunctionCode::ReadHoldingRegisters, count),
            5 + 2 * usize::from(count)
        );
    }

    #[test]
    fn discrete_reads_expect_packed_bytes(count in 1u16..=2000) {
        let expected = (usize::from(count) + 7) / 8;
        prop_assert_eq!(
            expected_response_len(FunctionCode::ReadDiscreteInputs, count),
            5 + expected
        );
    }
}
