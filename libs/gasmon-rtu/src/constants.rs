//! Modbus RTU protocol constants

use std::time::Duration;

/// Per-byte read deadline. Not configurable.
pub const READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Deadline for writing one request frame. Not configurable.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Valid slave address range on a serial bus
pub const MIN_SLAVE_ADDRESS: u8 = 1;
pub const MAX_SLAVE_ADDRESS: u8 = 247;

/// Protocol request limits
pub const MAX_READ_BITS: u16 = 2000;
pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Address + function + CRC
pub const MIN_FRAME_LEN: usize = 4;
pub const CRC_LEN: usize = 2;

/// Address + function + byte count + CRC, wrapped around read payloads
pub const READ_RESPONSE_OVERHEAD: usize = 5;

/// FC08 echo and FC16 acknowledgment are both 8 bytes on the wire
pub const FIXED_RESPONSE_LEN: usize = 8;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Function codes supported by the master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    Diagnostics = 0x08,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x02 => Ok(Self::ReadDiscreteInputs),
            0x03 => Ok(Self::ReadHoldingRegisters),
            0x04 => Ok(Self::ReadInputRegisters),
            0x08 => Ok(Self::Diagnostics),
            0x10 => Ok(Self::WriteMultipleRegisters),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FC{:02}", self.code())
    }
}
