//! Modbus RTU master: one operation per supported function code
//!
//! Every operation checks the transport first and fails with
//! [`RtuError::PortNotOpen`] without touching the line. The outcome of the
//! last call is kept as an operator-facing status string.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::constants::{
    FunctionCode, FIXED_RESPONSE_LEN, MAX_READ_BITS, MAX_READ_REGISTERS, MAX_WRITE_REGISTERS,
};
use crate::error::{Result, RtuError};
use crate::frame::{
    build_request, build_write_multiple, discrete_byte_count, expected_response_len, read_payload,
    validate_response,
};
use crate::link::{LinkFactory, SerialSettings};
use crate::transport::Transport;

const READ_OK: &str = "Read successful";
const WRITE_OK: &str = "Write successful";

#[derive(Debug)]
pub struct ModbusMaster {
    transport: Transport,
    status: String,
}

impl ModbusMaster {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            status: String::new(),
        }
    }

    pub fn with_factory(factory: Arc<dyn LinkFactory>) -> Self {
        Self::new(Transport::new(factory))
    }

    /// Status line of the last operation
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn open(&mut self, settings: &SerialSettings) -> Result<()> {
        let result = self.transport.open(settings);
        let ok = format!("{} opened successfully", settings.port);
        self.record(result, &ok)
    }

    /// Close the port. A successful close keeps the previous status line so
    /// the outcome of the last exchange stays visible.
    pub fn close(&mut self) -> Result<()> {
        let result = self.transport.close();
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    /// Open the port for the lifetime of the returned guard.
    ///
    /// The guard closes the port when dropped, including when the future
    /// using it is cancelled.
    pub fn session(&mut self, settings: &SerialSettings) -> Result<Session<'_>> {
        self.open(settings)?;
        Ok(Session { master: self })
    }

    fn record<T>(&mut self, result: Result<T>, ok: &str) -> Result<T> {
        match &result {
            Ok(_) => self.status = ok.to_string(),
            Err(e) => self.fail(e),
        }
        result
    }

    fn fail(&mut self, err: &RtuError) {
        warn!("RTU: {}", err);
        self.status = err.status();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.transport.is_open() {
            Ok(())
        } else {
            Err(RtuError::PortNotOpen)
        }
    }

    fn check_count(function: FunctionCode, count: u16, max: u16) -> Result<()> {
        if count == 0 || count > max {
            return Err(RtuError::InvalidRequest(format!(
                "{} count {} outside 1..={}",
                function, count, max
            )));
        }
        Ok(())
    }

    /// Build, exchange and CRC-check one fixed-shape request
    async fn exchange(
        &mut self,
        slave: u8,
        function: FunctionCode,
        field1: u16,
        field2: u16,
    ) -> Result<Vec<u8>> {
        let request = build_request(slave, function, field1, field2);
        let expected = expected_response_len(function, field2);
        let response = self.transport.transact(&request, expected).await?;
        if !validate_response(&response) {
            return Err(RtuError::Crc);
        }
        Ok(response)
    }

    /// FC02: packed input bits, `ceil(count / 8)` bytes, LSB first
    pub async fn read_discrete_inputs(
        &mut self,
        slave: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u8>> {
        let result = self.fc02(slave, start, count).await;
        self.record(result, READ_OK)
    }

    async fn fc02(&mut self, slave: u8, start: u16, count: u16) -> Result<Vec<u8>> {
        self.ensure_open()?;
        Self::check_count(FunctionCode::ReadDiscreteInputs, count, MAX_READ_BITS)?;
        let response = self
            .exchange(slave, FunctionCode::ReadDiscreteInputs, start, count)
            .await?;

        let expected = discrete_byte_count(count) as u8;
        if response[2] != expected {
            return Err(RtuError::ByteCount {
                expected,
                actual: response[2],
            });
        }
        Ok(read_payload(&response).to_vec())
    }

    /// FC03: `2 * count` raw register bytes, big-endian per register
    pub async fn read_holding_registers(
        &mut self,
        slave: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u8>> {
        let result = self
            .read_registers(FunctionCode::ReadHoldingRegisters, slave, start, count)
            .await;
        self.record(result, READ_OK)
    }

    /// FC04: `2 * count` raw register bytes, big-endian per register
    pub async fn read_input_registers(
        &mut self,
        slave: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u8>> {
        let result = self
            .read_registers(FunctionCode::ReadInputRegisters, slave, start, count)
            .await;
        self.record(result, READ_OK)
    }

    async fn read_registers(
        &mut self,
        function: FunctionCode,
        slave: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u8>> {
        self.ensure_open()?;
        Self::check_count(function, count, MAX_READ_REGISTERS)?;
        let response = self.exchange(slave, function, start, count).await?;
        // The byte-count field is not compared with `count` here, unlike FC02.
        // Length is already fixed by the read and the CRC has passed.
        Ok(read_payload(&response).to_vec())
    }

    /// FC08: returns the two data bytes echoed by the slave
    pub async fn diagnostics(&mut self, slave: u8, subfunction: u16, data: u16) -> Result<[u8; 2]> {
        let result = self.fc08(slave, subfunction, data).await;
        self.record(result, READ_OK)
    }

    async fn fc08(&mut self, slave: u8, subfunction: u16, data: u16) -> Result<[u8; 2]> {
        self.ensure_open()?;
        let response = self
            .exchange(slave, FunctionCode::Diagnostics, subfunction, data)
            .await?;
        Ok([response[4], response[5]])
    }

    /// FC16: write `values` from register `start`; success only
    pub async fn write_multiple_registers(
        &mut self,
        slave: u8,
        start: u16,
        values: &[u16],
    ) -> Result<()> {
        let result = self.fc16(slave, start, values).await;
        self.record(result, WRITE_OK)
    }

    async fn fc16(&mut self, slave: u8, start: u16, values: &[u16]) -> Result<()> {
        self.ensure_open()?;
        if values.is_empty() || values.len() > usize::from(MAX_WRITE_REGISTERS) {
            return Err(RtuError::InvalidRequest(format!(
                "FC16 count {} outside 1..={}",
                values.len(),
                MAX_WRITE_REGISTERS
            )));
        }
        let request = build_write_multiple(slave, start, values);
        let response = self.transport.transact(&request, FIXED_RESPONSE_LEN).await?;
        if !validate_response(&response) {
            return Err(RtuError::Crc);
        }
        debug!("FC16 ack: {} registers from {}", values.len(), start);
        Ok(())
    }

    /// Run a read-style command by raw function code.
    ///
    /// FC08 takes `start` as the subfunction and `length` as the data word.
    /// Returns the payload bytes (the echoed word for FC08).
    pub async fn execute(
        &mut self,
        function: u8,
        slave: u8,
        start: u16,
        length: u16,
    ) -> Result<Vec<u8>> {
        match FunctionCode::try_from(function) {
            Ok(FunctionCode::ReadDiscreteInputs) => {
                self.read_discrete_inputs(slave, start, length).await
            },
            Ok(FunctionCode::ReadHoldingRegisters) => {
                self.read_holding_registers(slave, start, length).await
            },
            Ok(FunctionCode::ReadInputRegisters) => {
                self.read_input_registers(slave, start, length).await
            },
            Ok(FunctionCode::Diagnostics) => self
                .diagnostics(slave, start, length)
                .await
                .map(|echo| echo.to_vec()),
            Ok(FunctionCode::WriteMultipleRegisters) | Err(_) => {
                let result: Result<Vec<u8>> = Err(RtuError::UnsupportedFunction(function));
                self.record(result, READ_OK)
            },
        }
    }
}

/// Open-port guard returned by [`ModbusMaster::session`]
pub struct Session<'a> {
    master: &'a mut ModbusMaster,
}

impl Session<'_> {
    /// Close explicitly and report the outcome
    pub fn close(self) -> Result<()> {
        self.master.close()
    }
}

impl Deref for Session<'_> {
    type Target = ModbusMaster;

    fn deref(&self) -> &Self::Target {
        self.master
    }
}

impl DerefMut for Session<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.master
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.master.is_open() {
            if let Err(e) = self.master.transport.close() {
                warn!("RTU close on drop: {}", e);
            }
        }
    }
}
