//! In-memory Modbus RTU slave
//!
//! Implements [`LinkFactory`] so a [`Transport`](crate::Transport) can talk to
//! it exactly as it would to a serial device. Requests are CRC-checked and
//! answered from register maps; faults can be queued to exercise timeouts and
//! corrupt replies. Register addresses are zero-based.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::constants::{FunctionCode, EXCEPTION_FLAG};
use crate::frame::{discrete_byte_count, validate_response, with_crc};
use crate::link::{LinkFactory, SerialLink, SerialSettings};

/// Misbehaviour applied to the reply of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Swallow the request and answer nothing
    Silent,
    /// Flip the lowest bit of the CRC
    CorruptCrc,
    /// Send only the first `n` bytes of the reply
    Truncate(usize),
    /// Replace the byte-count field of a read reply (CRC kept valid)
    ByteCount(u8),
    /// Answer nothing and fail the next read with an I/O error
    IoError(String),
    /// Reject the request itself with an I/O error on write
    WriteError(String),
}

#[derive(Debug, Default)]
struct SlaveState {
    input_registers: HashMap<u16, u16>,
    holding_registers: HashMap<u16, u16>,
    discrete_inputs: HashMap<u16, bool>,
    faults: VecDeque<Fault>,
    fail_open: Option<String>,
    /// Pending failure for the next byte read
    read_error: Option<String>,
    /// Bytes waiting on the line for the master
    rx: VecDeque<u8>,
    open_links: usize,
    opens: usize,
    discarded: usize,
    requests: Vec<Vec<u8>>,
}

/// Simulated slave; clones share state
#[derive(Debug, Clone)]
pub struct RtuSlaveSimulator {
    address: u8,
    state: Arc<Mutex<SlaveState>>,
}

impl RtuSlaveSimulator {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            state: Arc::new(Mutex::new(SlaveState::default())),
        }
    }

    pub fn set_input_register(&self, register: u16, value: u16) {
        self.state.lock().input_registers.insert(register, value);
    }

    /// Store `value` as an IEEE-754 float across two input registers,
    /// high word first.
    pub fn set_input_f32(&self, register: u16, value: f32) {
        let bytes = value.to_be_bytes();
        let mut state = self.state.lock();
        state
            .input_registers
            .insert(register, u16::from_be_bytes([bytes[0], bytes[1]]));
        state
            .input_registers
            .insert(register.wrapping_add(1), u16::from_be_bytes([bytes[2], bytes[3]]));
    }

    pub fn set_holding_register(&self, register: u16, value: u16) {
        self.state.lock().holding_registers.insert(register, value);
    }

    pub fn holding_register(&self, register: u16) -> Option<u16> {
        self.state.lock().holding_registers.get(&register).copied()
    }

    pub fn set_discrete_input(&self, input: u16, value: bool) {
        self.state.lock().discrete_inputs.insert(input, value);
    }

    /// Queue a fault for the next unanswered request
    pub fn push_fault(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    /// Make every following open fail with `reason`
    pub fn fail_open(&self, reason: impl Into<String>) {
        self.state.lock().fail_open = Some(reason.into());
    }

    pub fn allow_open(&self) {
        self.state.lock().fail_open = None;
    }

    /// Put line noise in front of the next exchange
    pub fn inject_stale_bytes(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }

    /// Links currently open against this slave
    pub fn open_links(&self) -> usize {
        self.state.lock().open_links
    }

    /// Successful opens since creation
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    /// Stale bytes thrown away by the master before writing
    pub fn discarded_bytes(&self) -> usize {
        self.state.lock().discarded
    }

    /// Every frame the master wrote, in order
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state.lock().requests.clone()
    }

    fn reply(&self, state: &mut SlaveState, request: &[u8]) -> Option<Vec<u8>> {
        if request.len() < 8 || !validate_response(request) {
            warn!("SIM: dropping malformed request ({}B)", request.len());
            return None;
        }
        if request[0] != self.address {
            debug!("SIM: request for unit {} ignored", request[0]);
            return None;
        }

        let field1 = u16::from_be_bytes([request[2], request[3]]);
        let field2 = u16::from_be_bytes([request[4], request[5]]);

        let body = match FunctionCode::try_from(request[1]) {
            Ok(FunctionCode::ReadDiscreteInputs) => {
                let mut packed = vec![0u8; discrete_byte_count(field2)];
                for i in 0..field2 {
                    let on = state
                        .discrete_inputs
                        .get(&field1.wrapping_add(i))
                        .copied()
                        .unwrap_or(false);
                    if on {
                        packed[usize::from(i / 8)] |= 1 << (i % 8);
                    }
                }
                let mut body = vec![self.address, request[1], packed.len() as u8];
                body.extend_from_slice(&packed);
                body
            },
            Ok(
                function @ (FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters),
            ) => {
                let map = if function == FunctionCode::ReadHoldingRegisters {
                    &state.holding_registers
                } else {
                    &state.input_registers
                };
                let mut body = vec![self.address, request[1], field2.wrapping_mul(2) as u8];
                for i in 0..field2 {
                    let value = map.get(&field1.wrapping_add(i)).copied().unwrap_or(0);
                    body.extend_from_slice(&value.to_be_bytes());
                }
                body
            },
            Ok(FunctionCode::Diagnostics) => request[..6].to_vec(),
            Ok(FunctionCode::WriteMultipleRegisters) => {
                let byte_count = usize::from(*request.get(6)?);
                if request.len() != 9 + byte_count || byte_count != usize::from(field2) * 2 {
                    warn!("SIM: inconsistent FC16 request");
                    return None;
                }
                for i in 0..field2 {
                    let at = 7 + usize::from(i) * 2;
                    let value = u16::from_be_bytes([request[at], request[at + 1]]);
                    state.holding_registers.insert(field1.wrapping_add(i), value);
                }
                request[..6].to_vec()
            },
            Err(code) => vec![self.address, code | EXCEPTION_FLAG, 0x01],
        };

        let mut response = with_crc(&body);
        match state.faults.pop_front() {
            None => {},
            Some(Fault::Silent) => return None,
            Some(Fault::CorruptCrc) => {
                if let Some(last) = response.last_mut() {
                    *last ^= 0x01;
                }
            },
            Some(Fault::Truncate(n)) => response.truncate(n),
            Some(Fault::IoError(reason)) => {
                state.read_error = Some(reason);
                return None;
            },
            // Consumed before the request reaches the slave
            Some(Fault::WriteError(_)) => {},
            Some(Fault::ByteCount(count)) => {
                let mut altered = body;
                if altered.len() > 2 {
                    altered[2] = count;
                }
                response = with_crc(&altered);
            },
        }
        Some(response)
    }
}

impl LinkFactory for RtuSlaveSimulator {
    fn open(&self, settings: &SerialSettings) -> io::Result<Box<dyn SerialLink>> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.fail_open {
            return Err(io::Error::other(reason.clone()));
        }
        state.open_links += 1;
        state.opens += 1;
        debug!("SIM: {} opened (unit {})", settings.port, self.address);
        Ok(Box::new(SimulatedLink {
            slave: self.clone(),
        }))
    }
}

struct SimulatedLink {
    slave: RtuSlaveSimulator,
}

#[async_trait]
impl SerialLink for SimulatedLink {
    fn discard_buffers(&mut self) -> io::Result<()> {
        let mut state = self.slave.state.lock();
        state.discarded += state.rx.len();
        state.rx.clear();
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.slave.state.lock();
        if let Some(Fault::WriteError(reason)) = state.faults.front() {
            let err = io::Error::other(reason.clone());
            state.faults.pop_front();
            return Err(err);
        }
        state.requests.push(data.to_vec());
        if let Some(response) = self.slave.reply(&mut state, data) {
            state.rx.extend(response);
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> io::Result<u8> {
        let next = {
            let mut state = self.slave.state.lock();
            if let Some(reason) = state.read_error.take() {
                return Err(io::Error::other(reason));
            }
            state.rx.pop_front()
        };
        match next {
            Some(byte) => Ok(byte),
            // Silent line; the transport's deadline ends the wait
            None => std::future::pending().await,
        }
    }
}

impl Drop for SimulatedLink {
    fn drop(&mut self) {
        let mut state = self.slave.state.lock();
        state.open_links = state.open_links.saturating_sub(1);
        state.rx.clear();
        state.read_error = None;
    }
}
