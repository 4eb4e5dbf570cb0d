//! Serial transport: open/close lifecycle and one request/response exchange
//!
//! `Closed -> Open -> Closed`. Exchanges are only permitted while open and take
//! `&mut self`, so a transport never has two transactions in flight.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::constants::{READ_TIMEOUT, WRITE_TIMEOUT};
use crate::error::{Result, RtuError};
use crate::frame::{to_hex, Frame};
use crate::link::{LinkFactory, SerialLink, SerialPortFactory, SerialSettings};

pub struct Transport {
    factory: Arc<dyn LinkFactory>,
    link: Option<Box<dyn SerialLink>>,
    /// Port of the last open attempt, for status messages
    port: Option<String>,
}

impl Transport {
    pub fn new(factory: Arc<dyn LinkFactory>) -> Self {
        Self {
            factory,
            link: None,
            port: None,
        }
    }

    /// Transport backed by real serial devices
    pub fn serial() -> Self {
        Self::new(Arc::new(SerialPortFactory))
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    fn port_label(&self) -> String {
        self.port
            .clone()
            .unwrap_or_else(|| "Serial port".to_string())
    }

    pub fn open(&mut self, settings: &SerialSettings) -> Result<()> {
        if self.link.is_some() {
            return Err(RtuError::AlreadyOpen {
                port: self.port_label(),
            });
        }

        self.port = Some(settings.port.clone());
        match self.factory.open(settings) {
            Ok(link) => {
                self.link = Some(link);
                info!("{} opened successfully", settings.port);
                Ok(())
            },
            Err(e) => Err(RtuError::Open {
                port: settings.port.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Release the device. Fails when nothing is open.
    pub fn close(&mut self) -> Result<()> {
        match self.link.take() {
            Some(link) => {
                drop(link);
                debug!("{} closed", self.port_label());
                Ok(())
            },
            None => Err(RtuError::NotOpen {
                port: self.port_label(),
            }),
        }
    }

    /// Send `request` and read exactly `expected_len` bytes back.
    ///
    /// Stale input is discarded before writing. Each byte gets its own
    /// [`READ_TIMEOUT`]; the first missed deadline fails the whole exchange.
    pub async fn transact(&mut self, request: &Frame, expected_len: usize) -> Result<Vec<u8>> {
        let link = self.link.as_mut().ok_or(RtuError::PortNotOpen)?;

        link.discard_buffers()?;

        match timeout(WRITE_TIMEOUT, link.write_all(request.as_bytes())).await {
            Ok(Ok(())) => debug!("RTU TX: {}", to_hex(request.as_bytes())),
            Ok(Err(e)) => {
                warn!("RTU TX: {}", e);
                return Err(RtuError::WriteIo(e.to_string()));
            },
            Err(_) => {
                warn!("RTU TX timeout");
                return Err(RtuError::WriteTimeout);
            },
        }

        let mut response = Vec::with_capacity(expected_len);
        while response.len() < expected_len {
            match timeout(READ_TIMEOUT, link.read_byte()).await {
                Ok(Ok(byte)) => response.push(byte),
                Ok(Err(e)) => {
                    warn!("RTU RX: {}", e);
                    return Err(RtuError::Io(e.to_string()));
                },
                Err(_) => {
                    debug!("RTU timeout: {}/{}B", response.len(), expected_len);
                    return Err(RtuError::Timeout {
                        received: response.len(),
                        expected: expected_len,
                    });
                },
            }
        }

        debug!("RTU RX: {}", to_hex(&response));
        Ok(response)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("port", &self.port)
            .field("open", &self.is_open())
            .finish()
    }
}
