//! Byte transport seam
//!
//! [`Transport`](crate::Transport) drives a [`SerialLink`] obtained from a
//! [`LinkFactory`]. The production factory opens a real serial device through
//! `tokio-serial`; tests plug in the [`RtuSlaveSimulator`](crate::RtuSlaveSimulator).

use std::fmt;
use std::io;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info};

use crate::constants::READ_TIMEOUT;

/// Serial line parity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Parity::None),
            "odd" => Ok(Parity::Odd),
            "even" => Ok(Parity::Even),
            other => Err(format!("unknown parity '{}'", other)),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Parity::None => "none",
            Parity::Odd => "odd",
            Parity::Even => "even",
        };
        f.write_str(name)
    }
}

/// Serial line parameters for one open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl SerialSettings {
    /// 8 data bits and one stop bit, whatever the parity
    pub fn new(port: impl Into<String>, baud_rate: u32, parity: Parity) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: 8,
            parity,
            stop_bits: 1,
        }
    }
}

/// An open byte pipe to the slave
#[async_trait]
pub trait SerialLink: Send {
    /// Drop any pending bytes in both directions
    fn discard_buffers(&mut self) -> io::Result<()>;

    /// Write the whole frame and flush it to the line
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Wait for the next byte. Deadlines are applied by the caller.
    async fn read_byte(&mut self) -> io::Result<u8>;
}

/// Opens links. Closing is dropping the returned link.
pub trait LinkFactory: Send + Sync {
    fn open(&self, settings: &SerialSettings) -> io::Result<Box<dyn SerialLink>>;
}

// ============================================================================
// tokio-serial backend
// ============================================================================

/// Opens real serial devices
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortFactory;

impl LinkFactory for SerialPortFactory {
    fn open(&self, settings: &SerialSettings) -> io::Result<Box<dyn SerialLink>> {
        debug!("RTU: {} @{}baud {}", settings.port, settings.baud_rate, settings.parity);

        let parity = match settings.parity {
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::None => tokio_serial::Parity::None,
        };

        let data_bits = match settings.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        let stop_bits = match settings.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        match tokio_serial::new(&settings.port, settings.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(READ_TIMEOUT)
            .open_native_async()
        {
            Ok(port) => {
                info!("RTU opened: {}", settings.port);
                Ok(Box::new(SerialPortLink { port }))
            },
            Err(e) => {
                error!("RTU err: {} - {}", settings.port, e);
                Err(io::Error::from(e))
            },
        }
    }
}

/// A `SerialStream` behind the [`SerialLink`] seam
pub struct SerialPortLink {
    port: SerialStream,
}

#[async_trait]
impl SerialLink for SerialPortLink {
    fn discard_buffers(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All).map_err(io::Error::from)
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(&mut self.port, data).await?;
        AsyncWriteExt::flush(&mut self.port).await
    }

    async fn read_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        AsyncReadExt::read_exact(&mut self.port, &mut byte).await?;
        Ok(byte[0])
    }
}
