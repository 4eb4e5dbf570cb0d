//! One poll of the analyzer: two float reads, port closed afterwards

use std::sync::Arc;

use gasmon_model::{decode_register_f32, Measurement};
use gasmon_rtu::{LinkFactory, ModbusMaster, SerialSettings, Session};
use tracing::{debug, warn};

use crate::config::{AcqConfig, FLOAT_REGISTERS};
use crate::error::{AcqSrvError, Result};

/// Bytes in one IEEE-754 float spread over two registers
const FLOAT_BYTES: usize = 4;

/// Polls the CO2 and O2 channels of one slave
pub struct MeasurementAcquirer {
    master: ModbusMaster,
    settings: SerialSettings,
    slave: u8,
    co2_register: u16,
    o2_register: u16,
}

impl MeasurementAcquirer {
    pub fn new(
        master: ModbusMaster,
        settings: SerialSettings,
        slave: u8,
        co2_register: u16,
        o2_register: u16,
    ) -> Self {
        Self {
            master,
            settings,
            slave,
            co2_register,
            o2_register,
        }
    }

    pub fn from_config(config: &AcqConfig, factory: Arc<dyn LinkFactory>) -> Self {
        Self::new(
            ModbusMaster::with_factory(factory),
            config.serial_settings(),
            config.modbus.slave,
            config.co2_register(),
            config.o2_register(),
        )
    }

    /// Status line of the master's last operation
    pub fn status(&self) -> &str {
        self.master.status()
    }

    pub fn is_open(&self) -> bool {
        self.master.is_open()
    }

    /// Read both channels.
    ///
    /// Never fails: any error yields the zero/zero sentinel. The port is closed
    /// on every path, including cancellation of this future.
    pub async fn poll(&mut self) -> Measurement {
        match self.read_channels().await {
            Ok(measurement) => {
                debug!(
                    "Poll: CO2={:.3} O2={:.3}",
                    measurement.co2, measurement.o2
                );
                measurement
            },
            Err(e) => {
                errors::log_error("Poll failed", &e);
                Measurement::sentinel()
            },
        }
    }

    async fn read_channels(&mut self) -> Result<Measurement> {
        let (slave, co2_register, o2_register) = (self.slave, self.co2_register, self.o2_register);
        let mut session = self.master.session(&self.settings)?;

        let co2 = read_float(&mut session, slave, co2_register).await?;
        let o2 = read_float(&mut session, slave, o2_register).await?;

        if let Err(e) = session.close() {
            warn!("Close after poll: {}", e);
        }
        Ok(Measurement::new(o2, co2))
    }
}

async fn read_float(session: &mut Session<'_>, slave: u8, register: u16) -> Result<f32> {
    let bytes = session
        .read_input_registers(slave, register, FLOAT_REGISTERS)
        .await?;
    decode_register_f32(&bytes).ok_or(AcqSrvError::ResponseLength {
        expected: FLOAT_BYTES,
        actual: bytes.len(),
    })
}

impl std::fmt::Debug for MeasurementAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementAcquirer")
            .field("port", &self.settings.port)
            .field("slave", &self.slave)
            .field("co2_register", &self.co2_register)
            .field("o2_register", &self.o2_register)
            .finish()
    }
}
