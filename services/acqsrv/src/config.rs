//! Service configuration
//!
//! Built once at startup from serde defaults, an optional YAML file and
//! `ACQSRV_` environment variables, then handed to each component by value.

use std::path::{Path, PathBuf};

use gasmon_buffer::BufferConfig;
use gasmon_model::Validator;
use gasmon_rtu::constants::{MAX_SLAVE_ADDRESS, MIN_SLAVE_ADDRESS};
use gasmon_rtu::{Parity, SerialSettings};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AcqSrvError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/acqsrv.yaml";
pub const ENV_PREFIX: &str = "ACQSRV_";

/// Highest accepted trimming rate, in percent
pub const MAX_TRIM_RATE: u32 = 9999;

/// Registers per float channel
pub const FLOAT_REGISTERS: u16 = 2;

/// Characters rejected in data and outlier file names
const INVALID_FILE_CHARS: &[char] = &['\0', '<', '>', ':', '"', '|', '?', '*'];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcqConfig {
    pub serial: SerialConfig,
    pub modbus: ModbusConfig,
    pub trimming: TrimmingConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    #[serde(deserialize_with = "parity_any_case")]
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: 1,
        }
    }
}

fn parity_any_case<'de, D>(deserializer: D) -> std::result::Result<Parity, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    pub slave: u8,
    pub interval_secs: u64,
    /// CO2 lives at `base_register..+1`, O2 at `base_register + 2..+3`
    pub base_register: u16,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            slave: 1,
            interval_secs: 5,
            base_register: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimmingConfig {
    /// Percent; the delta threshold is `rate / 100`
    pub rate: u32,
}

impl Default for TrimmingConfig {
    fn default() -> Self {
        Self { rate: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub table: String,
    pub batch_size: usize,
    pub data_file: PathBuf,
    pub trim_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/measurements.db"),
            table: "measurements".to_string(),
            batch_size: 5,
            data_file: PathBuf::from("measurements.txt"),
            trim_file: PathBuf::from("trimvalues.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AcqConfig {
    /// Load and validate. A missing file falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = common::load_layered(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, reporting all violations at once
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.serial.port.trim().is_empty() {
            problems.push("serial.port must not be empty".to_string());
        }
        if self.serial.baud_rate == 0 {
            problems.push("serial.baud_rate must be greater than 0".to_string());
        }
        if self.serial.data_bits != 8 {
            problems.push(format!(
                "serial.data_bits must be 8, got {}",
                self.serial.data_bits
            ));
        }
        if self.serial.stop_bits != 1 {
            problems.push(format!(
                "serial.stop_bits must be 1, got {}",
                self.serial.stop_bits
            ));
        }

        if !(MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(&self.modbus.slave) {
            problems.push(format!(
                "modbus.slave {} outside {}..={}",
                self.modbus.slave, MIN_SLAVE_ADDRESS, MAX_SLAVE_ADDRESS
            ));
        }
        if self.modbus.interval_secs == 0 {
            problems.push("modbus.interval_secs must be greater than 0".to_string());
        }
        if self.modbus.base_register > u16::MAX - 3 {
            problems.push(format!(
                "modbus.base_register {} leaves no room for four registers",
                self.modbus.base_register
            ));
        }

        if self.trimming.rate > MAX_TRIM_RATE {
            problems.push(format!(
                "trimming.rate {} outside 0..={}",
                self.trimming.rate, MAX_TRIM_RATE
            ));
        }

        if self.storage.batch_size == 0 {
            problems.push("storage.batch_size must be greater than 0".to_string());
        }
        if !is_sql_identifier(&self.storage.table) {
            problems.push(format!(
                "storage.table '{}' is not a plain identifier",
                self.storage.table
            ));
        }
        for (field, path) in [
            ("storage.database", &self.storage.database),
            ("storage.data_file", &self.storage.data_file),
            ("storage.trim_file", &self.storage.trim_file),
        ] {
            if let Some(reason) = file_name_problem(path) {
                problems.push(format!("{} {}", field, reason));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AcqSrvError::Config(problems.join("; ")))
        }
    }

    /// Write the effective configuration back as YAML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        common::save_yaml(self, path)?;
        Ok(())
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(
            self.serial.port.clone(),
            self.serial.baud_rate,
            self.serial.parity,
        )
    }

    pub fn validator(&self) -> Validator {
        Validator::from_trim_rate(self.trimming.rate)
    }

    pub fn threshold(&self) -> f64 {
        self.validator().threshold()
    }

    /// Buffer length that triggers a flush once exceeded
    pub fn capacity(&self) -> usize {
        self.buffer_config().capacity()
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig::new(self.storage.batch_size, self.threshold())
    }

    pub fn co2_register(&self) -> u16 {
        self.modbus.base_register
    }

    pub fn o2_register(&self) -> u16 {
        self.modbus.base_register.saturating_add(FLOAT_REGISTERS)
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        },
        _ => false,
    }
}

fn file_name_problem(path: &Path) -> Option<String> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Some("must not be empty".to_string());
    }
    text.chars()
        .find(|c| INVALID_FILE_CHARS.contains(c))
        .map(|c| format!("contains invalid character {:?}", c))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = AcqConfig::default();
        config.validate().unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 19200);
        assert_eq!(config.modbus.slave, 1);
        assert_eq!(config.capacity(), 13);
        assert!((config.threshold() - 0.3).abs() < 1e-12);
        assert_eq!(config.co2_register(), 0);
        assert_eq!(config.o2_register(), 2);

        let settings = config.serial_settings();
        assert_eq!(settings.data_bits, 8);
        assert_eq!(settings.stop_bits, 1);
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = AcqConfig::default();
        config.modbus.slave = 0;
        config.modbus.interval_secs = 0;
        config.trimming.rate = 10_000;
        config.storage.batch_size = 0;
        config.storage.table = "drop table;".into();
        config.storage.data_file = PathBuf::from("bad|name.txt");

        let message = config.validate().unwrap_err().to_string();
        for needle in [
            "modbus.slave",
            "modbus.interval_secs",
            "trimming.rate",
            "storage.batch_size",
            "storage.table",
            "storage.data_file",
        ] {
            assert!(message.contains(needle), "missing {} in {}", needle, message);
        }
    }

    #[test]
    fn test_slave_bounds() {
        let mut config = AcqConfig::default();
        config.modbus.slave = 247;
        assert!(config.validate().is_ok());
        config.modbus.slave = 248;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_yaml_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "acqsrv.yaml",
                "serial:\n  port: /dev/ttyS3\n  parity: Even\nstorage:\n  batch_size: 10\n",
            )?;
            jail.set_env("ACQSRV_TRIMMING__RATE", "50");

            let config = AcqConfig::load(Some(Path::new("acqsrv.yaml"))).unwrap();
            assert_eq!(config.serial.port, "/dev/ttyS3");
            assert_eq!(config.serial.parity, Parity::Even);
            assert_eq!(config.storage.batch_size, 10);
            assert_eq!(config.capacity(), 18);
            assert!((config.threshold() - 0.5).abs() < 1e-12);
            assert_eq!(config.modbus.interval_secs, 5);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid() {
        Jail::expect_with(|jail| {
            jail.create_file("acqsrv.yaml", "modbus:\n  slave: 0\n")?;
            let err = AcqConfig::load(Some(Path::new("acqsrv.yaml"))).unwrap_err();
            assert!(matches!(err, AcqSrvError::Config(_)));
            Ok(())
        });
    }

    #[test]
    fn test_save_then_load() {
        Jail::expect_with(|_jail| {
            let mut config = AcqConfig::default();
            config.serial.parity = Parity::Odd;
            config.trimming.rate = 0;
            config.save("saved/acqsrv.yaml").unwrap();

            let loaded = AcqConfig::load(Some(Path::new("saved/acqsrv.yaml"))).unwrap();
            assert_eq!(loaded, config);
            assert!(!loaded.validator().is_enabled());
            Ok(())
        });
    }
}
