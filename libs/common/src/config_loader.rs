//! Layered configuration loading
//!
//! Priority (highest to lowest):
//! 1. Environment variables (`<PREFIX>_SECTION__KEY`)
//! 2. YAML file
//! 3. Serde defaults of the target type

use std::path::Path;

use errors::{GasmonError, GasmonResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

/// Separator between nested keys in environment variable names
pub const ENV_NESTING_SEPARATOR: &str = "__";

/// Build the provider stack without extracting it
pub fn layered_figment<T>(defaults: &T, file: Option<&Path>, env_prefix: &str) -> Figment
where
    T: Serialize,
{
    let mut figment = Figment::from(Serialized::defaults(defaults));

    match file {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            figment = figment.merge(Yaml::file(path));
        },
        Some(path) => warn!("Config file {} not found, using defaults", path.display()),
        None => {},
    }

    figment.merge(Env::prefixed(env_prefix).split(ENV_NESTING_SEPARATOR))
}

/// Load `T` from defaults, an optional YAML file and prefixed env vars
pub fn load_layered<T>(file: Option<&Path>, env_prefix: &str) -> GasmonResult<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    layered_figment(&T::default(), file, env_prefix)
        .extract()
        .map_err(|e| GasmonError::Configuration(format!("Failed to load configuration: {}", e)))
}

/// Write `value` as YAML, creating parent directories
pub fn save_yaml<T, P>(value: &T, path: P) -> GasmonResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = serde_yaml::to_string(value)?;
    std::fs::write(path, content)?;
    info!("Configuration saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use figment::Jail;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Inner {
        port: String,
        baud_rate: u32,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        name: String,
        serial: Inner,
    }

    #[test]
    fn test_defaults_then_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file("sample.yaml", "name: from-file\nserial:\n  port: /dev/ttyS1\n")?;
            jail.set_env("SAMPLE_SERIAL__BAUD_RATE", "9600");

            let loaded: Sample =
                load_layered(Some(Path::new("sample.yaml")), "SAMPLE_").unwrap();
            assert_eq!(loaded.name, "from-file");
            assert_eq!(loaded.serial.port, "/dev/ttyS1");
            assert_eq!(loaded.serial.baud_rate, 9600);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let loaded: Sample = load_layered(Some(Path::new("absent.yaml")), "SAMPLE_").unwrap();
            assert_eq!(loaded, Sample::default());
            Ok(())
        });
    }

    #[test]
    fn test_save_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.yaml");
        let sample = Sample {
            name: "saved".into(),
            serial: Inner {
                port: "/dev/ttyUSB0".into(),
                baud_rate: 19200,
            },
        };
        save_yaml(&sample, &path).unwrap();

        let loaded: Sample = load_layered(Some(&path), "SAMPLE_NOT_SET_").unwrap();
        assert_eq!(loaded, sample);
    }
}
