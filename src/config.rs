//! Controller configuration, loaded from TOML.
//!
//! ```toml
//! [transport]
//! kind = "socket"
//! host = "bl01bruker"
//! port = 5000
//! timeout_ms = 1000
//!
//! [temperature]
//! device = "bl01/ct/linkam"
//!
//! [acquisition]
//! experiment = "TR_ATR.XPM"
//! experiment_path = "C:\\OPUS\\XPM"
//! read_peak = true
//!
//! [polling]
//! max_polls = 600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::parameters::{AcquisitionParameters, MAX_INTENSITY};
use crate::socket_terminal::DEFAULT_PORT;

const DEFAULT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_OPUS_DEVICE: &str = "bl01/ct/opus";
const DEFAULT_LINKAM_DEVICE: &str = "bl01/ct/linkam";
const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    pub transport: TransportConfig,
    #[serde(default)]
    pub temperature: Option<TemperatureConfig>,
    #[serde(default)]
    pub acquisition: AcquisitionParameters,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub stage: Option<StageConfig>,
}

/// How the controller talks to OPUS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Line protocol over TCP.
    Socket {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    /// Device server proxy.
    Proxy {
        #[serde(default = "default_opus_device")]
        device: String,
    },
}

/// Temperature controller read for the file name suffix.
///
/// [`OpusController::from_config`](crate::OpusController::from_config) hands
/// `device` to its temperature connector.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemperatureConfig {
    #[serde(default = "default_linkam_device")]
    pub device: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingConfig {
    /// Give up on a macro after this many status polls. Unbounded when unset.
    pub max_polls: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    #[serde(default = "default_opus_device")]
    pub device: String,
    /// How long a position read waits for the device server to be idle.
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
}

impl StageConfig {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            device: default_opus_device(),
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_opus_device() -> String {
    DEFAULT_OPUS_DEVICE.to_string()
}

fn default_linkam_device() -> String {
    DEFAULT_LINKAM_DEVICE.to_string()
}

fn default_settle_timeout_ms() -> u64 {
    DEFAULT_SETTLE_TIMEOUT_MS
}

impl ControllerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loading controller configuration from {}", path.display());
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the type system does not rule out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.transport {
            TransportConfig::Socket {
                host,
                port,
                timeout_ms,
            } => {
                if host.trim().is_empty() {
                    return Err(ConfigError::invalid("transport.host", "must not be empty"));
                }
                if *port == 0 {
                    return Err(ConfigError::invalid("transport.port", "must not be 0"));
                }
                if *timeout_ms == 0 {
                    return Err(ConfigError::invalid("transport.timeout_ms", "must not be 0"));
                }
            }
            TransportConfig::Proxy { device } => {
                if device.trim().is_empty() {
                    return Err(ConfigError::invalid("transport.device", "must not be empty"));
                }
            }
        }

        if let Some(temperature) = &self.temperature {
            if temperature.device.trim().is_empty() {
                return Err(ConfigError::invalid("temperature.device", "must not be empty"));
            }
        }

        if self.acquisition.intensity > MAX_INTENSITY {
            return Err(ConfigError::invalid(
                "acquisition.intensity",
                format!("{} is above {MAX_INTENSITY}", self.acquisition.intensity),
            ));
        }

        if self.polling.max_polls == Some(0) {
            return Err(ConfigError::invalid("polling.max_polls", "must not be 0"));
        }

        if let Some(stage) = &self.stage {
            if stage.device.trim().is_empty() {
                return Err(ConfigError::invalid("stage.device", "must not be empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::AcquisitionMode;
    use std::io::Write;

    #[test]
    fn test_socket_defaults() {
        let config = ControllerConfig::from_toml(
            r#"
            [transport]
            kind = "socket"
            host = "bl01bruker"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.transport,
            TransportConfig::Socket {
                host: "bl01bruker".to_string(),
                port: 5000,
                timeout_ms: 1000,
            }
        );
        assert_eq!(config.acquisition, AcquisitionParameters::default());
        assert_eq!(config.polling.max_polls, None);
        assert!(config.temperature.is_none());
    }

    #[test]
    fn test_proxy_with_acquisition_defaults() {
        let config = ControllerConfig::from_toml(
            r#"
            [transport]
            kind = "proxy"

            [temperature]

            [acquisition]
            experiment = "TR_ATR.XPM"
            file_name = "sample"
            temperature_suffix = true
            mode = "visible"
            intensity = 40

            [polling]
            max_polls = 600

            [stage]
            settle_timeout_ms = 2000
            "#,
        )
        .unwrap();
        assert_eq!(
            config.transport,
            TransportConfig::Proxy {
                device: "bl01/ct/opus".to_string()
            }
        );
        assert_eq!(config.temperature.unwrap().device, "bl01/ct/linkam");
        assert_eq!(config.acquisition.mode, AcquisitionMode::Visible);
        assert_eq!(config.acquisition.intensity, 40);
        assert!(config.acquisition.temperature_suffix);
        assert_eq!(config.polling.max_polls, Some(600));
        assert_eq!(config.stage.unwrap().settle_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_values_are_rejected_at_load() {
        let cases = [
            ("[transport]\nkind = \"socket\"\nhost = \"\"", "transport.host"),
            ("[transport]\nkind = \"socket\"\nhost = \"h\"\nport = 0", "transport.port"),
            ("[transport]\nkind = \"socket\"\nhost = \"h\"\ntimeout_ms = 0", "transport.timeout_ms"),
            ("[transport]\nkind = \"proxy\"\ndevice = \" \"", "transport.device"),
            ("[transport]\nkind = \"proxy\"\n[acquisition]\nintensity = 150", "acquisition.intensity"),
            ("[transport]\nkind = \"proxy\"\n[polling]\nmax_polls = 0", "polling.max_polls"),
        ];
        for (text, expected) in cases {
            let err = ControllerConfig::from_toml(text).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { field, .. } if field == expected),
                "{expected}: unexpected {err:?}"
            );
        }
    }

    #[test]
    fn test_unknown_keys_are_parse_errors() {
        assert!(matches!(
            ControllerConfig::from_toml("[transport]\nkind = \"serial\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ControllerConfig::from_toml("[transport]\nkind = \"proxy\"\n[acquisition]\nopus_nam = \"x\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ControllerConfig::from_toml("[acquisition]\nexperiment = \"x\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transport]\nkind = \"socket\"\nhost = \"localhost\"\nport = 5001").unwrap();
        let config = ControllerConfig::from_file(file.path()).unwrap();
        assert!(matches!(config.transport, TransportConfig::Socket { port: 5001, .. }));

        assert!(matches!(
            ControllerConfig::from_file("/nonexistent/opus.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
