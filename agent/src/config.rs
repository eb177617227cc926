// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for working with agent configuration

use crate::logging::ConfigLogging;
use agent_metadata::FileMetadataConfig;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::time::Duration;

/// How long to wait for an attached disk to appear, if not configured.
pub const DEFAULT_DISK_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the agent
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Configuration for the agent's log
    pub log: ConfigLogging,
    #[serde(default)]
    pub disks: DiskConfig,
    /// Where the platform places instance documents.
    pub metadata: FileMetadataConfig,
}

/// How the platform exposes attached disks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceNaming {
    /// The hypervisor may rename `/dev/sdX` to `/dev/xvdX` or `/dev/vdX`.
    #[default]
    Mapped,
    /// Disks appear exactly at the path the platform reports.
    Identity,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    pub wait_timeout_secs: u64,
    pub device_naming: DeviceNaming,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: DEFAULT_DISK_WAIT_TIMEOUT.as_secs(),
            device_naming: DeviceNaming::default(),
        }
    }
}

impl DiskConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to parse config from {path}: {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}

impl Config {
    pub fn from_file<P: AsRef<Utf8Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io { path: path.into(), err })?;
        let config = toml::from_str(&contents)
            .map_err(|err| ConfigError::Parse { path: path.into(), err })?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::logging::ConfigLoggingLevel;
    use camino_tempfile::Utf8TempDir;

    const CONFIG_VALID_METADATA: &str = r#"
        [metadata]
        settings_path = "/var/vcap/bosh/settings.json"
        metadata_path = "/var/vcap/bosh/meta-data.json"
        user_data_path = "/var/vcap/bosh/user-data.json"
    "#;

    const CONFIG_VALID_LOG: &str = r#"
        [log]
        mode = "stderr-terminal"
        level = "info"
    "#;

    fn read_config(contents: &str) -> Result<Config, ConfigError> {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        Config::from_file(&path)
    }

    #[test]
    fn test_config_nonexistent() {
        let err = Config::from_file("/nonexistent/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/config.toml"));
    }

    #[test]
    fn test_config_empty() {
        let err = read_config("").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("missing field"), "{err}");
    }

    #[test]
    fn test_config_defaults() {
        let config =
            read_config(&format!("{CONFIG_VALID_LOG}{CONFIG_VALID_METADATA}"))
                .unwrap();
        assert_eq!(
            config.log,
            ConfigLogging::StderrTerminal { level: ConfigLoggingLevel::Info }
        );
        assert_eq!(config.disks, DiskConfig::default());
        assert_eq!(config.disks.wait_timeout(), DEFAULT_DISK_WAIT_TIMEOUT);
        assert_eq!(
            config.metadata.settings_path,
            "/var/vcap/bosh/settings.json"
        );
    }

    #[test]
    fn test_config_disks() {
        let config = read_config(&format!(
            "{CONFIG_VALID_LOG}{CONFIG_VALID_METADATA}{}",
            r#"
            [disks]
            wait_timeout_secs = 5
            device_naming = "identity"
            "#
        ))
        .unwrap();
        assert_eq!(config.disks.wait_timeout(), Duration::from_secs(5));
        assert_eq!(config.disks.device_naming, DeviceNaming::Identity);
    }

    #[test]
    fn test_config_bad_device_naming() {
        let err = read_config(&format!(
            "{CONFIG_VALID_LOG}{CONFIG_VALID_METADATA}{}",
            r#"
            [disks]
            device_naming = "guess"
            "#
        ))
        .unwrap_err();
        assert!(err.to_string().contains("unknown variant `guess`"), "{err}");
    }
}
