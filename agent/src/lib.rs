// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The node agent's view of the instance it runs on.
//!
//! [`Agent`] loads settings once from the metadata service, then answers
//! questions about them: which device node backs a given disk, which
//! resolvers to use, which address to advertise. Acting on the answers
//! (formatting, mounting, configuring interfaces) happens elsewhere.

use agent_hardware::fs;
use agent_hardware::{
    DevicePathResolver, IdentityDevicePathResolver, MappedDevicePathResolver,
    ResolveError,
};
use agent_metadata::{MetadataService, SettingsFetcher};
use agent_settings::{DiskSettings, Settings, DEFAULT_FOR_DNS};
use camino::Utf8PathBuf;
use display_error_chain::DisplayErrorChain;
use slog::{info, o, warn, Logger};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod logging;

use config::{DeviceNaming, DiskConfig};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Fetching settings")]
    Metadata(#[from] agent_metadata::Error),

    #[error("No persistent disk with ID {0:?}")]
    UnknownDisk(String),

    #[error("No ephemeral disk is attached")]
    NoEphemeralDisk,

    #[error("Resolving device path for disk {disk_id:?}")]
    Resolve {
        disk_id: String,
        #[source]
        err: ResolveError,
    },
}

/// A disk together with the device node the kernel exposes for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedDisk {
    pub settings: DiskSettings,
    pub device_path: Utf8PathBuf,
}

/// Build the resolver appropriate for how this platform names disks.
pub fn device_path_resolver(
    log: &Logger,
    config: &DiskConfig,
    fs: Arc<dyn fs::Api>,
    cancel: CancellationToken,
) -> Box<dyn DevicePathResolver> {
    match config.device_naming {
        DeviceNaming::Mapped => Box::new(
            MappedDevicePathResolver::new(log, fs, config.wait_timeout())
                .with_cancellation(cancel),
        ),
        DeviceNaming::Identity => Box::new(
            IdentityDevicePathResolver::new(log, fs, config.wait_timeout())
                .with_cancellation(cancel),
        ),
    }
}

pub struct Agent {
    log: Logger,
    settings: Settings,
    resolver: Box<dyn DevicePathResolver>,
}

impl Agent {
    pub fn new(
        log: &Logger,
        settings: Settings,
        resolver: Box<dyn DevicePathResolver>,
    ) -> Self {
        Self { log: log.new(o!("component" => "Agent")), settings, resolver }
    }

    /// Fetch settings from `service` and prepare to resolve disks.
    ///
    /// `cancel` aborts any disk resolution still waiting on the hypervisor,
    /// for use during shutdown.
    pub async fn load(
        log: &Logger,
        config: &DiskConfig,
        fs: Arc<dyn fs::Api>,
        service: Arc<dyn MetadataService>,
        cancel: CancellationToken,
    ) -> Result<Self, AgentError> {
        let settings = SettingsFetcher::new(log, service)
            .fetch_settings()
            .await
            .inspect_err(|err| {
                warn!(
                    log,
                    "failed to load settings";
                    "error" => %DisplayErrorChain::new(err),
                );
            })?;
        let resolver = device_path_resolver(log, config, fs, cancel);
        Ok(Self::new(log, settings, resolver))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn resolve(
        &self,
        disk: DiskSettings,
    ) -> Result<ResolvedDisk, AgentError> {
        match self.resolver.get_real_device_path(&disk).await {
            Ok(device_path) => {
                info!(
                    self.log,
                    "resolved disk";
                    "disk_id" => &disk.id,
                    "volume_id" => &disk.volume_id,
                    "device_path" => %device_path,
                );
                Ok(ResolvedDisk { settings: disk, device_path })
            }
            Err(err) => {
                warn!(
                    self.log,
                    "failed to resolve disk";
                    "disk_id" => &disk.id,
                    "error" => %DisplayErrorChain::new(&err),
                );
                Err(AgentError::Resolve { disk_id: disk.id, err })
            }
        }
    }

    pub async fn resolve_persistent_disk(
        &self,
        disk_id: &str,
    ) -> Result<ResolvedDisk, AgentError> {
        let disk = self
            .settings
            .persistent_disk_settings(disk_id)
            .ok_or_else(|| AgentError::UnknownDisk(disk_id.to_string()))?;
        self.resolve(disk).await
    }

    /// Resolve every persistent disk, concurrently.
    pub async fn resolve_persistent_disks(
        &self,
    ) -> Result<Vec<ResolvedDisk>, AgentError> {
        let disks = self.settings.persistent_disk_settings_all();
        futures::future::try_join_all(
            disks.into_iter().map(|disk| self.resolve(disk)),
        )
        .await
    }

    pub async fn resolve_ephemeral_disk(
        &self,
    ) -> Result<ResolvedDisk, AgentError> {
        let disk = self.settings.ephemeral_disk_settings();
        if disk.path.is_empty() {
            return Err(AgentError::NoEphemeralDisk);
        }
        self.resolve(disk).await
    }

    /// Resolvers from the network that supplies DNS, if there is one.
    pub fn dns_servers(&self) -> &[String] {
        self.settings
            .networks
            .default_network_for(DEFAULT_FOR_DNS)
            .map(|network| network.dns.as_slice())
            .unwrap_or(&[])
    }

    pub fn default_ip(&self) -> Option<&str> {
        self.settings.networks.default_ip()
    }
}
