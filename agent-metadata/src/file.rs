// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A metadata service backed by files, for platforms that drop instance
//! documents onto a config drive or into a well-known directory.

use crate::MetadataService;
use agent_hardware::fs;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use slog::{debug, o, Logger};
use std::io;
use std::sync::Arc;

/// Where a [`FileMetadataService`] finds each document.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FileMetadataConfig {
    pub settings_path: Utf8PathBuf,
    pub metadata_path: Utf8PathBuf,
    pub user_data_path: Utf8PathBuf,
}

pub struct FileMetadataService {
    log: Logger,
    fs: Arc<dyn fs::Api>,
    config: FileMetadataConfig,
}

impl FileMetadataService {
    pub fn new(
        log: &Logger,
        fs: Arc<dyn fs::Api>,
        config: FileMetadataConfig,
    ) -> Self {
        Self { log: log.new(o!("component" => "FileMetadataService")), fs, config }
    }

    async fn read(&self, path: &Utf8Path) -> io::Result<Vec<u8>> {
        let contents = self.fs.read_to_string(path).await?;
        debug!(self.log, "read document"; "path" => %path);
        Ok(contents.into_bytes())
    }
}

#[async_trait]
impl MetadataService for FileMetadataService {
    /// The service is available once the settings file has been written.
    async fn is_available(&self) -> bool {
        self.fs.exists(&self.config.settings_path).await
    }

    async fn fetch_settings(&self) -> io::Result<Vec<u8>> {
        self.read(&self.config.settings_path).await
    }

    async fn fetch_metadata(&self) -> io::Result<Vec<u8>> {
        self.read(&self.config.metadata_path).await
    }

    async fn fetch_user_data(&self) -> io::Result<Vec<u8>> {
        self.read(&self.config.user_data_path).await
    }
}
