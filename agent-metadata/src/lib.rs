// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Access to the documents the platform provides about this instance.
//!
//! A [`MetadataService`] only knows how to hand back raw documents; the
//! [`SettingsFetcher`] turns them into typed values.

use agent_settings::Settings;
use async_trait::async_trait;
use serde::Deserialize;
use slog::{debug, info, o, Logger};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

pub mod fakes;
mod file;

pub use file::{FileMetadataConfig, FileMetadataService};

/// The documents a metadata service serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Document {
    Settings,
    Metadata,
    UserData,
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Document::Settings => "settings",
            Document::Metadata => "metadata",
            Document::UserData => "user data",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Metadata service is not available")]
    Unavailable,

    #[error("Reading {document}")]
    Fetch {
        document: Document,
        #[source]
        err: io::Error,
    },

    #[error("Unmarshalling {document}")]
    Parse {
        document: Document,
        #[source]
        err: serde_json::Error,
    },

    #[error("Loading settings from metadata service")]
    Settings(#[from] agent_settings::ParseError),
}

impl Error {
    /// Returns true if the same request may succeed later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Unavailable)
    }
}

/// A source of instance documents.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Returns true once the service is ready to serve documents.
    async fn is_available(&self) -> bool;

    async fn fetch_settings(&self) -> io::Result<Vec<u8>>;

    async fn fetch_metadata(&self) -> io::Result<Vec<u8>>;

    async fn fetch_user_data(&self) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetadataContents {
    #[serde(rename = "instance-id")]
    instance_id: String,
    #[serde(rename = "public-keys")]
    public_keys: BTreeMap<String, PublicKey>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PublicKey {
    #[serde(rename = "openssh-key")]
    openssh_key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserDataContents {
    registry: Registry,
    server: Server,
    dns: Dns,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Registry {
    endpoint: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Server {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Dns {
    nameserver: Vec<String>,
}

/// Reads and parses documents from a [`MetadataService`].
pub struct SettingsFetcher {
    log: Logger,
    service: Arc<dyn MetadataService>,
}

impl SettingsFetcher {
    pub fn new(log: &Logger, service: Arc<dyn MetadataService>) -> Self {
        Self { log: log.new(o!("component" => "SettingsFetcher")), service }
    }

    async fn fetch(&self, document: Document) -> Result<Vec<u8>, Error> {
        if !self.service.is_available().await {
            return Err(Error::Unavailable);
        }
        let result = match document {
            Document::Settings => self.service.fetch_settings().await,
            Document::Metadata => self.service.fetch_metadata().await,
            Document::UserData => self.service.fetch_user_data().await,
        };
        let contents =
            result.map_err(|err| Error::Fetch { document, err })?;
        debug!(
            self.log,
            "fetched document";
            "document" => %document,
            "bytes" => contents.len(),
        );
        Ok(contents)
    }

    async fn fetch_parsed<T>(&self, document: Document) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de>,
    {
        let contents = self.fetch(document).await?;
        serde_json::from_slice(&contents)
            .map_err(|err| Error::Parse { document, err })
    }

    /// Fetch and normalize this agent's settings.
    pub async fn fetch_settings(&self) -> Result<Settings, Error> {
        let contents = self.fetch(Document::Settings).await?;
        let settings = Settings::from_slice(&contents)?;
        info!(
            self.log,
            "loaded settings";
            "agent_id" => &settings.agent_id,
            "persistent_disks" => settings.disks.persistent.len(),
            "networks" => settings.networks.len(),
        );
        Ok(settings)
    }

    pub async fn instance_id(&self) -> Result<String, Error> {
        let metadata: MetadataContents =
            self.fetch_parsed(Document::Metadata).await?;
        Ok(metadata.instance_id)
    }

    /// Returns the first public key, or an empty string if there is none.
    pub async fn public_key(&self) -> Result<String, Error> {
        let metadata: MetadataContents =
            self.fetch_parsed(Document::Metadata).await?;
        Ok(metadata
            .public_keys
            .get("0")
            .map(|key| key.openssh_key.clone())
            .unwrap_or_default())
    }

    pub async fn registry_endpoint(&self) -> Result<String, Error> {
        let user_data: UserDataContents =
            self.fetch_parsed(Document::UserData).await?;
        Ok(user_data.registry.endpoint)
    }

    pub async fn server_name(&self) -> Result<String, Error> {
        let user_data: UserDataContents =
            self.fetch_parsed(Document::UserData).await?;
        Ok(user_data.server.name)
    }

    /// Resolvers the platform asks us to use before settings are loaded.
    pub async fn dns_nameservers(&self) -> Result<Vec<String>, Error> {
        let user_data: UserDataContents =
            self.fetch_parsed(Document::UserData).await?;
        Ok(user_data.dns.nameserver)
    }
}
