// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed agent settings.
//!
//! The platform hands the agent a loosely-typed JSON document. This crate
//! turns that document into [`Settings`], canonicalizes the disk
//! descriptors inside it, and answers "which network is the default for X"
//! questions. Everything here is pure: no I/O, no logging.
//!
//! On the wire, every key is lower-case and underscore-separated, at every
//! depth, and every field is emitted even when empty. Provider tooling that
//! builds these documents relies on both properties.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod blobstore;
mod disk;
mod network;

pub use blobstore::{Blobstore, OptionValue};
pub use disk::{DiskDescriptor, DiskSettings, Disks};
pub use network::{Network, Networks, DEFAULT_FOR_DNS, DEFAULT_FOR_GATEWAY};

/// A settings document did not have the expected shape.
#[derive(thiserror::Error, Debug)]
#[error("Failed to parse settings at `{path}`: {err}")]
pub struct ParseError {
    path: String,
    #[source]
    err: serde_json::Error,
}

impl ParseError {
    /// The dotted path to the offending field, or `.` for the document
    /// itself.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for ParseError {
    fn from(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = err.path().to_string();
        ParseError { path, err: err.into_inner() }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError { path: ".".to_string(), err }
    }
}

#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema,
)]
#[serde(default)]
pub struct Vm {
    pub name: String,
}

/// Settings for this agent, fetched once from the platform at startup.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema,
)]
#[serde(default)]
pub struct Settings {
    pub agent_id: String,
    pub blobstore: Blobstore,
    pub disks: Disks,
    pub networks: Networks,
    pub ntp: Vec<String>,
    pub mbus: String,
    pub vm: Vm,
}

impl Settings {
    /// Parse a raw settings document.
    pub fn from_slice(contents: &[u8]) -> Result<Self, ParseError> {
        let mut de = serde_json::Deserializer::from_slice(contents);
        let settings = serde_path_to_error::deserialize(&mut de)?;
        de.end()?;
        Ok(settings)
    }

    /// Interpret an already-parsed, untyped settings document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ParseError> {
        Ok(serde_path_to_error::deserialize(value)?)
    }

    /// Render these settings as a wire document.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Returns the persistent disk with the caller-assigned identifier
    /// `disk_id`, if one is attached.
    pub fn persistent_disk_settings(
        &self,
        disk_id: &str,
    ) -> Option<DiskSettings> {
        self.disks
            .persistent
            .get(disk_id)
            .map(|descriptor| descriptor.to_disk_settings(disk_id))
    }

    /// Returns every persistent disk, ordered by identifier.
    pub fn persistent_disk_settings_all(&self) -> Vec<DiskSettings> {
        self.disks
            .persistent
            .iter()
            .map(|(id, descriptor)| descriptor.to_disk_settings(id))
            .collect()
    }

    pub fn ephemeral_disk_settings(&self) -> DiskSettings {
        self.disks.ephemeral.to_disk_settings("")
    }
}
