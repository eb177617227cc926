// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Disk attachment settings.
//!
//! Providers describe an attached disk in one of two ways: a bare device
//! path, or an object naming both the provider's volume and the device path.
//! [`DiskDescriptor`] is the wire form of either shape; [`DiskSettings`] is
//! the canonical form that every consumer outside this crate works with.

use schemars::JsonSchema;
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A disk as described on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum DiskDescriptor {
    /// Legacy form: a single string used as both the volume ID and the path.
    Path(String),
    /// The volume ID and the device path, which may differ.
    Structured { volume_id: String, path: String },
}

impl Default for DiskDescriptor {
    fn default() -> Self {
        DiskDescriptor::Path(String::new())
    }
}

impl DiskDescriptor {
    /// Canonicalize this descriptor for the disk identified by `id`.
    pub fn to_disk_settings(&self, id: &str) -> DiskSettings {
        let (volume_id, path) = match self {
            DiskDescriptor::Path(path) => (path.clone(), path.clone()),
            DiskDescriptor::Structured { volume_id, path } => {
                (volume_id.clone(), path.clone())
            }
        };
        DiskSettings { id: id.to_string(), volume_id, path }
    }
}

// Deserialization is written by hand rather than through
// `#[serde(untagged)]` so that a descriptor of the wrong shape reports which
// shapes we accept, instead of "data did not match any variant".
impl<'de> Deserialize<'de> for DiskDescriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DescriptorVisitor;

        impl<'de> Visitor<'de> for DescriptorVisitor {
            type Value = DiskDescriptor;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(
                    "a device path string or an object with \
                     `volume_id` and `path` strings",
                )
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(DiskDescriptor::Path(v.to_string()))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(DiskDescriptor::Path(v))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut volume_id: Option<String> = None;
                let mut path: Option<String> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "volume_id" => {
                            if volume_id.is_some() {
                                return Err(de::Error::duplicate_field(
                                    "volume_id",
                                ));
                            }
                            volume_id = Some(map.next_value()?);
                        }
                        "path" => {
                            if path.is_some() {
                                return Err(de::Error::duplicate_field("path"));
                            }
                            path = Some(map.next_value()?);
                        }
                        // Providers attach extra hints (LUNs, host device
                        // IDs) that we don't consume.
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(DiskDescriptor::Structured {
                    volume_id: volume_id.unwrap_or_default(),
                    path: path.unwrap_or_default(),
                })
            }
        }

        deserializer.deserialize_any(DescriptorVisitor)
    }
}

/// The canonical description of one attached disk.
///
/// `path` is where the provider *believes* the device lives. It is the input
/// to device path resolution, not necessarily the path the kernel exposes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiskSettings {
    /// Caller-assigned disk identifier; empty for the ephemeral disk.
    pub id: String,
    pub volume_id: String,
    pub path: String,
}

/// All disks attached to this instance.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(default)]
pub struct Disks {
    /// Device path of the system (root) disk.
    pub system: String,
    pub ephemeral: DiskDescriptor,
    pub persistent: BTreeMap<String, DiskDescriptor>,
}
