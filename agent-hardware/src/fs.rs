// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The narrow view of the filesystem the agent needs.

use async_trait::async_trait;
use camino::Utf8Path;

/// Read-only access to the filesystem.
///
/// Implementations must be safe to share between concurrent resolutions.
#[async_trait]
pub trait Api: Send + Sync {
    /// Returns true if `path` names an existing entry.
    ///
    /// An entry that cannot be inspected (for example, because of
    /// permissions) is reported as absent.
    async fn exists(&self, path: &Utf8Path) -> bool;

    async fn read_to_string(&self, path: &Utf8Path) -> std::io::Result<String>;
}

/// The host's filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct RealFileSystem;

#[async_trait]
impl Api for RealFileSystem {
    async fn exists(&self, path: &Utf8Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_to_string(&self, path: &Utf8Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}
