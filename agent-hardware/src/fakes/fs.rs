// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::fs::Api;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

/// A fake implementation of [crate::fs::Api].
///
/// Entries live in memory and may be added or removed at any time, which
/// lets tests model devices that show up after a resolution has started.
/// Every probe made through [Api::exists] is recorded.
#[derive(Debug, Default)]
pub struct FileSystem {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<Utf8PathBuf, String>,
    probes: Vec<Utf8PathBuf>,
}

impl FileSystem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds an empty entry, such as a device node.
    pub fn add_device(&self, path: impl Into<Utf8PathBuf>) {
        self.add_file(path, "");
    }

    pub fn add_file(
        &self,
        path: impl Into<Utf8PathBuf>,
        contents: impl Into<String>,
    ) {
        self.inner.lock().unwrap().files.insert(path.into(), contents.into());
    }

    pub fn remove(&self, path: &Utf8Path) {
        self.inner.lock().unwrap().files.remove(path);
    }

    /// Paths passed to [Api::exists], in the order they were probed.
    pub fn probes(&self) -> Vec<Utf8PathBuf> {
        self.inner.lock().unwrap().probes.clone()
    }
}

#[async_trait]
impl Api for FileSystem {
    async fn exists(&self, path: &Utf8Path) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.probes.push(path.to_owned());
        inner.files.contains_key(path)
    }

    async fn read_to_string(&self, path: &Utf8Path) -> io::Result<String> {
        self.inner.lock().unwrap().files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{path}: no such file"),
            )
        })
    }
}
