// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A fake metadata service, for tests.

use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex};

/// A fake implementation of [crate::MetadataService].
///
/// Serves whatever documents have been set. A document that was never set
/// fails to fetch with [io::ErrorKind::NotFound].
#[derive(Debug)]
pub struct MetadataService {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    available: bool,
    settings: Option<String>,
    metadata: Option<String>,
    user_data: Option<String>,
}

impl MetadataService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                available: true,
                settings: None,
                metadata: None,
                user_data: None,
            }),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.inner.lock().unwrap().available = available;
    }

    pub fn set_settings(&self, contents: impl Into<String>) {
        self.inner.lock().unwrap().settings = Some(contents.into());
    }

    pub fn set_metadata(&self, contents: impl Into<String>) {
        self.inner.lock().unwrap().metadata = Some(contents.into());
    }

    pub fn set_user_data(&self, contents: impl Into<String>) {
        self.inner.lock().unwrap().user_data = Some(contents.into());
    }
}

fn serve(document: &Option<String>, name: &str) -> io::Result<Vec<u8>> {
    document.as_ref().map(|s| s.clone().into_bytes()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no {name} document"))
    })
}

#[async_trait]
impl crate::MetadataService for MetadataService {
    async fn is_available(&self) -> bool {
        self.inner.lock().unwrap().available
    }

    async fn fetch_settings(&self) -> io::Result<Vec<u8>> {
        serve(&self.inner.lock().unwrap().settings, "settings")
    }

    async fn fetch_metadata(&self) -> io::Result<Vec<u8>> {
        serve(&self.inner.lock().unwrap().metadata, "metadata")
    }

    async fn fetch_user_data(&self) -> io::Result<Vec<u8>> {
        serve(&self.inner.lock().unwrap().user_data, "user data")
    }
}
