// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolution of provider-asserted disk paths to real device nodes.
//!
//! The platform tells us a disk is attached at, say, `/dev/sdf`. Depending on
//! the hypervisor, the kernel may instead expose it as `/dev/xvdf` (Xen) or
//! `/dev/vdf` (KVM/virtio), and it may not expose it at all until some time
//! after we've been told about it. Resolution therefore probes each naming
//! convention in turn, and keeps probing until the device appears or the
//! wait budget runs out.

use crate::fs;
use agent_settings::DiskSettings;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use slog::{debug, info, o, warn, Logger};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The device path prefix providers use when asserting where a disk lives.
pub const BASE_DEVICE_PREFIX: &str = "/dev/sd";

/// Device path prefixes, in the order they are probed.
///
/// Hypervisor-specific names come first: if one of them exists, the device
/// was remapped. The SCSI-style name is the fallback.
pub const CANDIDATE_PREFIXES: [&str; 3] = [
    "/dev/xvd", // Xen
    "/dev/vd",  // KVM
    BASE_DEVICE_PREFIX,
];

/// How long to wait between probes while a device is not yet visible.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(
        "Device path {path:?} does not contain the base device prefix {:?} \
         followed by a device suffix",
        BASE_DEVICE_PREFIX
    )]
    MalformedPath { path: String },

    #[error("Timed out after {timeout:?} getting real device path for {path}")]
    Timeout { path: String, timeout: Duration },

    #[error("Cancelled while getting real device path for {path}")]
    Cancelled { path: String },
}

impl ResolveError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResolveError::Timeout { .. })
    }
}

/// Finds the device node the kernel actually exposes for a disk.
#[async_trait]
pub trait DevicePathResolver: Send + Sync {
    /// Blocks until the device for `disk` is visible, returning its path.
    async fn get_real_device_path(
        &self,
        disk: &DiskSettings,
    ) -> Result<Utf8PathBuf, ResolveError>;
}

// Probes `candidates` in order until one exists, sleeping between rounds,
// until `timeout` has elapsed or `cancel` fires.
async fn wait_for_any(
    log: &Logger,
    fs: &dyn fs::Api,
    requested: &str,
    candidates: &[Utf8PathBuf],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Utf8PathBuf, ResolveError> {
    let start = Instant::now();
    // A budget too large to represent never expires.
    let stop_after = start.checked_add(timeout);

    loop {
        for candidate in candidates {
            if fs.exists(candidate).await {
                info!(
                    log,
                    "found real device path";
                    "requested" => requested,
                    "path" => %candidate,
                    "elapsed" => ?start.elapsed(),
                );
                return Ok(candidate.clone());
            }
        }

        if stop_after.is_some_and(|stop_after| Instant::now() >= stop_after) {
            warn!(
                log,
                "timed out waiting for device";
                "requested" => requested,
                "timeout" => ?timeout,
            );
            return Err(ResolveError::Timeout {
                path: requested.to_string(),
                timeout,
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(
                    log,
                    "cancelled while waiting for device";
                    "requested" => requested,
                );
                return Err(ResolveError::Cancelled {
                    path: requested.to_string(),
                });
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

/// Resolves disks whose asserted path may have been renamed by the
/// hypervisor.
pub struct MappedDevicePathResolver {
    log: Logger,
    fs: Arc<dyn fs::Api>,
    disk_wait_timeout: Duration,
    cancel: CancellationToken,
}

impl MappedDevicePathResolver {
    pub fn new(
        log: &Logger,
        fs: Arc<dyn fs::Api>,
        disk_wait_timeout: Duration,
    ) -> Self {
        Self {
            log: log.new(o!("component" => "MappedDevicePathResolver")),
            fs,
            disk_wait_timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon any in-progress resolution when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the paths that could hold the device asserted at `path`, in
    /// probe order.
    pub fn candidate_paths(path: &str) -> Result<Vec<Utf8PathBuf>, ResolveError> {
        let suffix = match path.split_once(BASE_DEVICE_PREFIX) {
            Some((_, suffix)) if !suffix.is_empty() => suffix,
            _ => {
                return Err(ResolveError::MalformedPath {
                    path: path.to_string(),
                })
            }
        };
        Ok(CANDIDATE_PREFIXES
            .iter()
            .map(|prefix| Utf8PathBuf::from(format!("{prefix}{suffix}")))
            .collect())
    }
}

#[async_trait]
impl DevicePathResolver for MappedDevicePathResolver {
    async fn get_real_device_path(
        &self,
        disk: &DiskSettings,
    ) -> Result<Utf8PathBuf, ResolveError> {
        let candidates = Self::candidate_paths(&disk.path)?;
        debug!(
            self.log,
            "resolving device path";
            "disk_id" => &disk.id,
            "requested" => &disk.path,
            "candidates" => ?candidates,
        );
        wait_for_any(
            &self.log,
            self.fs.as_ref(),
            &disk.path,
            &candidates,
            self.disk_wait_timeout,
            &self.cancel,
        )
        .await
    }
}

/// Resolves disks on platforms that expose devices exactly where the
/// provider says they are, once they appear.
pub struct IdentityDevicePathResolver {
    log: Logger,
    fs: Arc<dyn fs::Api>,
    disk_wait_timeout: Duration,
    cancel: CancellationToken,
}

impl IdentityDevicePathResolver {
    pub fn new(
        log: &Logger,
        fs: Arc<dyn fs::Api>,
        disk_wait_timeout: Duration,
    ) -> Self {
        Self {
            log: log.new(o!("component" => "IdentityDevicePathResolver")),
            fs,
            disk_wait_timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
impl DevicePathResolver for IdentityDevicePathResolver {
    async fn get_real_device_path(
        &self,
        disk: &DiskSettings,
    ) -> Result<Utf8PathBuf, ResolveError> {
        if disk.path.is_empty() {
            return Err(ResolveError::MalformedPath { path: String::new() });
        }
        debug!(
            self.log,
            "resolving device path";
            "disk_id" => &disk.id,
            "requested" => &disk.path,
        );
        wait_for_any(
            &self.log,
            self.fs.as_ref(),
            &disk.path,
            &[Utf8PathBuf::from(&disk.path)],
            self.disk_wait_timeout,
            &self.cancel,
        )
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fakes;
    use agent_test_utils::dev::test_setup_log;

    fn disk(path: &str) -> DiskSettings {
        DiskSettings {
            id: "disk-1".to_string(),
            volume_id: "vol-1".to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn candidate_paths_follow_priority_order() {
        let candidates =
            MappedDevicePathResolver::candidate_paths("/dev/sdf").unwrap();
        assert_eq!(candidates, ["/dev/xvdf", "/dev/vdf", "/dev/sdf"]);

        let candidates =
            MappedDevicePathResolver::candidate_paths("/dev/sdb1").unwrap();
        assert_eq!(candidates, ["/dev/xvdb1", "/dev/vdb1", "/dev/sdb1"]);
    }

    #[test]
    fn candidate_paths_reject_unrecognized_paths() {
        for path in ["/dev/nvme1n1", "/dev/sd", "", "sdf"] {
            let err = MappedDevicePathResolver::candidate_paths(path)
                .expect_err("path should be rejected");
            assert!(
                matches!(err, ResolveError::MalformedPath { .. }),
                "unexpected error for {path:?}: {err}"
            );
            let message = err.to_string();
            assert!(
                message.contains(&format!("{BASE_DEVICE_PREFIX:?}")),
                "{message}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hypervisor_prefix_wins_over_canonical() {
        let logctx = test_setup_log("hypervisor_prefix_wins_over_canonical");
        let fs = fakes::fs::FileSystem::new();
        fs.add_device("/dev/xvdf");
        let resolver = MappedDevicePathResolver::new(
            &logctx.log,
            fs.clone(),
            Duration::from_secs(1),
        );

        let path = resolver.get_real_device_path(&disk("/dev/sdf")).await;
        assert_eq!(path.unwrap(), "/dev/xvdf");
        assert_eq!(fs.probes(), ["/dev/xvdf"]);

        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_candidates_take_precedence() {
        let logctx = test_setup_log("earlier_candidates_take_precedence");
        let fs = fakes::fs::FileSystem::new();
        fs.add_device("/dev/vdf");
        fs.add_device("/dev/sdf");
        let resolver = MappedDevicePathResolver::new(
            &logctx.log,
            fs.clone(),
            Duration::from_secs(1),
        );

        let path = resolver.get_real_device_path(&disk("/dev/sdf")).await;
        assert_eq!(path.unwrap(), "/dev/vdf");

        fs.add_device("/dev/xvdf");
        let path = resolver.get_real_device_path(&disk("/dev/sdf")).await;
        assert_eq!(path.unwrap(), "/dev/xvdf");

        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_canonical_prefix() {
        let logctx = test_setup_log("falls_back_to_canonical_prefix");
        let fs = fakes::fs::FileSystem::new();
        fs.add_device("/dev/sdf");
        let resolver = MappedDevicePathResolver::new(
            &logctx.log,
            fs.clone(),
            Duration::from_secs(1),
        );

        let path = resolver.get_real_device_path(&disk("/dev/sdf")).await;
        assert_eq!(path.unwrap(), "/dev/sdf");
        assert_eq!(fs.probes(), ["/dev/xvdf", "/dev/vdf", "/dev/sdf"]);

        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_device_never_appears() {
        let logctx = test_setup_log("times_out_when_device_never_appears");
        let fs = fakes::fs::FileSystem::new();
        let resolver = MappedDevicePathResolver::new(
            &logctx.log,
            fs.clone(),
            Duration::from_secs(1),
        );

        let start = Instant::now();
        let err = resolver
            .get_real_device_path(&disk("/dev/sdf"))
            .await
            .expect_err("resolution should time out");
        assert!(err.is_timeout());
        assert!(err.to_string().contains("/dev/sdf"), "{err}");
        assert!(start.elapsed() >= Duration::from_secs(1));

        // We kept polling, one full round of candidates at a time.
        let probes = fs.probes();
        assert!(probes.len() > 3);
        assert_eq!(probes.len() % 3, 0);

        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_probes_once() {
        let logctx = test_setup_log("zero_budget_probes_once");
        let fs = fakes::fs::FileSystem::new();
        let resolver =
            MappedDevicePathResolver::new(&logctx.log, fs.clone(), Duration::ZERO);

        let err =
            resolver.get_real_device_path(&disk("/dev/sdf")).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(fs.probes().len(), 3);

        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_path_fails_without_polling() {
        let logctx = test_setup_log("malformed_path_fails_without_polling");
        let fs = fakes::fs::FileSystem::new();
        let resolver = MappedDevicePathResolver::new(
            &logctx.log,
            fs.clone(),
            Duration::from_secs(60),
        );

        let start = Instant::now();
        let err = resolver
            .get_real_device_path(&disk("/dev/nvme0n1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MalformedPath { .. }));
        assert!(!err.is_timeout());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(fs.probes().is_empty());

        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn detached_hypervisor_node_is_skipped() {
        let logctx = test_setup_log("detached_hypervisor_node_is_skipped");
        let fs = fakes::fs::FileSystem::new();
        fs.add_device("/dev/xvdh");
        fs.add_device("/dev/sdh");
        fs.remove(camino::Utf8Path::new("/dev/xvdh"));
        let resolver = MappedDevicePathResolver::new(
            &logctx.log,
            fs.clone(),
            Duration::from_secs(5),
        );

        let path = resolver.get_real_device_path(&disk("/dev/sdh")).await;
        assert_eq!(path.unwrap(), "/dev/sdh");
        assert_eq!(fs.probes(), ["/dev/xvdh", "/dev/vdh", "/dev/sdh"]);

        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_device_to_be_attached() {
        let logctx = test_setup_log("waits_for_device_to_be_attached");
        let fs = fakes::fs::FileSystem::new();
        let resolver = MappedDevicePathResolver::new(
            &logctx.log,
            fs.clone(),
            Duration::from_secs(5),
        );

        let attach = {
            let fs = fs.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(350)).await;
                fs.add_device("/dev/xvdg");
            })
        };

        let start = Instant::now();
        let path = resolver.get_real_device_path(&disk("/dev/sdg")).await;
        assert_eq!(path.unwrap(), "/dev/xvdg");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(350), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
        attach.await.unwrap();

        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_resolution() {
        let logctx = test_setup_log("cancellation_aborts_resolution");
        let fs = fakes::fs::FileSystem::new();
        let cancel = CancellationToken::new();
        let resolver = MappedDevicePathResolver::new(
            &logctx.log,
            fs.clone(),
            Duration::from_secs(60),
        )
        .with_cancellation(cancel.clone());

        let shutdown = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let err =
            resolver.get_real_device_path(&disk("/dev/sdf")).await.unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled { .. }), "{err}");
        assert!(start.elapsed() < Duration::from_secs(1));
        shutdown.await.unwrap();

        logctx.cleanup_successful();
    }

    #[tokio::test(start_paused = true)]
    async fn identity_resolver_does_not_remap() {
        let logctx = test_setup_log("identity_resolver_does_not_remap");
        let fs = fakes::fs::FileSystem::new();
        fs.add_device("/dev/xvdf");
        fs.add_device("/dev/disk/by-id/virtio-vol-1");
        let resolver = IdentityDevicePathResolver::new(
            &logctx.log,
            fs.clone(),
            Duration::from_millis(500),
        );

        let path = resolver
            .get_real_device_path(&disk("/dev/disk/by-id/virtio-vol-1"))
            .await;
        assert_eq!(path.unwrap(), "/dev/disk/by-id/virtio-vol-1");

        let err =
            resolver.get_real_device_path(&disk("/dev/sdf")).await.unwrap_err();
        assert!(err.is_timeout());

        let err = resolver.get_real_device_path(&disk("")).await.unwrap_err();
        assert!(matches!(err, ResolveError::MalformedPath { .. }));

        logctx.cleanup_successful();
    }
}
