// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities intended for the test suite. These should not be used in
//! production code.

use camino::Utf8PathBuf;
use slog::{o, Drain, Level, Logger};
use std::sync::atomic::{AtomicU32, Ordering};

static TEST_SUITE_LOGGER_ID: AtomicU32 = AtomicU32::new(0);

/// A logger for one test, writing bunyan-formatted records to a file in the
/// temporary directory.
///
/// The file is kept when a test fails so it can be inspected; tests call
/// [`LogContext::cleanup_successful`] on their way out to remove it.
pub struct LogContext {
    pub log: Logger,
    log_path: Utf8PathBuf,
}

impl LogContext {
    pub fn new(test_name: &str) -> LogContext {
        let pid = std::process::id();
        let id = TEST_SUITE_LOGGER_ID.fetch_add(1, Ordering::SeqCst);
        let dir = Utf8PathBuf::try_from(std::env::temp_dir())
            .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
        let log_path = dir.join(format!("{test_name}.{pid}.{id}.log"));

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&log_path)
            .unwrap_or_else(|e| panic!("open log file {log_path}: {e}"));
        eprintln!("log file: {log_path}");

        let drain = slog_bunyan::with_name("agent-test", file).build().fuse();
        let drain = slog::LevelFilter(drain, Level::Trace).fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        let log = Logger::root(drain, o!("test" => test_name.to_string()));

        LogContext { log, log_path }
    }

    pub fn log_path(&self) -> &Utf8PathBuf {
        &self.log_path
    }

    /// Removes the log file. Call this only once the test has passed.
    pub fn cleanup_successful(self) {
        let LogContext { log, log_path } = self;
        drop(log);
        if let Err(e) = std::fs::remove_file(&log_path) {
            eprintln!("failed to remove log file {log_path}: {e}");
        }
    }
}

/// Set up a [`LogContext`] appropriate for a test named `test_name`.
pub fn test_setup_log(test_name: &str) -> LogContext {
    LogContext::new(test_name)
}
