// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging configuration (the `[log]` table of the agent config file).

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use slog::{o, Drain, Level, Logger};
use std::fs::OpenOptions;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ConfigLogging {
    StderrTerminal {
        level: ConfigLoggingLevel,
    },
    File {
        level: ConfigLoggingLevel,
        path: Utf8PathBuf,
        if_exists: ConfigLoggingIfExists,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigLoggingIfExists {
    Fail,
    Truncate,
    Append,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigLoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl From<ConfigLoggingLevel> for Level {
    fn from(config_level: ConfigLoggingLevel) -> Level {
        match config_level {
            ConfigLoggingLevel::Trace => Level::Trace,
            ConfigLoggingLevel::Debug => Level::Debug,
            ConfigLoggingLevel::Info => Level::Info,
            ConfigLoggingLevel::Warn => Level::Warning,
            ConfigLoggingLevel::Error => Level::Error,
            ConfigLoggingLevel::Critical => Level::Critical,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("open log file \"{path}\": {err}")]
pub struct LogError {
    path: Utf8PathBuf,
    #[source]
    err: std::io::Error,
}

impl ConfigLogging {
    /// Create the root logger described by this configuration.
    pub fn to_logger(&self, name: &'static str) -> Result<Logger, LogError> {
        match self {
            ConfigLogging::StderrTerminal { level } => {
                let decorator = slog_term::TermDecorator::new().stderr().build();
                let drain =
                    slog_term::FullFormat::new(decorator).build().fuse();
                Ok(async_root_logger(*level, drain))
            }

            ConfigLogging::File { level, path, if_exists } => {
                let mut open_options = OpenOptions::new();
                open_options.write(true).create(true);
                match if_exists {
                    ConfigLoggingIfExists::Fail => {
                        open_options.create_new(true);
                    }
                    ConfigLoggingIfExists::Append => {
                        open_options.append(true);
                    }
                    ConfigLoggingIfExists::Truncate => {
                        open_options.truncate(true);
                    }
                }

                let file = open_log_file(&open_options, path)?;
                let drain = slog_bunyan::with_name(name, file).build().fuse();
                Ok(async_root_logger(*level, drain))
            }
        }
    }
}

fn open_log_file(
    open_options: &OpenOptions,
    path: &Utf8Path,
) -> Result<std::fs::File, LogError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| LogError { path: path.to_owned(), err })?;
    }
    let file = open_options
        .open(path)
        .map_err(|err| LogError { path: path.to_owned(), err })?;

    // Leave a note on stderr so whoever is watching it knows where the rest
    // of the output went.
    eprintln!("note: configured to log to \"{path}\"");
    Ok(file)
}

fn async_root_logger<T>(level: ConfigLoggingLevel, drain: T) -> Logger
where
    T: Drain + Send + 'static,
    <T as Drain>::Err: std::fmt::Debug,
{
    let pid = std::process::id();
    let level_drain = slog::LevelFilter(drain, Level::from(level)).fuse();
    let async_drain = slog_async::Async::new(level_drain).build().fuse();
    Logger::root(async_drain, o!("pid" => pid))
}
