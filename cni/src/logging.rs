// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use args::LogLevel;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Overrides the configured log level with a full filter directive, e.g. `sriov=trace`.
pub const LOG_ENV: &str = "SRIOV_CNI_LOG";

/// Install the global subscriber.
///
/// Stdout carries the result document, so logs go to `file` if given and to stderr otherwise.
pub fn init(level: LogLevel, file: Option<&Path>) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    let installed = match file {
        None => builder.with_writer(std::io::stderr).try_init(),
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(log) => builder.with_ansi(false).with_writer(Mutex::new(log)).try_init(),
            Err(err) => {
                let installed = builder.with_writer(std::io::stderr).try_init();
                warn!("failed to open log file {}: {err}", path.display());
                installed
            }
        },
    };
    if let Err(err) = installed {
        debug!("keeping the subscriber already installed: {err}");
    }
}
