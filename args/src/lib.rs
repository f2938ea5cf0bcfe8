// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The CNI invocation envelope: environment, network configuration, `CNI_ARGS`, and the result
//! and error documents written to stdout.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

mod cni_args;
mod env;
mod netconf;
mod result;

pub use cni_args::CniArgs;
pub use env::{CniCommand, CniEnv};
pub use netconf::{Dns, IpamConf, LogLevel, NetConf};
pub use result::{ErrorPayload, IpConfig, LegacyResult, RouteEntry, VersionInfo};

/// Result format versions this plugin speaks.
pub const SUPPORTED_VERSIONS: [&str; 2] = ["0.1.0", "0.2.0"];

/// The version reported when the configuration does not name one.
pub const DEFAULT_VERSION: &str = "0.2.0";

/// Errors in the invocation envelope itself, before any device is touched.
#[derive(Debug, thiserror::Error)]
pub enum ArgsError {
    #[error("incompatible CNI version {0}")]
    IncompatibleVersion(String),
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid environment variable {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },
    #[error("invalid CNI_ARGS: {0}")]
    InvalidCniArgs(String),
    #[error("failed to read network configuration: {0}")]
    Stdin(#[source] std::io::Error),
    #[error("failed to decode network configuration: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid network configuration: {0}")]
    InvalidConfig(String),
}

impl ArgsError {
    /// The well-known CNI error code for this error.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            ArgsError::IncompatibleVersion(_) => 1,
            ArgsError::MissingEnv(_) | ArgsError::InvalidEnv { .. } | ArgsError::InvalidCniArgs(_) => 4,
            ArgsError::Stdin(_) | ArgsError::Decode(_) => 6,
            ArgsError::InvalidConfig(_) => 7,
        }
    }
}
