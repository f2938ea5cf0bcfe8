// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::ArgsError;
use clap::Parser;
use net::interface::InterfaceName;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The operation requested by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CniCommand {
    Add,
    Del,
    Version,
}

impl FromStr for CniCommand {
    type Err = String;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "ADD" => Ok(CniCommand::Add),
            "DEL" => Ok(CniCommand::Del),
            "VERSION" => Ok(CniCommand::Version),
            other => Err(format!(
                "unknown command '{other}': allowed values are ADD|DEL|VERSION"
            )),
        }
    }
}

impl Display for CniCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CniCommand::Add => "ADD",
            CniCommand::Del => "DEL",
            CniCommand::Version => "VERSION",
        })
    }
}

/// The `CNI_*` environment of one invocation.
///
/// Every value may also be given as a long option, which is how the tests drive it.
#[derive(Debug, Clone, Parser)]
#[command(name = "sriov")]
#[command(about = "SR-IOV CNI plugin", long_about = None)]
pub struct CniEnv {
    #[arg(long, env = "CNI_COMMAND", value_parser = CniCommand::from_str)]
    command: CniCommand,

    #[arg(long, env = "CNI_CONTAINERID")]
    container_id: Option<String>,

    #[arg(long, env = "CNI_NETNS")]
    netns: Option<PathBuf>,

    #[arg(long, env = "CNI_IFNAME")]
    ifname: Option<String>,

    #[arg(long, env = "CNI_ARGS")]
    args: Option<String>,

    #[arg(long, env = "CNI_PATH", value_delimiter = ':')]
    path: Vec<PathBuf>,
}

impl CniEnv {
    /// Read the environment of this process.
    pub fn from_env() -> Result<Self, ArgsError> {
        Self::try_parse_from(["sriov"]).map_err(|e| match e.kind() {
            clap::error::ErrorKind::MissingRequiredArgument => ArgsError::MissingEnv("CNI_COMMAND"),
            _ => ArgsError::InvalidEnv {
                var: "CNI_COMMAND",
                reason: e.to_string(),
            },
        })
    }

    #[must_use]
    pub fn command(&self) -> CniCommand {
        self.command
    }

    pub fn container_id(&self) -> Result<&str, ArgsError> {
        self.container_id
            .as_deref()
            .ok_or(ArgsError::MissingEnv("CNI_CONTAINERID"))
    }

    /// The target namespace path.  Absent on a `DEL` for a namespace that is already gone.
    #[must_use]
    pub fn netns(&self) -> Option<&Path> {
        self.netns.as_deref()
    }

    pub fn require_netns(&self) -> Result<&Path, ArgsError> {
        self.netns().ok_or(ArgsError::MissingEnv("CNI_NETNS"))
    }

    /// The interface name requested inside the container.
    pub fn ifname(&self) -> Result<InterfaceName, ArgsError> {
        let name = self
            .ifname
            .as_deref()
            .ok_or(ArgsError::MissingEnv("CNI_IFNAME"))?;
        InterfaceName::try_from(name).map_err(|e| ArgsError::InvalidEnv {
            var: "CNI_IFNAME",
            reason: e.to_string(),
        })
    }

    /// The raw `CNI_ARGS` string, empty if unset.
    #[must_use]
    pub fn args(&self) -> &str {
        self.args.as_deref().unwrap_or_default()
    }

    /// Directories searched for delegated plugins.
    #[must_use]
    pub fn path(&self) -> &[PathBuf] {
        &self.path
    }

    /// The `CNI_*` variables to hand to a delegated plugin, except `CNI_COMMAND`.
    #[must_use]
    pub fn delegate_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = Vec::new();
        if let Some(id) = &self.container_id {
            vars.push(("CNI_CONTAINERID", id.clone()));
        }
        if let Some(netns) = &self.netns {
            vars.push(("CNI_NETNS", netns.display().to_string()));
        }
        if let Some(ifname) = &self.ifname {
            vars.push(("CNI_IFNAME", ifname.clone()));
        }
        vars.push(("CNI_ARGS", self.args().to_string()));
        let path = self
            .path
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        vars.push(("CNI_PATH", path));
        vars
    }
}
