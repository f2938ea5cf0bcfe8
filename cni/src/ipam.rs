// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Address management is delegated to the plugin named by `ipam.type`.

use crate::error::SriovError;
use args::{CniCommand, ErrorPayload, LegacyResult};
use interface_manager::{LinkControl, Route};
use net::interface::InterfaceName;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum IpamError {
    #[error("plugin {plugin} not found in {path:?}")]
    NotFound { plugin: String, path: Vec<PathBuf> },
    #[error("failed to run {path}: {source}")]
    Exec {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} (code {})", .0.msg, .0.code)]
    Plugin(ErrorPayload),
    #[error("plugin exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("failed to decode plugin result: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("plugin returned no ip4 configuration")]
    MissingIp4,
}

/// Address assignment for the interface being attached.
pub trait Ipam {
    /// Reserve addresses.  The result always carries `ip4`.
    fn add(&self) -> impl Future<Output = Result<LegacyResult, IpamError>>;

    /// Release whatever [`Ipam::add`] reserved for this container.
    fn del(&self) -> impl Future<Output = Result<(), IpamError>>;
}

/// Runs an IPAM plugin binary found in `CNI_PATH`.
#[derive(Debug, Clone)]
pub struct ExecIpam {
    plugin: String,
    search_path: Vec<PathBuf>,
    vars: Vec<(&'static str, String)>,
    stdin: Vec<u8>,
}

impl ExecIpam {
    /// `vars` are passed to the plugin in addition to `CNI_COMMAND`; `stdin` is the network
    /// configuration exactly as this plugin received it.
    #[must_use]
    pub fn new(
        plugin: &str,
        search_path: &[PathBuf],
        vars: Vec<(&'static str, String)>,
        stdin: Vec<u8>,
    ) -> Self {
        Self {
            plugin: plugin.to_string(),
            search_path: search_path.to_vec(),
            vars,
            stdin,
        }
    }

    fn find(&self) -> Result<PathBuf, IpamError> {
        self.search_path
            .iter()
            .map(|dir| dir.join(&self.plugin))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| IpamError::NotFound {
                plugin: self.plugin.clone(),
                path: self.search_path.clone(),
            })
    }

    #[tracing::instrument(level = "debug", skip(self), fields(plugin = %self.plugin))]
    async fn exec(&self, command: CniCommand) -> Result<Vec<u8>, IpamError> {
        let path = self.find()?;
        let exec_error = |source| IpamError::Exec {
            path: path.clone(),
            source,
        };
        let mut child = Command::new(&path)
            .envs(self.vars.iter().map(|(k, v)| (*k, v.as_str())))
            .env("CNI_COMMAND", command.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(exec_error)?;
        // a plugin may exit without reading its configuration
        if let Some(mut stdin) = child.stdin.take()
            && let Err(err) = stdin.write_all(&self.stdin).await
            && err.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(exec_error(err));
        }
        let output = child.wait_with_output().await.map_err(exec_error)?;
        debug!("{} {command} exited with {}", path.display(), output.status);
        if output.status.success() {
            return Ok(output.stdout);
        }
        match serde_json::from_slice::<ErrorPayload>(&output.stdout) {
            Ok(payload) => Err(IpamError::Plugin(payload)),
            Err(_) => Err(IpamError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

impl Ipam for ExecIpam {
    async fn add(&self) -> Result<LegacyResult, IpamError> {
        let stdout = self.exec(CniCommand::Add).await?;
        let result: LegacyResult = serde_json::from_slice(&stdout)?;
        if result.ip4.is_none() {
            return Err(IpamError::MissingIp4);
        }
        Ok(result)
    }

    async fn del(&self) -> Result<(), IpamError> {
        self.exec(CniCommand::Del).await.map(|_| ())
    }
}

/// Bring `ifname` up and apply the addresses and routes of `result` to it.
///
/// `links` must serve the namespace the interface lives in.  Routes without a next hop use the
/// gateway of their address family.
#[tracing::instrument(level = "debug", skip(links, result))]
pub async fn configure_interface<L: LinkControl>(
    links: &L,
    ifname: &InterfaceName,
    result: &LegacyResult,
) -> Result<(), SriovError> {
    let config = |e| SriovError::from_link(e, SriovError::Configuration);
    let link = links.get(ifname).await.map_err(config)?;
    links.set_up(&link).await.map_err(config)?;
    for ip in [&result.ip4, &result.ip6].into_iter().flatten() {
        links.add_address(&link, ip.ip).await.map_err(config)?;
        for entry in &ip.routes {
            let route = Route {
                dst: entry.dst,
                gateway: entry.gw.or(ip.gateway),
            };
            links.add_route(&link, &route).await.map_err(config)?;
        }
    }
    info!("configured addresses of {ifname}");
    Ok(())
}
