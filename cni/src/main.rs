// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The `sriov` CNI plugin: hands SR-IOV network devices to workload network namespaces.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod configure;
mod error;
mod ipam;
mod logging;
mod migrate;
mod plugin;
mod publish;
mod request;

#[cfg(test)]
mod testing;

use crate::error::{PluginError, SriovError};
use crate::ipam::ExecIpam;
use crate::plugin::{Plugin, SpawnWorker};
use crate::request::AttachmentRequest;
use args::{
    ArgsError, CniArgs, CniCommand, CniEnv, DEFAULT_VERSION, ErrorPayload, LegacyResult, NetConf,
    VersionInfo,
};
use interface_manager::{NetNs, Netlink};
use k8s_intf::{DEFAULT_KUBECONFIG, KubeCluster};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use sysfs::SriovInventory;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

/// What a successful invocation prints.
enum Output {
    Result(LegacyResult),
    Version(VersionInfo),
}

impl Output {
    fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Output::Result(result) => serde_json::to_string(result),
            Output::Version(version) => serde_json::to_string(version),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let mut cni_version = DEFAULT_VERSION.to_string();
    let err = match run(&mut cni_version).await {
        Ok(None) => return ExitCode::SUCCESS,
        Ok(Some(output)) => match output.to_json() {
            Ok(json) => {
                println!("{json}");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                eprintln!("failed to encode result: {e}");
                return ExitCode::FAILURE;
            }
        },
        Err(err) => err,
    };
    error!("{err}");
    let payload = ErrorPayload {
        cni_version,
        code: err.code(),
        msg: err.to_string(),
        details: err.details(),
    };
    match serde_json::to_string(&payload) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to encode error: {e}"),
    }
    ExitCode::FAILURE
}

async fn run(cni_version: &mut String) -> Result<Option<Output>, PluginError> {
    let env = CniEnv::from_env()?;
    if env.command() == CniCommand::Version {
        return Ok(Some(Output::Version(VersionInfo::default())));
    }

    let mut stdin = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut stdin)
        .await
        .map_err(ArgsError::Stdin)?;
    let conf = NetConf::parse(&stdin)?;
    cni_version.clone_from(&conf.cni_version);
    logging::init(conf.log_level, conf.log_file.as_deref());

    let cni_args: CniArgs = env.args().parse()?;
    let ifname = env.ifname()?;
    let container_id = env.container_id()?;
    let netns = match env.command() {
        CniCommand::Add => Some(env.require_netns()?.to_path_buf()),
        _ => env
            .netns()
            .filter(|path| !path.as_os_str().is_empty())
            .map(Path::to_path_buf),
    };
    info!(
        "{} container {container_id} interface {ifname} on {}",
        env.command(),
        conf.master
    );
    let request = AttachmentRequest::new(&conf, &cni_args, ifname, netns);

    let host = Netlink::connect()
        .map_err(|e| PluginError::Setup(SriovError::from_link(e, SriovError::Namespace)))?;
    let host_netns = NetNs::current().map_err(|e| PluginError::Setup(e.into()))?;
    let cluster = if conf.pf_only {
        None
    } else {
        let path = conf
            .kubeconfig
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_KUBECONFIG));
        match KubeCluster::connect(&path).await {
            Ok(cluster) => Some(cluster),
            Err(err) => {
                warn!("continuing without cluster access: {err}");
                None
            }
        }
    };
    let ipam = ExecIpam::new(&conf.ipam.plugin, env.path(), env.delegate_vars(), stdin);
    let plugin = Plugin::new(
        host,
        SpawnWorker,
        host_netns,
        SriovInventory::new(),
        cluster,
        ipam,
    );

    match env.command() {
        CniCommand::Add => {
            let mut result = plugin.attach(&request).await?;
            result.cni_version = Some(conf.cni_version.clone());
            if result.dns.is_empty() {
                result.dns = conf.dns.clone();
            }
            Ok(Some(Output::Result(result)))
        }
        CniCommand::Del => {
            plugin.detach(&request).await?;
            Ok(None)
        }
        CniCommand::Version => Ok(Some(Output::Version(VersionInfo::default()))),
    }
}
