// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Cluster access for the SR-IOV plugin: node self-identification, the node resource record and
//! per-workload attribute overrides.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

mod client;
mod node;
mod overrides;

pub use client::{ClusterClient, KubeCluster};
pub use node::{NodeResourceRecord, find_node_by_machine_id};
pub use overrides::WorkloadOverrides;

pub use k8s_openapi::api::core::v1::Node;

use std::path::PathBuf;

/// Kubeconfig used when the network configuration does not name one.
pub const DEFAULT_KUBECONFIG: &str = "/etc/kubernetes/node-kubeconfig.yaml";
/// Local machine identity, matched against `status.nodeInfo.machineID`.
pub const MACHINE_ID_PATH: &str = "/etc/machine-id";
/// Node annotation carrying the exact free VF count.
pub const FREE_VF_ANNOTATION: &str = "sriov/vfCount";
/// Node label telling the scheduler whether any VF is free.
pub const FREE_VF_LABEL: &str = "sriov/freeVFAvailable";
/// Pod annotation overriding the VLAN tag.
pub const VLAN_ANNOTATION: &str = "networks-sriov-vlan";
/// Pod annotation overriding the transmit rate ceiling (Mbps).
pub const TX_RATE_ANNOTATION: &str = "networks-sriov-txrate";

/// Errors which can occur while talking to the cluster.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("failed to load kubeconfig {path}: {reason}")]
    Kubeconfig { path: PathBuf, reason: String },
    #[error("failed to read machine id from {path}: {source}")]
    MachineId {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no node has machine id {0}")]
    NodeNotFound(String),
    #[error("pod {namespace}/{name} does not exist")]
    PodNotFound { namespace: String, name: String },
    #[error("node {0} was modified concurrently")]
    Conflict(String),
    #[error("invalid value {value:?} for pod annotation {key}: {reason}")]
    InvalidOverride {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("client error: {0}")]
    Client(#[from] kube::Error),
}
