// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{ClusterError, MACHINE_ID_PATH, find_node_by_machine_id};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What the plugin needs from the cluster.
pub trait ClusterClient {
    /// The node object of the local machine, freshly read.
    fn current_node(&self) -> impl Future<Output = Result<Node, ClusterError>>;

    /// Replace a node object previously returned by [`ClusterClient::current_node`].
    ///
    /// A concurrent modification is reported as [`ClusterError::Conflict`] and not retried.
    fn replace_node(&self, node: &Node) -> impl Future<Output = Result<(), ClusterError>>;

    /// The annotations of pod `name` in `namespace`.
    fn pod_annotations(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, ClusterError>>;
}

/// A [`ClusterClient`] backed by the kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    machine_id_path: PathBuf,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster")
            .field("machine_id_path", &self.machine_id_path)
            .finish_non_exhaustive()
    }
}

impl KubeCluster {
    /// Build a client from the kubeconfig file at `path`.
    ///
    /// # Errors
    ///
    /// [`ClusterError::Kubeconfig`] if the file can not be read or does not describe a usable
    /// cluster.
    #[tracing::instrument(level = "debug")]
    pub async fn connect(path: &Path) -> Result<Self, ClusterError> {
        let invalid = |reason: String| ClusterError::Kubeconfig {
            path: path.to_path_buf(),
            reason,
        };
        // kube leaves the choice of provider to the application; a second install is harmless
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| invalid(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| invalid(e.to_string()))?;
        let client = Client::try_from(config)?;
        debug!("cluster client built from {}", path.display());
        Ok(Self {
            client,
            machine_id_path: PathBuf::from(MACHINE_ID_PATH),
        })
    }

    /// Read the machine identity from `path` instead of `/etc/machine-id`.
    #[must_use]
    pub fn with_machine_id_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.machine_id_path = path.into();
        self
    }

    async fn machine_id(&self) -> Result<String, ClusterError> {
        let id = tokio::fs::read_to_string(&self.machine_id_path)
            .await
            .map_err(|source| ClusterError::MachineId {
                path: self.machine_id_path.clone(),
                source,
            })?;
        Ok(id.trim().to_string())
    }
}

impl ClusterClient for KubeCluster {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn current_node(&self) -> Result<Node, ClusterError> {
        let machine_id = self.machine_id().await?;
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;
        let node = find_node_by_machine_id(list.items, &machine_id)
            .ok_or(ClusterError::NodeNotFound(machine_id))?;
        debug!(
            "local node is {}",
            node.metadata.name.as_deref().unwrap_or_default()
        );
        Ok(node)
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn replace_node(&self, node: &Node) -> Result<(), ClusterError> {
        let name = node.metadata.name.clone().unwrap_or_default();
        let nodes: Api<Node> = Api::all(self.client.clone());
        match nodes.replace(&name, &PostParams::default(), node).await {
            Ok(_) => {
                info!("updated node {name}");
                Ok(())
            }
            Err(kube::Error::Api(status)) if status.code == 409 => {
                Err(ClusterError::Conflict(name))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn pod_annotations(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match pods.get(name).await {
            Ok(pod) => Ok(pod.metadata.annotations.unwrap_or_default()),
            Err(kube::Error::Api(status)) if status.code == 404 => Err(ClusterError::PodNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}
