// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Attach and detach of one device, end to end.

use crate::configure::{AttributeConfigurator, check_pf_only};
use crate::error::{AttachState, DetachState, PluginError, SriovError};
use crate::ipam::{Ipam, configure_interface};
use crate::migrate::{self, fallback_host_name};
use crate::publish::publish;
use crate::request::AttachmentRequest;
use args::LegacyResult;
use interface_manager::{Link, LinkControl, LinkError, NetNs, NetnsError, NetnsWorker};
use k8s_intf::ClusterClient;
use net::interface::InterfaceName;
use sysfs::SriovInventory;
use tracing::{debug, info, warn};

/// Gives access to the links of a namespace other than the caller's.
pub trait EnterNamespace {
    type Links: LinkControl;

    fn enter(&self, netns: &NetNs) -> impl Future<Output = Result<Self::Links, SriovError>>;
}

/// Serves each namespace from a freshly spawned [`NetnsWorker`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SpawnWorker;

impl EnterNamespace for SpawnWorker {
    type Links = NetnsWorker;

    async fn enter(&self, netns: &NetNs) -> Result<NetnsWorker, SriovError> {
        Ok(NetnsWorker::spawn(netns).await?)
    }
}

pub struct Plugin<H, N, C, I> {
    host: H,
    namespaces: N,
    host_netns: NetNs,
    inventory: SriovInventory,
    cluster: Option<C>,
    ipam: I,
}

impl<H, N, C, I> Plugin<H, N, C, I>
where
    H: LinkControl,
    N: EnterNamespace,
    C: ClusterClient,
    I: Ipam,
{
    /// `host` must act on `host_netns`.  Without a `cluster`, overrides are not looked up and
    /// nothing is published.
    pub fn new(
        host: H,
        namespaces: N,
        host_netns: NetNs,
        inventory: SriovInventory,
        cluster: Option<C>,
        ipam: I,
    ) -> Self {
        Self {
            host,
            namespaces,
            host_netns,
            inventory,
            cluster,
            ipam,
        }
    }

    /// Hand a device to the workload and assign its addresses.
    ///
    /// # Errors
    ///
    /// [`PluginError::Attach`] naming the last step which completed.  Completed steps are not
    /// undone.
    #[tracing::instrument(level = "info", skip_all, fields(master = %request.master, ifname = %request.ifname))]
    pub async fn attach(&self, request: &AttachmentRequest) -> Result<LegacyResult, PluginError> {
        let mut completed = AttachState::ParsedRequest;
        let result = self.try_attach(request, &mut completed).await;
        result.map_err(|source| PluginError::Attach { completed, source })
    }

    /// Return the workload's device to the host and release its addresses.
    ///
    /// Succeeds without doing anything if the workload's namespace is already gone.
    ///
    /// # Errors
    ///
    /// [`PluginError::Detach`] naming the last step which completed.
    #[tracing::instrument(level = "info", skip_all, fields(master = %request.master, ifname = %request.ifname))]
    pub async fn detach(&self, request: &AttachmentRequest) -> Result<(), PluginError> {
        let mut completed = DetachState::ParsedRequest;
        let result = self.try_detach(request, &mut completed).await;
        result.map_err(|source| PluginError::Detach { completed, source })
    }

    async fn try_attach(
        &self,
        request: &AttachmentRequest,
        completed: &mut AttachState,
    ) -> Result<LegacyResult, SriovError> {
        if request.pf_only {
            check_pf_only(request)?;
        }
        let path = request
            .netns
            .as_ref()
            .ok_or_else(|| SriovError::Namespace("no target namespace given".to_string()))?;
        let target = NetNs::open(path)?;
        let pf = self
            .host
            .get(&request.master)
            .await
            .map_err(|e| SriovError::from_link(e, SriovError::DeviceNotFound))?;

        let (device, vf) = if request.pf_only {
            if let Some(rate) = request.tx_rate {
                warn!("ignoring tx rate {rate} for physical function {}", pf.name);
            }
            (pf.clone(), None)
        } else {
            let vf = match request.vf {
                Some(index) => self.inventory.resolve(&request.master, index)?,
                None => self.inventory.allocate(&request.master)?,
            };
            let device = self
                .host
                .get(&vf.netdev)
                .await
                .map_err(|e| SriovError::from_link(e, SriovError::DeviceNotFound))?;
            (device, Some(vf.index))
        };
        *completed = AttachState::DeviceAcquired;

        if let Some(vf) = vf {
            AttributeConfigurator::new(&self.host, &pf, vf)
                .configure(request, self.cluster.as_ref())
                .await?;
        }
        *completed = AttachState::AttributesApplied;

        let inside = self.namespaces.enter(&target).await?;
        let moved = migrate::attach(
            &self.host,
            &inside,
            &device,
            &target,
            &request.ifname,
            !request.pf_only,
        )
        .await?;
        *completed = AttachState::Migrated;

        let result = self.ipam.add().await?;
        configure_interface(&inside, &moved.name, &result).await?;
        *completed = AttachState::AddressAssigned;

        if !request.pf_only {
            self.publish(&request.master).await;
        }
        *completed = AttachState::Published;
        info!("attached {} as {} in {target}", device.name, moved.name);
        Ok(result)
    }

    async fn try_detach(
        &self,
        request: &AttachmentRequest,
        completed: &mut DetachState,
    ) -> Result<(), SriovError> {
        let Some(path) = &request.netns else {
            info!("no namespace given, nothing to release");
            return Ok(());
        };
        let target = match NetNs::open(path) {
            Ok(target) => target,
            Err(NetnsError::NotFound(path)) => {
                info!("namespace {} is gone, nothing to release", path.display());
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let inside = self.namespaces.enter(&target).await?;
        match inside.get(&request.ifname).await {
            Ok(link) => {
                let host_name = self.host_name(&link, request).await?;
                *completed = DetachState::Resolved;
                migrate::detach(&inside, &link, &host_name, &self.host_netns).await?;
            }
            Err(LinkError::NotFound(_)) => {
                info!("{} is not in {target}, skipping migration", request.ifname);
                *completed = DetachState::Resolved;
            }
            Err(err) => return Err(SriovError::from_link(err, SriovError::Namespace)),
        }
        *completed = DetachState::Migrated;

        self.ipam.del().await?;
        *completed = DetachState::AddressReleased;

        if !request.pf_only {
            self.publish(&request.master).await;
        }
        *completed = DetachState::Published;
        Ok(())
    }

    /// The name a device gets back on the host: the one it had before attach if it is still
    /// available, `dev<ifindex>` otherwise.  A physical function always gets its own name.
    async fn host_name(
        &self,
        link: &Link,
        request: &AttachmentRequest,
    ) -> Result<InterfaceName, SriovError> {
        if request.pf_only {
            return Ok(request.master.clone());
        }
        let remembered = link
            .alias
            .as_deref()
            .and_then(|alias| InterfaceName::try_from(alias).ok());
        if let Some(name) = remembered {
            match self.host.get(&name).await {
                Err(LinkError::NotFound(_)) => return Ok(name),
                Ok(other) => warn!("host name {name} of {link} is taken by {other}"),
                Err(err) => warn!("failed to look up host name {name}: {err}"),
            }
        } else {
            debug!("{link} has no recorded host name");
        }
        fallback_host_name(link)
    }

    /// Best effort: a stale count is corrected by the next attach or detach on this node.
    async fn publish(&self, pf: &InterfaceName) {
        let Some(cluster) = &self.cluster else {
            warn!("no cluster client, not publishing free vfs of {pf}");
            return;
        };
        if let Err(err) = publish(cluster, &self.inventory, pf).await {
            warn!("failed to publish free vfs of {pf}: {err}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::Fixture;
    use ipnet::IpNet;
    use k8s_intf::{FREE_VF_ANNOTATION, FREE_VF_LABEL, VLAN_ANNOTATION};
    use net::vf::{TxRate, VfIndex};
    use net::vlan::Vid;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tracing_test::traced_test;

    fn published(fixture: &Fixture) -> (String, String) {
        let node = fixture.cluster.last_replaced().unwrap();
        (
            node.metadata.annotations.unwrap()[FREE_VF_ANNOTATION].clone(),
            node.metadata.labels.unwrap()[FREE_VF_LABEL].clone(),
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn attach_then_detach_round_trip() {
        let fixture = Fixture::new(4, &[1, 3]);
        let plugin = fixture.plugin();
        let request = fixture.request();
        let before = fixture.kernel.link(&fixture.host_path(), "eth0v1").unwrap();

        let result = plugin.attach(&request).await.unwrap();
        assert_eq!(result.ip4.unwrap().ip, "10.56.217.5/24".parse::<IpNet>().unwrap());
        let inside = fixture.kernel.link(&fixture.container_path(), "net1").unwrap();
        assert_eq!(inside.index, before.index);
        assert_eq!(inside.vf, Some(VfIndex(1)));
        assert!(inside.up);
        assert!(!fixture.sysfs.inventory().is_free(&request.master, VfIndex(1)));
        assert_eq!(published(&fixture), ("1".to_string(), "true".to_string()));

        plugin.detach(&request).await.unwrap();
        let after = fixture.kernel.link(&fixture.host_path(), "eth0v1").unwrap();
        assert_eq!(after.index, before.index);
        assert!(!after.up);
        assert!(fixture.kernel.link(&fixture.container_path(), "net1").is_none());
        assert!(fixture.sysfs.inventory().is_free(&request.master, VfIndex(1)));
        assert_eq!(fixture.ipam.adds(), 1);
        assert_eq!(fixture.ipam.dels(), 1);
        assert_eq!(published(&fixture), ("2".to_string(), "true".to_string()));
    }

    #[tokio::test]
    async fn explicit_vf_is_used() {
        let fixture = Fixture::new(4, &[0, 2]);
        let mut request = fixture.request();
        request.vf = Some(VfIndex(2));
        fixture.plugin().attach(&request).await.unwrap();
        let inside = fixture.kernel.link(&fixture.container_path(), "net1").unwrap();
        assert_eq!(inside.vf, Some(VfIndex(2)));
        assert!(fixture.sysfs.inventory().is_free(&request.master, VfIndex(0)));
    }

    #[tokio::test]
    async fn busy_explicit_vf_is_not_found() {
        let fixture = Fixture::new(4, &[0]);
        let mut request = fixture.request();
        request.vf = Some(VfIndex(2));
        let err = fixture.plugin().attach(&request).await.unwrap_err();
        assert_eq!(err.code(), 100);
        assert!(matches!(
            err,
            PluginError::Attach {
                completed: AttachState::ParsedRequest,
                source: SriovError::DeviceNotFound(_),
            }
        ));
        assert_eq!(fixture.kernel.mutations(), 0);
    }

    #[tokio::test]
    async fn exhausted_device_has_no_free_vf() {
        let fixture = Fixture::new(2, &[]);
        let err = fixture.plugin().attach(&fixture.request()).await.unwrap_err();
        assert_eq!(err.code(), 102);
    }

    #[tokio::test]
    async fn pf_only_refuses_identity_changes_untouched() {
        let fixture = Fixture::new(2, &[0]);
        let mut request = fixture.request();
        request.pf_only = true;
        request.vlan = Some(Vid::new(10).unwrap());
        let err = fixture.plugin().attach(&request).await.unwrap_err();
        assert_eq!(err.code(), 104);
        assert_eq!(fixture.kernel.mutations(), 0);
        assert_eq!(fixture.ipam.adds(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn pf_only_moves_the_physical_function() {
        let fixture = Fixture::new(2, &[0]);
        let mut request = fixture.request();
        request.pf_only = true;
        request.tx_rate = Some(TxRate(100));
        let plugin = fixture.plugin();

        plugin.attach(&request).await.unwrap();
        assert!(fixture.kernel.link(&fixture.host_path(), "eth0").is_none());
        assert!(fixture.kernel.link(&fixture.container_path(), "net1").is_some());
        assert!(fixture.kernel.vf_attributes().is_empty());
        assert!(fixture.cluster.last_replaced().is_none());
        assert!(logs_contain("ignoring tx rate 100 Mbps"));

        plugin.detach(&request).await.unwrap();
        assert!(fixture.kernel.link(&fixture.host_path(), "eth0").is_some());
        assert!(fixture.cluster.last_replaced().is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn workload_override_wins() {
        let fixture = Fixture::new(2, &[0]);
        let mut request = fixture.request();
        request.vlan = Some(Vid::new(10).unwrap());
        fixture.cluster.set_pod_annotation(VLAN_ANNOTATION, "20");
        fixture.plugin().attach(&request).await.unwrap();
        assert_eq!(fixture.kernel.vf_vlan(VfIndex(0)), Some(Vid::new(20).unwrap()));
        assert!(logs_contain("applied workload vlan override 20"));
    }

    #[tokio::test]
    #[traced_test]
    async fn untagged_override_clears_configured_vlan() {
        let fixture = Fixture::new(2, &[0]);
        let mut request = fixture.request();
        request.vlan = Some(Vid::new(10).unwrap());
        fixture.cluster.set_pod_annotation(VLAN_ANNOTATION, "0");
        fixture.plugin().attach(&request).await.unwrap();
        assert_eq!(fixture.kernel.vf_vlan(VfIndex(0)), None);
        assert!(logs_contain("applied workload vlan override untagged"));
    }

    #[tokio::test]
    async fn attach_of_one_of_two_free_vfs_publishes_the_rest() {
        let fixture = Fixture::new(4, &[0, 2]);
        let mut request = fixture.request();
        request.vf = Some(VfIndex(0));
        fixture.plugin().attach(&request).await.unwrap();
        let inside = fixture.kernel.link(&fixture.container_path(), "net1").unwrap();
        assert_eq!(inside.vf, Some(VfIndex(0)));
        assert_eq!(fixture.sysfs.inventory().free_count(&request.master, 4), 1);
        assert_eq!(published(&fixture), ("1".to_string(), "true".to_string()));
    }

    #[tokio::test]
    async fn ipam_failure_leaves_device_in_workload() {
        let fixture = Fixture::new(2, &[0]);
        fixture.ipam.fail_add();
        let err = fixture.plugin().attach(&fixture.request()).await.unwrap_err();
        assert!(matches!(
            err,
            PluginError::Attach {
                completed: AttachState::Migrated,
                source: SriovError::Ipam(_),
            }
        ));
        assert_eq!(err.code(), 107);
        assert!(fixture.kernel.link(&fixture.container_path(), "net1").is_some());
        assert!(fixture.cluster.last_replaced().is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn publish_failure_does_not_fail_attach() {
        let fixture = Fixture::new(2, &[0]);
        fixture.cluster.conflict_on_replace();
        fixture.plugin().attach(&fixture.request()).await.unwrap();
        assert!(logs_contain("failed to publish free vfs of eth0"));
    }

    #[tokio::test]
    async fn detach_of_vanished_namespace_is_a_no_op() {
        let fixture = Fixture::new(2, &[0]);
        let plugin = fixture.plugin();
        let mut request = fixture.request();
        request.netns = Some(PathBuf::from("/nonexistent/netns/web-0"));
        plugin.detach(&request).await.unwrap();
        request.netns = None;
        plugin.detach(&request).await.unwrap();
        assert_eq!(fixture.ipam.dels(), 0);
        assert!(fixture.cluster.last_replaced().is_none());
    }

    #[tokio::test]
    async fn second_detach_only_releases_addresses() {
        let fixture = Fixture::new(2, &[0]);
        let plugin = fixture.plugin();
        let request = fixture.request();
        plugin.attach(&request).await.unwrap();
        plugin.detach(&request).await.unwrap();
        let mutations = fixture.kernel.mutations();

        plugin.detach(&request).await.unwrap();
        assert_eq!(fixture.kernel.mutations(), mutations);
        assert_eq!(fixture.ipam.dels(), 2);
        assert!(fixture.sysfs.inventory().is_free(&request.master, VfIndex(0)));
    }

    #[tokio::test]
    #[traced_test]
    async fn taken_host_name_falls_back_to_index() {
        let fixture = Fixture::new(2, &[0]);
        let plugin = fixture.plugin();
        let request = fixture.request();
        plugin.attach(&request).await.unwrap();
        let index = fixture
            .kernel
            .link(&fixture.container_path(), "net1")
            .unwrap()
            .index;
        fixture.kernel.add_link(&fixture.host_path(), "eth0v0", None);

        plugin.detach(&request).await.unwrap();
        let back = fixture
            .kernel
            .link(&fixture.host_path(), &format!("dev{index}"))
            .unwrap();
        assert_eq!(back.vf, Some(VfIndex(0)));
        assert!(logs_contain("is taken by"));
    }
}
