// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory stand-ins for the kernel, the cluster and the IPAM plugin.
//!
//! The fake kernel keeps the fake sysfs tree consistent with its links: a virtual function is
//! listed as free exactly while its device sits in the host namespace.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use crate::ipam::{Ipam, IpamError};
use crate::plugin::{EnterNamespace, Plugin};
use crate::request::{AttachmentRequest, PodRef};
use args::{ErrorPayload, IpConfig, LegacyResult, RouteEntry};
use interface_manager::{Link, LinkControl, LinkError, NetNs, Route, VfAttribute};
use ipnet::IpNet;
use k8s_intf::{ClusterClient, ClusterError, Node};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use net::interface::{InterfaceIndex, InterfaceName};
use net::vf::{TxRate, VfIndex};
use net::vlan::Vid;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use sysfs::testing::FakeSysfs;
use tempfile::NamedTempFile;

/// One network device as the fake kernel sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeLink {
    pub index: u32,
    pub netns: PathBuf,
    pub name: String,
    pub up: bool,
    pub alias: Option<String>,
    pub vf: Option<VfIndex>,
}

#[derive(Debug, Default, Clone, Copy)]
struct VfState {
    vlan: Option<Vid>,
    tx_rate: TxRate,
}

#[derive(Debug, Default)]
struct KernelState {
    links: BTreeMap<u32, FakeLink>,
    next_index: u32,
    vfs: BTreeMap<VfIndex, VfState>,
    vf_log: Vec<(VfIndex, VfAttribute)>,
    addresses: Vec<(String, IpNet)>,
    routes: Vec<(String, Route)>,
    mutations: usize,
    refused: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct FakeKernel {
    state: Rc<RefCell<KernelState>>,
    sysfs: Rc<FakeSysfs>,
    host: PathBuf,
}

impl FakeKernel {
    fn new(sysfs: Rc<FakeSysfs>, host: &Path) -> Self {
        Self {
            state: Rc::new(RefCell::new(KernelState {
                next_index: 2,
                ..Default::default()
            })),
            sysfs,
            host: host.to_path_buf(),
        }
    }

    /// Create a link named `name` in `netns`.  A virtual function created on the host is free.
    pub fn add_link(&self, netns: &Path, name: &str, vf: Option<VfIndex>) -> InterfaceName {
        let mut state = self.state.borrow_mut();
        let index = state.next_index;
        state.next_index += 1;
        state.links.insert(
            index,
            FakeLink {
                index,
                netns: netns.to_path_buf(),
                name: name.to_string(),
                up: false,
                alias: None,
                vf,
            },
        );
        if let Some(vf) = vf
            && netns == self.host
        {
            self.sysfs.attach_vf(vf, name);
        }
        InterfaceName::try_from(name).unwrap()
    }

    pub fn link(&self, netns: &Path, name: &str) -> Option<FakeLink> {
        self.state
            .borrow()
            .links
            .values()
            .find(|link| link.netns == netns && link.name == name)
            .cloned()
    }

    /// Make every operation named `op` fail, e.g. `"mac"`, `"vlan-clear"` or `"move"`.
    pub fn refuse(&self, op: &str) {
        self.state.borrow_mut().refused.insert(op.to_string());
    }

    /// Number of state changing operations which succeeded.
    pub fn mutations(&self) -> usize {
        self.state.borrow().mutations
    }

    pub fn vf_vlan(&self, vf: VfIndex) -> Option<Vid> {
        self.state.borrow().vfs.get(&vf).and_then(|state| state.vlan)
    }

    pub fn vf_tx_rate(&self, vf: VfIndex) -> TxRate {
        self.state
            .borrow()
            .vfs
            .get(&vf)
            .map(|state| state.tx_rate)
            .unwrap_or_default()
    }

    /// Every virtual function attribute written, in order.
    pub fn vf_attributes(&self) -> Vec<(VfIndex, VfAttribute)> {
        self.state.borrow().vf_log.clone()
    }

    pub fn addresses(&self, name: &str) -> Vec<IpNet> {
        self.state
            .borrow()
            .addresses
            .iter()
            .filter(|(link, _)| link == name)
            .map(|(_, address)| *address)
            .collect()
    }

    pub fn routes(&self, name: &str) -> Vec<Route> {
        self.state
            .borrow()
            .routes
            .iter()
            .filter(|(link, _)| link == name)
            .map(|(_, route)| *route)
            .collect()
    }

    fn check(&self, op: &str) -> Result<(), LinkError> {
        if self.state.borrow().refused.contains(op) {
            return Err(LinkError::Failed {
                op: op.to_string(),
                reason: "refused by fake kernel".to_string(),
            });
        }
        Ok(())
    }

    /// Apply `change` to the link `link` refers to, provided it lives in `netns`.
    fn modify(
        &self,
        netns: &Path,
        op: &str,
        link: &Link,
        change: impl FnOnce(&mut FakeLink, &Self) -> Result<(), LinkError>,
    ) -> Result<(), LinkError> {
        self.check(op)?;
        let mut current = self
            .state
            .borrow()
            .links
            .get(&link.index.to_u32())
            .filter(|fake| fake.netns == netns)
            .cloned()
            .ok_or_else(|| LinkError::NotFound(link.name.clone()))?;
        change(&mut current, self)?;
        let mut state = self.state.borrow_mut();
        state.links.insert(current.index, current);
        state.mutations += 1;
        Ok(())
    }

    fn name_taken(&self, netns: &Path, name: &str) -> bool {
        self.link(netns, name).is_some()
    }
}

/// The links of one namespace of a [`FakeKernel`].
#[derive(Debug, Clone)]
pub struct FakeLinks {
    kernel: FakeKernel,
    netns: PathBuf,
}

impl LinkControl for FakeLinks {
    async fn get(&self, name: &InterfaceName) -> Result<Link, LinkError> {
        let fake = self
            .kernel
            .link(&self.netns, name.as_str())
            .ok_or_else(|| LinkError::NotFound(name.clone()))?;
        Ok(Link {
            index: InterfaceIndex::try_new(fake.index).unwrap(),
            name: name.clone(),
            up: fake.up,
            alias: fake.alias,
        })
    }

    async fn set_up(&self, link: &Link) -> Result<(), LinkError> {
        self.kernel.modify(&self.netns, "up", link, |fake, _| {
            fake.up = true;
            Ok(())
        })
    }

    async fn set_down(&self, link: &Link) -> Result<(), LinkError> {
        self.kernel.modify(&self.netns, "down", link, |fake, _| {
            fake.up = false;
            Ok(())
        })
    }

    async fn rename(&self, link: &Link, name: &InterfaceName) -> Result<(), LinkError> {
        let netns = self.netns.clone();
        self.kernel.modify(&self.netns, "rename", link, |fake, kernel| {
            if kernel.name_taken(&netns, name.as_str()) {
                return Err(LinkError::Failed {
                    op: format!("rename {link} to {name}"),
                    reason: "name in use".to_string(),
                });
            }
            fake.name = name.to_string();
            if let Some(vf) = fake.vf
                && netns == kernel.host
            {
                kernel.sysfs.detach_vf(vf);
                kernel.sysfs.attach_vf(vf, name.as_str());
            }
            Ok(())
        })
    }

    async fn set_alias(&self, link: &Link, alias: &str) -> Result<(), LinkError> {
        self.kernel.modify(&self.netns, "alias", link, |fake, _| {
            fake.alias = Some(alias.to_string());
            Ok(())
        })
    }

    async fn move_to(&self, link: &Link, netns: &NetNs) -> Result<(), LinkError> {
        let target = netns.path().to_path_buf();
        self.kernel.modify(&self.netns, "move", link, |fake, kernel| {
            if kernel.name_taken(&target, &fake.name) {
                return Err(LinkError::Failed {
                    op: format!("move {link} to {netns}"),
                    reason: "name in use".to_string(),
                });
            }
            if let Some(vf) = fake.vf {
                if fake.netns == kernel.host {
                    kernel.sysfs.detach_vf(vf);
                }
                if target == kernel.host {
                    kernel.sysfs.attach_vf(vf, &fake.name);
                }
            }
            fake.netns = target.clone();
            fake.up = false;
            Ok(())
        })
    }

    async fn set_vf(&self, pf: &Link, vf: VfIndex, attribute: VfAttribute) -> Result<(), LinkError> {
        let op = match attribute {
            VfAttribute::Mac(_) => "mac",
            VfAttribute::Vlan(None) => "vlan-clear",
            VfAttribute::Vlan(Some(_)) => "vlan",
            VfAttribute::TxRate(_) => "tx-rate",
        };
        self.kernel.modify(&self.netns, op, pf, |_, kernel| {
            let mut state = kernel.state.borrow_mut();
            let vf_state = state.vfs.entry(vf).or_default();
            match attribute {
                VfAttribute::Mac(_) => {}
                VfAttribute::Vlan(vid) => vf_state.vlan = vid,
                VfAttribute::TxRate(rate) => vf_state.tx_rate = rate,
            }
            state.vf_log.push((vf, attribute));
            Ok(())
        })
    }

    async fn add_address(&self, link: &Link, address: IpNet) -> Result<(), LinkError> {
        self.kernel.modify(&self.netns, "address", link, |fake, kernel| {
            kernel
                .state
                .borrow_mut()
                .addresses
                .push((fake.name.clone(), address));
            Ok(())
        })
    }

    async fn add_route(&self, link: &Link, route: &Route) -> Result<(), LinkError> {
        self.kernel.modify(&self.netns, "route", link, |fake, kernel| {
            kernel
                .state
                .borrow_mut()
                .routes
                .push((fake.name.clone(), *route));
            Ok(())
        })
    }
}

/// Serves any namespace from the same [`FakeKernel`].
#[derive(Debug, Clone)]
pub struct FakeNamespaces {
    kernel: FakeKernel,
}

impl EnterNamespace for FakeNamespaces {
    type Links = FakeLinks;

    async fn enter(&self, netns: &NetNs) -> Result<FakeLinks, crate::error::SriovError> {
        Ok(FakeLinks {
            kernel: self.kernel.clone(),
            netns: netns.path().to_path_buf(),
        })
    }
}

#[derive(Debug)]
struct ClusterState {
    node: Node,
    replaced: Vec<Node>,
    attempts: usize,
    pod_annotations: BTreeMap<String, String>,
    fail_pod_lookup: bool,
    conflict: bool,
}

#[derive(Debug, Clone)]
pub struct FakeCluster {
    state: Rc<RefCell<ClusterState>>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        Self {
            state: Rc::new(RefCell::new(ClusterState {
                node,
                replaced: Vec::new(),
                attempts: 0,
                pod_annotations: BTreeMap::new(),
                fail_pod_lookup: false,
                conflict: false,
            })),
        }
    }
}

impl FakeCluster {
    pub fn set_pod_annotation(&self, key: &str, value: &str) {
        self.state
            .borrow_mut()
            .pod_annotations
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_node_label(&self, key: &str, value: &str) {
        self.state
            .borrow_mut()
            .node
            .metadata
            .labels
            .get_or_insert_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn fail_pod_lookup(&self) {
        self.state.borrow_mut().fail_pod_lookup = true;
    }

    pub fn conflict_on_replace(&self) {
        self.state.borrow_mut().conflict = true;
    }

    pub fn last_replaced(&self) -> Option<Node> {
        self.state.borrow().replaced.last().cloned()
    }

    pub fn replace_attempts(&self) -> usize {
        self.state.borrow().attempts
    }
}

impl ClusterClient for FakeCluster {
    async fn current_node(&self) -> Result<Node, ClusterError> {
        Ok(self.state.borrow().node.clone())
    }

    async fn replace_node(&self, node: &Node) -> Result<(), ClusterError> {
        let mut state = self.state.borrow_mut();
        state.attempts += 1;
        if state.conflict {
            return Err(ClusterError::Conflict(
                node.metadata.name.clone().unwrap_or_default(),
            ));
        }
        state.node = node.clone();
        state.replaced.push(node.clone());
        Ok(())
    }

    async fn pod_annotations(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, ClusterError> {
        let state = self.state.borrow();
        if state.fail_pod_lookup {
            return Err(ClusterError::PodNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        Ok(state.pod_annotations.clone())
    }
}

#[derive(Debug)]
struct IpamState {
    result: LegacyResult,
    adds: usize,
    dels: usize,
    fail_add: bool,
}

#[derive(Debug, Clone)]
pub struct FakeIpam {
    state: Rc<RefCell<IpamState>>,
}

impl Default for FakeIpam {
    fn default() -> Self {
        let result = LegacyResult {
            ip4: Some(IpConfig {
                ip: "10.56.217.5/24".parse().unwrap(),
                gateway: Some("10.56.217.1".parse().unwrap()),
                routes: vec![RouteEntry {
                    dst: "0.0.0.0/0".parse().unwrap(),
                    gw: None,
                }],
            }),
            ..Default::default()
        };
        Self {
            state: Rc::new(RefCell::new(IpamState {
                result,
                adds: 0,
                dels: 0,
                fail_add: false,
            })),
        }
    }
}

impl FakeIpam {
    pub fn fail_add(&self) {
        self.state.borrow_mut().fail_add = true;
    }

    pub fn adds(&self) -> usize {
        self.state.borrow().adds
    }

    pub fn dels(&self) -> usize {
        self.state.borrow().dels
    }
}

impl Ipam for FakeIpam {
    async fn add(&self) -> Result<LegacyResult, IpamError> {
        let mut state = self.state.borrow_mut();
        state.adds += 1;
        if state.fail_add {
            return Err(IpamError::Plugin(ErrorPayload {
                cni_version: "0.2.0".to_string(),
                code: 11,
                msg: "pool exhausted".to_string(),
                details: None,
            }));
        }
        Ok(state.result.clone())
    }

    async fn del(&self) -> Result<(), IpamError> {
        self.state.borrow_mut().dels += 1;
        Ok(())
    }
}

/// A host with physical function `eth0`, `total` virtual functions of which `free` are in the
/// host namespace as `eth0v<N>`, an empty container namespace, a cluster and an IPAM plugin.
pub struct Fixture {
    pub sysfs: Rc<FakeSysfs>,
    pub kernel: FakeKernel,
    pub cluster: FakeCluster,
    pub ipam: FakeIpam,
    host: NamedTempFile,
    container: NamedTempFile,
}

impl Fixture {
    pub fn new(total: u32, free: &[u32]) -> Self {
        let sysfs = Rc::new(FakeSysfs::new("eth0", total));
        let host = NamedTempFile::new().unwrap();
        let container = NamedTempFile::new().unwrap();
        let kernel = FakeKernel::new(sysfs.clone(), host.path());
        kernel.add_link(host.path(), "eth0", None);
        for &vf in free {
            kernel.add_link(host.path(), &format!("eth0v{vf}"), Some(VfIndex(vf)));
        }
        Self {
            sysfs,
            kernel,
            cluster: FakeCluster::default(),
            ipam: FakeIpam::default(),
            host,
            container,
        }
    }

    pub fn host_path(&self) -> PathBuf {
        self.host.path().to_path_buf()
    }

    pub fn container_path(&self) -> PathBuf {
        self.container.path().to_path_buf()
    }

    pub fn host_netns(&self) -> NetNs {
        NetNs::open(self.host.path()).unwrap()
    }

    pub fn container_netns(&self) -> NetNs {
        NetNs::open(self.container.path()).unwrap()
    }

    pub fn host_links(&self) -> FakeLinks {
        FakeLinks {
            kernel: self.kernel.clone(),
            netns: self.host_path(),
        }
    }

    pub fn container_links(&self) -> FakeLinks {
        FakeLinks {
            kernel: self.kernel.clone(),
            netns: self.container_path(),
        }
    }

    /// The physical function as seen on the host.
    pub fn pf(&self) -> Link {
        let fake = self.kernel.link(self.host.path(), "eth0").unwrap();
        Link {
            index: InterfaceIndex::try_new(fake.index).unwrap(),
            name: InterfaceName::try_from("eth0").unwrap(),
            up: fake.up,
            alias: fake.alias,
        }
    }

    /// Attach any free virtual function as `net1` for pod `default/web-0`.
    pub fn request(&self) -> AttachmentRequest {
        AttachmentRequest {
            master: InterfaceName::try_from("eth0").unwrap(),
            pf_only: false,
            ifname: InterfaceName::try_from("net1").unwrap(),
            netns: Some(self.container_path()),
            vf: None,
            mac: None,
            vlan: None,
            tx_rate: None,
            pod: Some(PodRef {
                namespace: "default".to_string(),
                name: "web-0".to_string(),
            }),
        }
    }

    pub fn plugin(&self) -> Plugin<FakeLinks, FakeNamespaces, FakeCluster, FakeIpam> {
        Plugin::new(
            self.host_links(),
            FakeNamespaces {
                kernel: self.kernel.clone(),
            },
            self.host_netns(),
            self.sysfs.inventory(),
            Some(self.cluster.clone()),
            self.ipam.clone(),
        )
    }
}
