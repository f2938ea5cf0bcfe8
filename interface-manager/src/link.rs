// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::netns::NetNs;
use ipnet::IpNet;
use net::eth::Mac;
use net::interface::{InterfaceIndex, InterfaceName};
use net::vf::{TxRate, VfIndex};
use net::vlan::Vid;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;

/// A kernel network device as observed in some network namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Kernel `ifindex` (only unique within one namespace).
    pub index: InterfaceIndex,
    /// Current name.
    pub name: InterfaceName,
    /// Administrative state.
    pub up: bool,
    /// Free-form alias (`IFLA_IFALIAS`), if set.
    pub alias: Option<String>,
}

impl Display for Link {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (ifindex {})", self.name, self.index)
    }
}

/// A hardware attribute of a virtual function, written through its physical function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfAttribute {
    /// Hardware address.
    Mac(Mac),
    /// VLAN tag (`None` clears the tag).
    Vlan(Option<Vid>),
    /// Transmit rate ceiling ([`TxRate::UNLIMITED`] clears it).
    TxRate(TxRate),
}

impl Display for VfAttribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VfAttribute::Mac(mac) => write!(f, "mac {mac}"),
            VfAttribute::Vlan(Some(vid)) => write!(f, "vlan {vid}"),
            VfAttribute::Vlan(None) => write!(f, "vlan 0"),
            VfAttribute::TxRate(rate) => write!(f, "tx rate {rate}"),
        }
    }
}

/// A route via a link.  The gateway, if any, must be of the same family as the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Destination prefix.
    pub dst: IpNet,
    /// Next hop.
    pub gateway: Option<IpAddr>,
}

impl Display for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.gateway {
            Some(gw) => write!(f, "{} via {gw}", self.dst),
            None => write!(f, "{}", self.dst),
        }
    }
}

/// Errors which can occur while operating on links.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No link of that name exists in the namespace.
    #[error("no such interface: {0}")]
    NotFound(InterfaceName),
    /// Could not open a netlink socket.
    #[error("failed to open netlink connection: {0}")]
    Connect(std::io::Error),
    /// The kernel (or driver) refused a request.
    #[error("failed to {op}: {source}")]
    Netlink {
        /// what was attempted
        op: String,
        /// kernel error
        source: rtnetlink::Error,
    },
    /// The kernel answered with something we can not use.
    #[error("failed to {op}: {reason}")]
    Failed {
        /// what was attempted
        op: String,
        /// detail
        reason: String,
    },
    /// The namespace worker thread is no longer serving requests.
    #[error("namespace worker is gone")]
    WorkerGone,
}

/// Operations on the links of one network namespace.
pub trait LinkControl {
    /// Look up a link by name.
    fn get(&self, name: &InterfaceName) -> impl Future<Output = Result<Link, LinkError>>;

    /// Set a link administratively up.
    fn set_up(&self, link: &Link) -> impl Future<Output = Result<(), LinkError>>;

    /// Set a link administratively down.
    fn set_down(&self, link: &Link) -> impl Future<Output = Result<(), LinkError>>;

    /// Rename a link.  Most drivers refuse to rename a link which is up.
    fn rename(
        &self,
        link: &Link,
        name: &InterfaceName,
    ) -> impl Future<Output = Result<(), LinkError>>;

    /// Set the alias of a link.  The alias travels with the link across namespaces.
    fn set_alias(&self, link: &Link, alias: &str) -> impl Future<Output = Result<(), LinkError>>;

    /// Move a link into another network namespace.
    fn move_to(&self, link: &Link, netns: &NetNs) -> impl Future<Output = Result<(), LinkError>>;

    /// Write an attribute of virtual function `vf` through its physical function `pf`.
    fn set_vf(
        &self,
        pf: &Link,
        vf: VfIndex,
        attribute: VfAttribute,
    ) -> impl Future<Output = Result<(), LinkError>>;

    /// Add an address (with prefix length) to a link.
    fn add_address(&self, link: &Link, address: IpNet)
    -> impl Future<Output = Result<(), LinkError>>;

    /// Add a route via a link.
    fn add_route(&self, link: &Link, route: &Route) -> impl Future<Output = Result<(), LinkError>>;
}
