// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::link::{Link, LinkControl, LinkError, Route, VfAttribute};
use crate::netns::NetNs;
use futures::TryStreamExt;
use ipnet::IpNet;
use net::interface::{InterfaceIndex, InterfaceName};
use net::vf::VfIndex;
use nix::errno::Errno;
use rtnetlink::packet_route::link::{
    LinkAttribute, LinkFlags, LinkMessage, LinkVfInfo, VfInfo, VfInfoMac, VfInfoTxRate,
    VfInfoVlan,
};
use rtnetlink::{Handle, LinkUnspec, RouteMessageBuilder};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::os::fd::AsRawFd;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// rtnetlink access to the network namespace of the thread which created it.
///
/// Must be created from within a tokio runtime; the netlink connection is driven by a task on
/// that runtime and is aborted on drop.
#[derive(Debug)]
pub struct Netlink {
    handle: Handle,
    connection: JoinHandle<()>,
}

impl Netlink {
    /// Open a netlink connection in the calling thread's network namespace.
    ///
    /// # Errors
    ///
    /// [`LinkError::Connect`] if the socket can not be opened.
    pub fn connect() -> Result<Self, LinkError> {
        let (connection, handle, _) = rtnetlink::new_connection().map_err(LinkError::Connect)?;
        let connection = tokio::spawn(connection);
        Ok(Self { handle, connection })
    }

    fn link_from_message(message: &LinkMessage) -> Result<Link, LinkError> {
        let index = InterfaceIndex::try_new(message.header.index).map_err(|e| {
            LinkError::Failed {
                op: "decode link message".to_string(),
                reason: e.to_string(),
            }
        })?;
        let name = message
            .attributes
            .iter()
            .find_map(|attr| match attr {
                LinkAttribute::IfName(name) => Some(name.as_str()),
                _ => None,
            })
            .ok_or_else(|| LinkError::Failed {
                op: "decode link message".to_string(),
                reason: format!("link {index} has no name"),
            })
            .and_then(|name| {
                InterfaceName::try_from(name).map_err(|e| LinkError::Failed {
                    op: "decode link message".to_string(),
                    reason: e.to_string(),
                })
            })?;
        let alias = message.attributes.iter().find_map(|attr| match attr {
            LinkAttribute::IfAlias(alias) if !alias.is_empty() => Some(alias.clone()),
            _ => None,
        });
        Ok(Link {
            index,
            name,
            up: message.header.flags.contains(LinkFlags::Up),
            alias,
        })
    }

    async fn set(&self, op: impl FnOnce() -> String, message: LinkMessage) -> Result<(), LinkError> {
        self.handle
            .link()
            .set(message)
            .execute()
            .await
            .map_err(|source| LinkError::Netlink { op: op(), source })
    }
}

impl Drop for Netlink {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

fn is_no_such_device(err: &rtnetlink::Error) -> bool {
    match err {
        rtnetlink::Error::NetlinkError(message) => {
            let code = message.raw_code();
            code == -(Errno::ENODEV as i32) || code == -(Errno::ENOENT as i32)
        }
        _ => false,
    }
}

impl LinkControl for Netlink {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, name: &InterfaceName) -> Result<Link, LinkError> {
        let response = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute()
            .try_next()
            .await;
        match response {
            Ok(Some(message)) => Self::link_from_message(&message),
            Ok(None) => Err(LinkError::NotFound(name.clone())),
            Err(err) if is_no_such_device(&err) => Err(LinkError::NotFound(name.clone())),
            Err(source) => Err(LinkError::Netlink {
                op: format!("look up {name}"),
                source,
            }),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(link = %link))]
    async fn set_up(&self, link: &Link) -> Result<(), LinkError> {
        self.set(
            || format!("bring {link} up"),
            LinkUnspec::new_with_index(link.index.to_u32()).up().build(),
        )
        .await?;
        info!("{link} is up");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(link = %link))]
    async fn set_down(&self, link: &Link) -> Result<(), LinkError> {
        self.set(
            || format!("bring {link} down"),
            LinkUnspec::new_with_index(link.index.to_u32()).down().build(),
        )
        .await?;
        info!("{link} is down");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(link = %link))]
    async fn rename(&self, link: &Link, name: &InterfaceName) -> Result<(), LinkError> {
        self.set(
            || format!("rename {link} to {name}"),
            LinkUnspec::new_with_index(link.index.to_u32())
                .name(name.to_string())
                .build(),
        )
        .await?;
        info!("renamed {link} to {name}");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(link = %link))]
    async fn set_alias(&self, link: &Link, alias: &str) -> Result<(), LinkError> {
        let mut message = LinkUnspec::new_with_index(link.index.to_u32()).build();
        message
            .attributes
            .push(LinkAttribute::IfAlias(alias.to_string()));
        self.set(|| format!("set alias of {link} to {alias}"), message)
            .await?;
        debug!("set alias of {link} to {alias}");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, netns), fields(link = %link, netns = %netns))]
    async fn move_to(&self, link: &Link, netns: &NetNs) -> Result<(), LinkError> {
        self.set(
            || format!("move {link} to {netns}"),
            LinkUnspec::new_with_index(link.index.to_u32())
                .setns_by_fd(netns.as_raw_fd())
                .build(),
        )
        .await?;
        info!("moved {link} to {netns}");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(pf = %pf))]
    async fn set_vf(&self, pf: &Link, vf: VfIndex, attribute: VfAttribute) -> Result<(), LinkError> {
        let vf_id = vf.as_u32();
        let info = match attribute {
            VfAttribute::Mac(mac) => VfInfo::Mac(VfInfoMac::new(vf_id, mac.as_ref())),
            VfAttribute::Vlan(vid) => VfInfo::Vlan(VfInfoVlan::new(
                vf_id,
                vid.map_or(0, |vid| u32::from(vid.as_u16())),
                0,
            )),
            VfAttribute::TxRate(rate) => VfInfo::TxRate(VfInfoTxRate::new(vf_id, rate.mbps())),
        };
        let mut message = LinkUnspec::new_with_index(pf.index.to_u32()).build();
        message
            .attributes
            .push(LinkAttribute::VfInfoList(vec![LinkVfInfo(vec![info])]));
        self.set(|| format!("set {attribute} on {pf} vf {vf}"), message)
            .await?;
        debug!("set {attribute} on {pf} vf {vf}");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(link = %link))]
    async fn add_address(&self, link: &Link, address: IpNet) -> Result<(), LinkError> {
        self.handle
            .address()
            .add(link.index.to_u32(), address.addr(), address.prefix_len())
            .execute()
            .await
            .map_err(|source| LinkError::Netlink {
                op: format!("add {address} to {link}"),
                source,
            })?;
        info!("added {address} to {link}");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(link = %link, route = %route))]
    async fn add_route(&self, link: &Link, route: &Route) -> Result<(), LinkError> {
        let mismatch = || LinkError::Failed {
            op: format!("add route {route}"),
            reason: "gateway and destination differ in address family".to_string(),
        };
        let index = link.index.to_u32();
        let message = match route.dst.trunc() {
            IpNet::V4(dst) => {
                let builder = RouteMessageBuilder::<Ipv4Addr>::new()
                    .destination_prefix(dst.addr(), dst.prefix_len())
                    .output_interface(index);
                match route.gateway {
                    None => builder.build(),
                    Some(IpAddr::V4(gw)) => builder.gateway(gw).build(),
                    Some(IpAddr::V6(_)) => return Err(mismatch()),
                }
            }
            IpNet::V6(dst) => {
                let builder = RouteMessageBuilder::<Ipv6Addr>::new()
                    .destination_prefix(dst.addr(), dst.prefix_len())
                    .output_interface(index);
                match route.gateway {
                    None => builder.build(),
                    Some(IpAddr::V6(gw)) => builder.gateway(gw).build(),
                    Some(IpAddr::V4(_)) => return Err(mismatch()),
                }
            }
        };
        self.handle
            .route()
            .add(message)
            .execute()
            .await
            .map_err(|source| LinkError::Netlink {
                op: format!("add route {route} via {link}"),
                source,
            })?;
        info!("added route {route} via {link}");
        Ok(())
    }
}
