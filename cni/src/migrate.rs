// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Moving a device between the host and a container namespace.
//!
//! Attach runs on the host side (`up`, `move`) and finishes inside the target namespace
//! (`rename`).  Detach runs entirely inside the target namespace (`down`, `rename`, `move` back).
//! Nothing is rolled back on failure.

use crate::error::SriovError;
use interface_manager::{Link, LinkControl, NetNs};
use net::interface::InterfaceName;
use tracing::{info, warn};

/// The deterministic host name of a device released from a container: `dev<ifindex>`.
pub fn fallback_host_name(link: &Link) -> Result<InterfaceName, SriovError> {
    InterfaceName::try_from(format!("dev{}", link.index))
        .map_err(|e| SriovError::InvalidState(format!("no host name for {link}: {e}")))
}

/// Move `device` from the host into `target` and give it the name `ifname` there.
///
/// With `remember` set, the device's host name is recorded in its alias first, so that detach
/// can restore it.
#[tracing::instrument(level = "debug", skip_all, fields(device = %device, target = %target))]
pub async fn attach<H: LinkControl, T: LinkControl>(
    host: &H,
    inside: &T,
    device: &Link,
    target: &NetNs,
    ifname: &InterfaceName,
    remember: bool,
) -> Result<Link, SriovError> {
    if remember && let Err(err) = host.set_alias(device, device.name.as_str()).await {
        warn!("failed to record host name of {device}: {err}");
    }
    host.set_up(device)
        .await
        .map_err(|e| SriovError::from_link(e, SriovError::Configuration))?;
    host.move_to(device, target)
        .await
        .map_err(|e| SriovError::from_link(e, SriovError::Namespace))?;
    let moved = inside
        .get(&device.name)
        .await
        .map_err(|e| SriovError::from_link(e, SriovError::Namespace))?;
    inside
        .rename(&moved, ifname)
        .await
        .map_err(|e| SriovError::from_link(e, SriovError::Namespace))?;
    info!("{} is now {ifname} in {target}", device.name);
    Ok(Link {
        name: ifname.clone(),
        ..moved
    })
}

/// Move `link` out of the namespace served by `inside` back to `host`, named `host_name`.
#[tracing::instrument(level = "debug", skip_all, fields(link = %link, host_name = %host_name))]
pub async fn detach<T: LinkControl>(
    inside: &T,
    link: &Link,
    host_name: &InterfaceName,
    host: &NetNs,
) -> Result<(), SriovError> {
    inside
        .set_down(link)
        .await
        .map_err(|e| SriovError::from_link(e, SriovError::Namespace))?;
    inside
        .rename(link, host_name)
        .await
        .map_err(|e| SriovError::from_link(e, SriovError::Namespace))?;
    let renamed = Link {
        name: host_name.clone(),
        ..link.clone()
    };
    inside
        .move_to(&renamed, host)
        .await
        .map_err(|e| SriovError::from_link(e, SriovError::Namespace))?;
    info!("{} returned to the host as {host_name}", link.name);
    Ok(())
}
