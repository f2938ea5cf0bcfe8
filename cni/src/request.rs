// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use args::{CniArgs, NetConf};
use net::eth::Mac;
use net::interface::InterfaceName;
use net::vf::{TxRate, VfIndex};
use net::vlan::Vid;
use std::path::PathBuf;

/// The workload a device is attached for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

/// One attach or detach, parsed once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRequest {
    /// The physical function.
    pub master: InterfaceName,
    pub pf_only: bool,
    /// Interface name inside the container.
    pub ifname: InterfaceName,
    /// Target namespace.  Absent on a detach for a namespace which is already gone.
    pub netns: Option<PathBuf>,
    pub vf: Option<VfIndex>,
    pub mac: Option<Mac>,
    pub vlan: Option<Vid>,
    pub tx_rate: Option<TxRate>,
    pub pod: Option<PodRef>,
}

impl AttachmentRequest {
    /// Merge the network configuration with `CNI_ARGS`; the latter wins for `VF`, `VLAN` and
    /// `MAC`.
    #[must_use]
    pub fn new(
        conf: &NetConf,
        args: &CniArgs,
        ifname: InterfaceName,
        netns: Option<PathBuf>,
    ) -> Self {
        Self {
            master: conf.master.clone(),
            pf_only: conf.pf_only,
            ifname,
            netns,
            vf: args.vf.or(conf.vf),
            mac: args.mac.or(conf.mac),
            vlan: args.vlan.or(conf.vlan),
            tx_rate: conf.tx_rate,
            pod: args.pod().map(|(namespace, name)| PodRef {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }
}
