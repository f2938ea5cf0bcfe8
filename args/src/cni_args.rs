// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::ArgsError;
use net::eth::Mac;
use net::vf::VfIndex;
use net::vlan::{Vid, VlanTag};
use std::net::IpAddr;
use std::str::FromStr;

/// The `K=V;K=V` arguments passed in `CNI_ARGS`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CniArgs {
    pub vf: Option<VfIndex>,
    pub vlan: Option<Vid>,
    pub mac: Option<Mac>,
    pub pod_namespace: Option<String>,
    pub pod_name: Option<String>,
    pub infra_container_id: Option<String>,
    pub ip: Option<IpAddr>,
    pub ignore_unknown: bool,
}

fn invalid(key: &str, value: &str, reason: impl std::fmt::Display) -> ArgsError {
    ArgsError::InvalidCniArgs(format!("{key}={value}: {reason}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ArgsError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl CniArgs {
    /// The requesting pod, if the runtime identified one.
    #[must_use]
    pub fn pod(&self) -> Option<(&str, &str)> {
        match (&self.pod_namespace, &self.pod_name) {
            (Some(namespace), Some(name)) => Some((namespace, name)),
            _ => None,
        }
    }
}

impl FromStr for CniArgs {
    type Err = ArgsError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let pairs = input
            .split(';')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                pair.split_once('=')
                    .ok_or_else(|| ArgsError::InvalidCniArgs(format!("'{pair}' is not K=V")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut args = CniArgs::default();
        if let Some((key, value)) = pairs.iter().find(|(key, _)| *key == "IgnoreUnknown") {
            args.ignore_unknown = parse_bool(key, value)?;
        }
        for (key, value) in pairs {
            match key {
                "IgnoreUnknown" => {}
                "VF" => args.vf = Some(value.parse().map_err(|e| invalid(key, value, e))?),
                "VLAN" => {
                    let tag: VlanTag = value.parse().map_err(|e| invalid(key, value, e))?;
                    args.vlan = tag.vid();
                }
                "MAC" => args.mac = Some(value.parse().map_err(|e| invalid(key, value, e))?),
                "IP" => args.ip = Some(value.parse().map_err(|e| invalid(key, value, e))?),
                "K8S_POD_NAMESPACE" => args.pod_namespace = non_empty(value),
                "K8S_POD_NAME" => args.pod_name = non_empty(value),
                "K8S_POD_INFRA_CONTAINER_ID" => args.infra_container_id = non_empty(value),
                _ if args.ignore_unknown => {}
                _ => return Err(invalid(key, value, "unknown key")),
            }
        }
        Ok(args)
    }
}
