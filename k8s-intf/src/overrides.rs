// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{ClusterError, TX_RATE_ANNOTATION, VLAN_ANNOTATION};
use net::vf::TxRate;
use net::vlan::VlanTag;
use std::collections::BTreeMap;
use std::str::FromStr;

/// VF attributes a workload asks for through its own annotations.
///
/// These take precedence over the values in the network configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadOverrides {
    /// [`VlanTag::Untagged`] clears a tag set by the network configuration.
    pub vlan: Option<VlanTag>,
    pub tx_rate: Option<TxRate>,
}

impl WorkloadOverrides {
    /// Extract overrides from pod annotations.  Missing or empty annotations mean no override.
    ///
    /// # Errors
    ///
    /// [`ClusterError::InvalidOverride`] if an annotation is present but unparsable.
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Result<Self, ClusterError> {
        Ok(Self {
            vlan: parse(annotations, VLAN_ANNOTATION)?,
            tx_rate: parse(annotations, TX_RATE_ANNOTATION)?,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vlan.is_none() && self.tx_rate.is_none()
    }
}

fn parse<T>(annotations: &BTreeMap<String, String>, key: &'static str) -> Result<Option<T>, ClusterError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match annotations.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ClusterError::InvalidOverride {
                key,
                value: value.to_string(),
                reason: e.to_string(),
            }),
    }
}
