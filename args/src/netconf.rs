// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{ArgsError, DEFAULT_VERSION, SUPPORTED_VERSIONS};
use net::eth::Mac;
use net::interface::InterfaceName;
use net::vf::{TxRate, VfIndex};
use net::vlan::{Vid, VlanTag};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Log verbosity selected by the network configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration of the delegated IPAM plugin.  Only `type` is interpreted here.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IpamConf {
    #[serde(rename = "type")]
    pub plugin: String,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// DNS settings passed through to the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Dns {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Dns {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nameservers.is_empty()
            && self.domain.as_deref().is_none_or(str::is_empty)
            && self.search.is_empty()
            && self.options.is_empty()
    }
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

/// The network configuration read from stdin.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetConf {
    #[serde(default = "default_version")]
    pub cni_version: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub plugin: String,
    /// The physical function.
    pub master: InterfaceName,
    #[serde(default)]
    pub pf_only: bool,
    #[serde(default)]
    pub vf: Option<VfIndex>,
    #[serde(default)]
    pub mac: Option<Mac>,
    /// `0` means untagged.
    #[serde(default, deserialize_with = "vlan_tag")]
    pub vlan: Option<Vid>,
    #[serde(default)]
    pub tx_rate: Option<TxRate>,
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    pub ipam: IpamConf,
    #[serde(default)]
    pub dns: Dns,
}

fn vlan_tag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vid>, D::Error> {
    match Option::<u16>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => VlanTag::try_from(raw)
            .map(VlanTag::vid)
            .map_err(serde::de::Error::custom),
    }
}

impl NetConf {
    /// Decode and validate a network configuration.
    ///
    /// Malformed JSON is a decode error; well-formed JSON with missing or illegal values is an
    /// invalid configuration.
    pub fn parse(bytes: &[u8]) -> Result<Self, ArgsError> {
        let conf: NetConf = serde_json::from_slice(bytes).map_err(|e| {
            if e.is_data() {
                ArgsError::InvalidConfig(e.to_string())
            } else {
                ArgsError::Decode(e)
            }
        })?;
        if !SUPPORTED_VERSIONS.contains(&conf.cni_version.as_str()) {
            return Err(ArgsError::IncompatibleVersion(conf.cni_version));
        }
        if conf.ipam.plugin.is_empty() {
            return Err(ArgsError::InvalidConfig("ipam.type is empty".to_string()));
        }
        Ok(conf)
    }
}
