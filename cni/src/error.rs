// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::ipam::IpamError;
use args::ArgsError;
use interface_manager::{LinkError, NetnsError};
use k8s_intf::ClusterError;
use std::fmt::{Display, Formatter};
use sysfs::InventoryError;

/// Why an attach or detach step failed.
#[derive(Debug, thiserror::Error)]
pub enum SriovError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("invalid device state: {0}")]
    InvalidState(String),
    #[error("{0}")]
    NoFreeVf(String),
    #[error("configuration rejected: {0}")]
    Configuration(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("namespace error: {0}")]
    Namespace(String),
    #[error("cluster api error: {0}")]
    ClusterApi(#[from] ClusterError),
    #[error("ipam: {0}")]
    Ipam(#[from] IpamError),
}

impl SriovError {
    /// CNI error code, in the plugin-specific range.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            SriovError::DeviceNotFound(_) => 100,
            SriovError::InvalidState(_) => 101,
            SriovError::NoFreeVf(_) => 102,
            SriovError::Configuration(_) => 103,
            SriovError::UnsupportedOperation(_) => 104,
            SriovError::Namespace(_) => 105,
            SriovError::ClusterApi(_) => 106,
            SriovError::Ipam(_) => 107,
        }
    }

    /// Classify a link failure.  A missing link is always [`SriovError::DeviceNotFound`]; a dead
    /// namespace worker is a namespace problem; anything else gets `kind`.
    pub fn from_link(err: LinkError, kind: fn(String) -> SriovError) -> SriovError {
        match err {
            LinkError::NotFound(_) => SriovError::DeviceNotFound(err.to_string()),
            LinkError::WorkerGone => SriovError::Namespace(err.to_string()),
            err => kind(err.to_string()),
        }
    }
}

impl From<InventoryError> for SriovError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::DeviceNotFound { .. } | InventoryError::VfNotFound { .. } => {
                SriovError::DeviceNotFound(err.to_string())
            }
            InventoryError::InvalidState { .. } => SriovError::InvalidState(err.to_string()),
            InventoryError::NoFreeVf { .. } => SriovError::NoFreeVf(err.to_string()),
        }
    }
}

impl From<NetnsError> for SriovError {
    fn from(err: NetnsError) -> Self {
        SriovError::Namespace(err.to_string())
    }
}

/// Progress of an attach.  Each state names the last step which completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    ParsedRequest,
    DeviceAcquired,
    AttributesApplied,
    Migrated,
    AddressAssigned,
    Published,
}

/// Progress of a detach.  Each state names the last step which completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachState {
    ParsedRequest,
    Resolved,
    Migrated,
    AddressReleased,
    Published,
}

impl Display for AttachState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AttachState::ParsedRequest => "parsed request",
            AttachState::DeviceAcquired => "device acquired",
            AttachState::AttributesApplied => "attributes applied",
            AttachState::Migrated => "migrated",
            AttachState::AddressAssigned => "address assigned",
            AttachState::Published => "published",
        })
    }
}

impl Display for DetachState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DetachState::ParsedRequest => "parsed request",
            DetachState::Resolved => "resolved",
            DetachState::Migrated => "migrated",
            DetachState::AddressReleased => "address released",
            DetachState::Published => "published",
        })
    }
}

/// Everything that makes an invocation fail.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error(transparent)]
    Args(#[from] ArgsError),
    #[error("failed to prepare host access: {0}")]
    Setup(SriovError),
    #[error("attach failed after step '{completed}': {source}")]
    Attach {
        completed: AttachState,
        source: SriovError,
    },
    #[error("detach failed after step '{completed}': {source}")]
    Detach {
        completed: DetachState,
        source: SriovError,
    },
}

impl PluginError {
    /// CNI error code reported to the runtime.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            PluginError::Args(err) => err.code(),
            PluginError::Setup(source)
            | PluginError::Attach { source, .. }
            | PluginError::Detach { source, .. } => source.code(),
        }
    }

    /// The underlying cause, without the step context.
    #[must_use]
    pub fn details(&self) -> Option<String> {
        match self {
            PluginError::Args(_) => None,
            PluginError::Setup(source)
            | PluginError::Attach { source, .. }
            | PluginError::Detach { source, .. } => Some(source.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use net::interface::InterfaceName;
    use net::vf::VfIndex;
    use sysfs::VfUnavailable;

    #[test]
    fn inventory_errors_keep_their_kind() {
        let eth0 = InterfaceName::try_from("eth0").unwrap();
        let busy = SriovError::from(InventoryError::VfNotFound {
            device: eth0.clone(),
            vf: VfIndex(1),
            reason: VfUnavailable::DeviceCount { count: 0 },
        });
        assert_eq!(busy.code(), 100);
        let none = SriovError::from(InventoryError::NoFreeVf {
            device: eth0,
            total: 1,
        });
        assert!(matches!(none, SriovError::NoFreeVf(_)));
        assert_eq!(none.code(), 102);
    }

    #[test]
    fn link_errors_are_classified() {
        let missing = SriovError::from_link(
            LinkError::NotFound(InterfaceName::try_from("net1").unwrap()),
            SriovError::Configuration,
        );
        assert!(matches!(missing, SriovError::DeviceNotFound(_)));
        let gone = SriovError::from_link(LinkError::WorkerGone, SriovError::Configuration);
        assert!(matches!(gone, SriovError::Namespace(_)));
        let refused = SriovError::from_link(
            LinkError::Failed {
                op: "set mac".to_string(),
                reason: "refused".to_string(),
            },
            SriovError::Configuration,
        );
        assert_eq!(refused.code(), 103);
    }

    #[test]
    fn plugin_error_names_the_step() {
        let err = PluginError::Attach {
            completed: AttachState::Migrated,
            source: SriovError::Namespace("gone".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "attach failed after step 'migrated': namespace error: gone"
        );
        assert_eq!(err.code(), 105);
        assert_eq!(err.details().as_deref(), Some("namespace error: gone"));
    }
}
