// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! SR-IOV device inventory backed by the kernel's sysfs device topology.
//!
//! There is no allocation table anywhere in this crate.  A virtual function is *free* iff the
//! kernel currently exposes exactly one network device under
//! `/sys/class/net/<pf>/device/virtfn<N>/net/`.  A VF which has been moved into another network
//! namespace disappears from that directory, and reappears when it is moved back.
//!
//! Every query is a fresh read of the filesystem.  Nothing is cached, not even within a single
//! invocation, since another plugin process may be moving devices concurrently.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]

mod allocator;
mod inventory;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use inventory::{SYSFS_CLASS_NET, SriovInventory, VirtualFunction};

use net::interface::InterfaceName;
use net::vf::VfIndex;
use std::path::PathBuf;

/// Why a particular virtual function has no usable host network device.
#[derive(Debug, thiserror::Error)]
pub enum VfUnavailable {
    /// The index is not below the configured VF count.
    #[error("index out of range, {total} virtual functions configured")]
    OutOfRange {
        /// configured VF count
        total: u32,
    },
    /// The `virtfn<N>/net` directory is missing or unreadable.
    #[error("{path} is not readable: {source}")]
    Unreadable {
        /// directory which was read
        path: PathBuf,
        /// underlying error
        source: std::io::Error,
    },
    /// The directory does not list exactly one network device.
    #[error("{count} network devices listed (expected exactly one)")]
    DeviceCount {
        /// number of entries found
        count: usize,
    },
    /// The listed device name is not a legal interface name.
    #[error("listed device name '{0}' is not a legal interface name")]
    IllegalName(String),
}

/// Errors returned by the [`SriovInventory`].
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// The physical device or its `sriov_numvfs` control file is absent.
    #[error("sriov control file {path} of device {device} is not readable: {source}")]
    DeviceNotFound {
        /// physical device
        device: InterfaceName,
        /// control file path
        path: PathBuf,
        /// underlying error
        source: std::io::Error,
    },
    /// The requested virtual function has no resolvable host network device.
    ///
    /// This folds "index out of range" and "currently attached elsewhere" into one condition;
    /// [`VfUnavailable`] carries the detail.
    #[error("virtual function {vf} of device {device} is not available: {reason}")]
    VfNotFound {
        /// physical device
        device: InterfaceName,
        /// requested index
        vf: VfIndex,
        /// detail
        reason: VfUnavailable,
    },
    /// The configured VF count is zero or unparsable.
    #[error("invalid sriov state of device {device}: {reason}")]
    InvalidState {
        /// physical device
        device: InterfaceName,
        /// detail
        reason: String,
    },
    /// Every configured VF is currently attached somewhere.
    #[error("no free virtual function on device {device} ({total} configured)")]
    NoFreeVf {
        /// physical device
        device: InterfaceName,
        /// configured VF count
        total: u32,
    },
}
