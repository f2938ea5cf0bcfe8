// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{InventoryError, VfUnavailable};
use net::interface::InterfaceName;
use net::vf::VfIndex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Default location of the kernel's network device class directory.
pub const SYSFS_CLASS_NET: &str = "/sys/class/net";

/// A virtual function together with its current host-visible network device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFunction {
    /// Index relative to the physical function.
    pub index: VfIndex,
    /// Host-visible network device name (only resolvable while the VF is free).
    pub netdev: InterfaceName,
}

/// Reads the SR-IOV topology of physical devices from sysfs.
#[derive(Debug, Clone)]
pub struct SriovInventory {
    root: PathBuf,
}

impl Default for SriovInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl SriovInventory {
    /// An inventory reading the live kernel topology under [`SYSFS_CLASS_NET`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(SYSFS_CLASS_NET)
    }

    /// An inventory reading an alternate tree laid out like `/sys/class/net`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root this inventory reads from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn numvfs_path(&self, pf: &InterfaceName) -> PathBuf {
        self.root.join(pf.as_str()).join("device/sriov_numvfs")
    }

    fn vf_net_dir(&self, pf: &InterfaceName, vf: VfIndex) -> PathBuf {
        self.root
            .join(pf.as_str())
            .join(format!("device/virtfn{vf}"))
            .join("net")
    }

    /// Number of virtual functions currently configured on `pf`.
    ///
    /// # Errors
    ///
    /// * [`InventoryError::DeviceNotFound`] if the device or its `sriov_numvfs` file is missing.
    /// * [`InventoryError::InvalidState`] if the count is empty, unparsable, or zero.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn total_vfs(&self, pf: &InterfaceName) -> Result<u32, InventoryError> {
        let path = self.numvfs_path(pf);
        let raw = fs::read_to_string(&path).map_err(|source| InventoryError::DeviceNotFound {
            device: pf.clone(),
            path: path.clone(),
            source,
        })?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(InventoryError::InvalidState {
                device: pf.clone(),
                reason: format!("no data in {}", path.display()),
            });
        }
        let total = raw
            .parse::<u32>()
            .map_err(|e| InventoryError::InvalidState {
                device: pf.clone(),
                reason: format!("'{raw}' in {} is not a VF count: {e}", path.display()),
            })?;
        if total == 0 {
            return Err(InventoryError::InvalidState {
                device: pf.clone(),
                reason: "no virtual functions configured".to_string(),
            });
        }
        debug!("{pf} has {total} virtual functions configured");
        Ok(total)
    }

    /// Resolve the host-visible network device of virtual function `vf`.
    ///
    /// Succeeds iff exactly one network device is listed under the VF's `net` directory.
    ///
    /// # Errors
    ///
    /// [`InventoryError::VfNotFound`] otherwise.
    pub fn vf_netdev(
        &self,
        pf: &InterfaceName,
        vf: VfIndex,
    ) -> Result<InterfaceName, InventoryError> {
        let not_found = |reason| InventoryError::VfNotFound {
            device: pf.clone(),
            vf,
            reason,
        };
        let dir = self.vf_net_dir(pf, vf);
        let entries = fs::read_dir(&dir)
            .and_then(|entries| {
                entries
                    .map(|entry| entry.map(|e| e.file_name()))
                    .collect::<Result<Vec<_>, _>>()
            })
            .map_err(|source| {
                not_found(VfUnavailable::Unreadable {
                    path: dir.clone(),
                    source,
                })
            })?;
        let [name] = entries.as_slice() else {
            return Err(not_found(VfUnavailable::DeviceCount {
                count: entries.len(),
            }));
        };
        let name = name.to_string_lossy().into_owned();
        let netdev = InterfaceName::try_from(name.as_str())
            .map_err(|_| not_found(VfUnavailable::IllegalName(name.clone())))?;
        trace!("{pf} vf {vf} is {netdev}");
        Ok(netdev)
    }

    /// True iff `vf` currently has a host-visible network device.
    #[must_use]
    pub fn is_free(&self, pf: &InterfaceName, vf: VfIndex) -> bool {
        self.vf_netdev(pf, vf).is_ok()
    }

    /// Number of free virtual functions among indices `[0, total)`.
    #[must_use]
    pub fn free_count(&self, pf: &InterfaceName, total: u32) -> u32 {
        let free = (0..total)
            .map(VfIndex)
            .filter(|&vf| self.is_free(pf, vf))
            .count();
        // bounded by total, which is a u32
        #[allow(clippy::cast_possible_truncation)]
        let free = free as u32;
        debug!("{pf}: {free} of {total} virtual functions free");
        free
    }
}
