// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A writable, temporary fake of the sysfs SR-IOV layout.
//!
//! Only the files the inventory reads are created:
//!
//! ```text
//! <root>/<pf>/device/sriov_numvfs
//! <root>/<pf>/device/virtfn<N>/net/<netdev>/
//! ```

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use crate::SriovInventory;
use net::vf::VfIndex;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A temporary tree laid out like `/sys/class/net` with one SR-IOV capable device.
///
/// The tree is removed when this value is dropped.
#[derive(Debug)]
pub struct FakeSysfs {
    dir: TempDir,
    pf: String,
}

impl FakeSysfs {
    /// Create a tree for device `pf` with `total` configured (but no free) virtual functions.
    #[must_use]
    pub fn new(pf: &str, total: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let this = Self {
            dir,
            pf: pf.to_string(),
        };
        fs::create_dir_all(this.device_dir()).unwrap();
        this.write_numvfs(&format!("{total}\n"));
        for vf in 0..total {
            fs::create_dir_all(this.vf_net_dir(VfIndex(vf))).unwrap();
        }
        this
    }

    fn device_dir(&self) -> PathBuf {
        self.dir.path().join(&self.pf).join("device")
    }

    /// Path of the `net` directory of virtual function `vf`.
    #[must_use]
    pub fn vf_net_dir(&self, vf: VfIndex) -> PathBuf {
        self.device_dir().join(format!("virtfn{vf}")).join("net")
    }

    /// Overwrite the `sriov_numvfs` file.
    pub fn write_numvfs(&self, contents: &str) {
        fs::write(self.device_dir().join("sriov_numvfs"), contents).unwrap();
    }

    /// Make `vf` free by listing `netdev` as its host network device.
    pub fn attach_vf(&self, vf: VfIndex, netdev: &str) {
        fs::create_dir_all(self.vf_net_dir(vf).join(netdev)).unwrap();
    }

    /// Make `vf` busy by removing every network device listed for it.
    pub fn detach_vf(&self, vf: VfIndex) {
        let dir = self.vf_net_dir(vf);
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
    }

    /// Find the virtual function currently listing `netdev`, if any.
    #[must_use]
    pub fn vf_of(&self, netdev: &str) -> Option<VfIndex> {
        let total: u32 = fs::read_to_string(self.device_dir().join("sriov_numvfs"))
            .ok()?
            .trim()
            .parse()
            .ok()?;
        (0..total)
            .map(VfIndex)
            .find(|&vf| self.vf_net_dir(vf).join(netdev).exists())
    }

    /// An inventory reading this tree.
    #[must_use]
    pub fn inventory(&self) -> SriovInventory {
        SriovInventory::with_root(self.dir.path())
    }
}
