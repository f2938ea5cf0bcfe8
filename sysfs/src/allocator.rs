// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::inventory::{SriovInventory, VirtualFunction};
use crate::{InventoryError, VfUnavailable};
use net::interface::InterfaceName;
use net::vf::VfIndex;
use tracing::{debug, info};

impl SriovInventory {
    /// Pick the lowest-indexed free virtual function of `pf`.
    ///
    /// Two processes scanning concurrently may both pick the same index; the loser fails later
    /// when it tries to move a device which is no longer in the host namespace.
    ///
    /// # Errors
    ///
    /// * Errors of [`SriovInventory::total_vfs`].
    /// * [`InventoryError::NoFreeVf`] if every configured VF is attached.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn allocate(&self, pf: &InterfaceName) -> Result<VirtualFunction, InventoryError> {
        let total = self.total_vfs(pf)?;
        let vf = (0..total).map(VfIndex).find_map(|index| {
            self.vf_netdev(pf, index)
                .ok()
                .map(|netdev| VirtualFunction { index, netdev })
        });
        match vf {
            Some(vf) => {
                info!("allocated {pf} vf {} ({})", vf.index, vf.netdev);
                Ok(vf)
            }
            None => Err(InventoryError::NoFreeVf {
                device: pf.clone(),
                total,
            }),
        }
    }

    /// Resolve an explicitly requested virtual function.
    ///
    /// # Errors
    ///
    /// [`InventoryError::VfNotFound`] if `index` is out of range or currently not free.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn resolve(
        &self,
        pf: &InterfaceName,
        index: VfIndex,
    ) -> Result<VirtualFunction, InventoryError> {
        let total = self.total_vfs(pf)?;
        if index.as_u32() >= total {
            return Err(InventoryError::VfNotFound {
                device: pf.clone(),
                vf: index,
                reason: VfUnavailable::OutOfRange { total },
            });
        }
        let netdev = self.vf_netdev(pf, index)?;
        debug!("resolved requested {pf} vf {index} to {netdev}");
        Ok(VirtualFunction { index, netdev })
    }
}
