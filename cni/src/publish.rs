// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::error::SriovError;
use k8s_intf::{ClusterClient, NodeResourceRecord};
use net::interface::InterfaceName;
use sysfs::SriovInventory;
use tracing::info;

/// Recount the free virtual functions of `pf` and write the result to the local node object.
///
/// Must run after the device has changed hands, so that the count includes (or excludes) it.
#[tracing::instrument(level = "debug", skip(cluster, inventory))]
pub async fn publish<C: ClusterClient>(
    cluster: &C,
    inventory: &SriovInventory,
    pf: &InterfaceName,
) -> Result<NodeResourceRecord, SriovError> {
    let total = inventory.total_vfs(pf)?;
    let record = NodeResourceRecord::from_free_count(inventory.free_count(pf, total));
    let mut node = cluster.current_node().await?;
    record.apply(&mut node);
    cluster.replace_node(&node).await?;
    info!(
        "published {} free vfs of {pf} (available: {})",
        record.annotation_value(),
        record.label_value()
    );
    Ok(record)
}
