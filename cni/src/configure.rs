// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::error::SriovError;
use crate::request::{AttachmentRequest, PodRef};
use interface_manager::{Link, LinkControl, VfAttribute};
use k8s_intf::{ClusterClient, WorkloadOverrides};
use net::eth::Mac;
use net::vf::{TxRate, VfIndex};
use net::vlan::Vid;
use tracing::{debug, info, warn};

/// Refuse attribute changes which would alter the identity of a physical function.
///
/// Runs before anything is touched.
pub fn check_pf_only(request: &AttachmentRequest) -> Result<(), SriovError> {
    if request.mac.is_some() {
        return Err(SriovError::UnsupportedOperation(format!(
            "modifying the mac address of physical function {} is not supported",
            request.master
        )));
    }
    if request.vlan.is_some() {
        return Err(SriovError::UnsupportedOperation(format!(
            "modifying the vlan of physical function {} is not supported",
            request.master
        )));
    }
    Ok(())
}

/// Writes hardware attributes of one virtual function through its physical function.
pub struct AttributeConfigurator<'a, L> {
    links: &'a L,
    pf: &'a Link,
    vf: VfIndex,
}

impl<'a, L: LinkControl> AttributeConfigurator<'a, L> {
    pub fn new(links: &'a L, pf: &'a Link, vf: VfIndex) -> Self {
        Self { links, pf, vf }
    }

    async fn write(&self, attribute: VfAttribute) -> Result<(), SriovError> {
        self.links
            .set_vf(self.pf, self.vf, attribute)
            .await
            .map_err(|e| SriovError::from_link(e, SriovError::Configuration))
    }

    /// Clear VLAN and transmit rate left behind by a previous tenant.  Failures are logged only.
    pub async fn reset(&self) {
        for attribute in [VfAttribute::Vlan(None), VfAttribute::TxRate(TxRate::UNLIMITED)] {
            if let Err(err) = self.write(attribute).await {
                warn!(
                    "failed to reset {attribute} on {} vf {}: {err}",
                    self.pf.name, self.vf
                );
            }
        }
    }

    pub async fn set_hardware_address(&self, mac: Mac) -> Result<(), SriovError> {
        self.write(VfAttribute::Mac(mac)).await
    }

    pub async fn apply_vlan(&self, vid: Vid) -> Result<(), SriovError> {
        self.write(VfAttribute::Vlan(Some(vid))).await
    }

    pub async fn apply_tx_rate(&self, rate: TxRate) -> Result<(), SriovError> {
        self.write(VfAttribute::TxRate(rate)).await
    }

    /// Reset, then apply the request's values, then the workload's overrides.
    #[tracing::instrument(level = "debug", skip_all, fields(pf = %self.pf.name, vf = %self.vf))]
    pub async fn configure<C: ClusterClient>(
        &self,
        request: &AttachmentRequest,
        cluster: Option<&C>,
    ) -> Result<(), SriovError> {
        self.reset().await;
        if let Some(mac) = request.mac {
            self.set_hardware_address(mac).await?;
        }
        if let Some(vid) = request.vlan {
            self.apply_vlan(vid).await?;
        }
        if let Some(rate) = request.tx_rate {
            self.apply_tx_rate(rate).await?;
        }
        let overrides = lookup_overrides(cluster, request.pod.as_ref()).await?;
        if let Some(tag) = overrides.vlan {
            self.write(VfAttribute::Vlan(tag.vid())).await?;
            info!("applied workload vlan override {tag}");
        }
        if let Some(rate) = overrides.tx_rate {
            self.apply_tx_rate(rate).await?;
            info!("applied workload tx rate override {rate}");
        }
        Ok(())
    }
}

/// Read the workload's overrides.
///
/// Not being able to ask is not an error: the attachment proceeds with the request's values.
/// An override which was read but can not be parsed is.
pub async fn lookup_overrides<C: ClusterClient>(
    cluster: Option<&C>,
    pod: Option<&PodRef>,
) -> Result<WorkloadOverrides, SriovError> {
    let Some(pod) = pod else {
        debug!("no workload identity, skipping overrides");
        return Ok(WorkloadOverrides::default());
    };
    let Some(cluster) = cluster else {
        warn!(
            "no cluster client, ignoring overrides of pod {}/{}",
            pod.namespace, pod.name
        );
        return Ok(WorkloadOverrides::default());
    };
    match cluster.pod_annotations(&pod.namespace, &pod.name).await {
        Ok(annotations) => WorkloadOverrides::from_annotations(&annotations)
            .map_err(|e| SriovError::Configuration(e.to_string())),
        Err(err) => {
            warn!(
                "failed to read overrides of pod {}/{}: {err}",
                pod.namespace, pod.name
            );
            Ok(WorkloadOverrides::default())
        }
    }
}
