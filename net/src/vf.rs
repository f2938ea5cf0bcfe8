// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! SR-IOV virtual function identifiers and attributes.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Index of a virtual function relative to its physical function (`virtfn<N>` in sysfs).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct VfIndex(pub u32);

impl VfIndex {
    /// The raw index.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for VfIndex {
    fn from(value: u32) -> Self {
        VfIndex(value)
    }
}

impl FromStr for VfIndex {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(VfIndex)
    }
}

impl Display for VfIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transmit rate ceiling of a virtual function in Mbps.  Zero means unlimited.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TxRate(pub u32);

impl TxRate {
    /// No rate limit.
    pub const UNLIMITED: TxRate = TxRate(0);

    /// The rate in Mbps.
    #[must_use]
    pub fn mbps(self) -> u32 {
        self.0
    }
}

impl FromStr for TxRate {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TxRate)
    }
}

impl Display for TxRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Mbps", self.0)
    }
}
