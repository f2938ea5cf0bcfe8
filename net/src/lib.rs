// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Validated value types shared by the SR-IOV plugin crates.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod eth;
pub mod interface;
pub mod vf;
pub mod vlan;
