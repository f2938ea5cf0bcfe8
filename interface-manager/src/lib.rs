// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Kernel network device control for the SR-IOV plugin.
//!
//! Link operations are expressed by the [`LinkControl`] trait.  There are two implementations:
//!
//! * [`Netlink`] talks rtnetlink directly from the calling thread, and therefore acts on whatever
//!   network namespace that thread is in (for the plugin: always the host namespace).
//! * [`NetnsWorker`] owns a dedicated OS thread which has entered a target namespace and serves
//!   link requests sent to it over a channel.
//!
//! Namespace membership is a per-thread property.  The main thread never calls `setns`; only
//! worker threads do, and each worker restores its original namespace before it exits.

#![deny(clippy::all, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

mod link;
mod netlink;
mod netns;
mod worker;

pub use link::{Link, LinkControl, LinkError, Route, VfAttribute};
pub use netlink::Netlink;
pub use netns::{NamespaceGuard, NetNs, NetnsError};
pub use worker::NetnsWorker;
