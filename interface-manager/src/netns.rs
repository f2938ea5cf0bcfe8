// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use nix::sched::{CloneFlags, setns};
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// The network namespace of the calling thread.
const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// Errors which can occur while handling network namespaces.
#[derive(Debug, thiserror::Error)]
pub enum NetnsError {
    /// The namespace path does not exist (the workload is already gone).
    #[error("network namespace {0} does not exist")]
    NotFound(PathBuf),
    /// The namespace path exists but could not be opened.
    #[error("failed to open network namespace {path}: {source}")]
    Open {
        /// the namespace path
        path: PathBuf,
        /// cause
        source: io::Error,
    },
    /// `setns` failed.
    #[error("failed to enter network namespace {path}: {source}")]
    Enter {
        /// the namespace path
        path: PathBuf,
        /// cause
        source: nix::Error,
    },
    /// The thread serving a namespace could not be started.
    #[error("namespace worker for {path} failed: {reason}")]
    Worker {
        /// the namespace path
        path: PathBuf,
        /// detail
        reason: String,
    },
}

/// An open handle on a network namespace.
///
/// Holding the handle keeps the namespace alive even if every process in it exits.
#[derive(Debug)]
pub struct NetNs {
    path: PathBuf,
    file: File,
}

impl NetNs {
    /// Open the namespace bound at `path` (e.g. `/var/run/netns/<name>` or `/proc/<pid>/ns/net`).
    ///
    /// # Errors
    ///
    /// [`NetnsError::NotFound`] if nothing exists at `path`, [`NetnsError::Open`] otherwise.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NetnsError> {
        let path = path.as_ref().to_path_buf();
        match File::open(&path) {
            Ok(file) => {
                debug!("opened network namespace {}", path.display());
                Ok(Self { path, file })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(NetnsError::NotFound(path)),
            Err(source) => Err(NetnsError::Open { path, source }),
        }
    }

    /// The namespace of the calling thread.
    pub fn current() -> Result<Self, NetnsError> {
        Self::open(THREAD_NETNS)
    }

    /// The path this handle was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Duplicate the handle.
    pub fn try_clone(&self) -> Result<Self, NetnsError> {
        let file = self.file.try_clone().map_err(|source| NetnsError::Open {
            path: self.path.clone(),
            source,
        })?;
        Ok(Self {
            path: self.path.clone(),
            file,
        })
    }

    /// Move the calling thread into this namespace.
    ///
    /// The thread returns to its previous namespace when the returned guard is dropped.  Only
    /// call this from a thread you own; runtime worker threads are shared with other tasks.
    ///
    /// # Errors
    ///
    /// Fails if the current namespace can not be opened or `setns` is refused.
    pub fn enter(&self) -> Result<NamespaceGuard, NetnsError> {
        let original = Self::current()?;
        setns(self.as_fd(), CloneFlags::CLONE_NEWNET).map_err(|source| NetnsError::Enter {
            path: self.path.clone(),
            source,
        })?;
        debug!("entered network namespace {self}");
        Ok(NamespaceGuard { original })
    }
}

impl AsFd for NetNs {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for NetNs {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Display for NetNs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Returns the owning thread to its original network namespace on drop.
#[derive(Debug)]
#[must_use = "the thread leaves the namespace as soon as the guard is dropped"]
pub struct NamespaceGuard {
    original: NetNs,
}

impl Drop for NamespaceGuard {
    fn drop(&mut self) {
        match setns(self.original.as_fd(), CloneFlags::CLONE_NEWNET) {
            Ok(()) => debug!("returned to network namespace {}", self.original),
            Err(err) => error!(
                "failed to return to network namespace {}: {err}",
                self.original
            ),
        }
    }
}
