// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::link::{Link, LinkControl, LinkError, Route, VfAttribute};
use crate::netlink::Netlink;
use crate::netns::{NetNs, NetnsError};
use ipnet::IpNet;
use net::interface::InterfaceName;
use net::vf::VfIndex;
use std::path::PathBuf;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

#[derive(Debug)]
enum LinkOp {
    Get(InterfaceName),
    SetUp(Link),
    SetDown(Link),
    Rename(Link, InterfaceName),
    SetAlias(Link, String),
    MoveTo(Link, NetNs),
    SetVf(Link, VfIndex, VfAttribute),
    AddAddress(Link, IpNet),
    AddRoute(Link, Route),
}

#[derive(Debug)]
enum LinkReply {
    Link(Link),
    Done,
}

impl LinkOp {
    async fn apply(self, netlink: &Netlink) -> Result<LinkReply, LinkError> {
        match self {
            LinkOp::Get(name) => netlink.get(&name).await.map(LinkReply::Link),
            LinkOp::SetUp(link) => netlink.set_up(&link).await.map(|()| LinkReply::Done),
            LinkOp::SetDown(link) => netlink.set_down(&link).await.map(|()| LinkReply::Done),
            LinkOp::Rename(link, name) => {
                netlink.rename(&link, &name).await.map(|()| LinkReply::Done)
            }
            LinkOp::SetAlias(link, alias) => netlink
                .set_alias(&link, &alias)
                .await
                .map(|()| LinkReply::Done),
            LinkOp::MoveTo(link, netns) => {
                netlink.move_to(&link, &netns).await.map(|()| LinkReply::Done)
            }
            LinkOp::SetVf(pf, vf, attribute) => netlink
                .set_vf(&pf, vf, attribute)
                .await
                .map(|()| LinkReply::Done),
            LinkOp::AddAddress(link, address) => netlink
                .add_address(&link, address)
                .await
                .map(|()| LinkReply::Done),
            LinkOp::AddRoute(link, route) => {
                netlink.add_route(&link, &route).await.map(|()| LinkReply::Done)
            }
        }
    }
}

struct Request {
    op: LinkOp,
    reply: oneshot::Sender<Result<LinkReply, LinkError>>,
}

/// A dedicated thread serving link operations inside one network namespace.
///
/// The thread enters the namespace once, opens its own netlink connection there and runs a
/// single-threaded runtime until the worker is shut down or dropped.  Callers never change
/// namespace themselves.
#[derive(Debug)]
pub struct NetnsWorker {
    path: PathBuf,
    requests: Option<mpsc::UnboundedSender<Request>>,
    thread: Option<JoinHandle<()>>,
}

impl NetnsWorker {
    /// Start a worker in `netns`.
    ///
    /// Resolves once the worker has entered the namespace and connected to netlink.
    ///
    /// # Errors
    ///
    /// Fails if the thread can not be started, the namespace can not be entered, or netlink is
    /// unavailable inside it.
    pub async fn spawn(netns: &NetNs) -> Result<Self, NetnsError> {
        let path = netns.path().to_path_buf();
        let target = netns.try_clone()?;
        let worker_error = |reason: String| NetnsError::Worker {
            path: path.clone(),
            reason,
        };
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), NetnsError>>();
        let (requests, receiver) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("netns-worker".to_string())
            .spawn(move || serve(&target, ready_tx, receiver))
            .map_err(|e| worker_error(e.to_string()))?;
        let this = Self {
            path: path.clone(),
            requests: Some(requests),
            thread: Some(thread),
        };
        match ready_rx.await {
            Ok(Ok(())) => {
                debug!("namespace worker for {} is ready", path.display());
                Ok(this)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(worker_error("exited before becoming ready".to_string())),
        }
    }

    async fn call(&self, op: LinkOp) -> Result<LinkReply, LinkError> {
        trace!("{}: {op:?}", self.path.display());
        let requests = self.requests.as_ref().ok_or(LinkError::WorkerGone)?;
        let (reply, response) = oneshot::channel();
        requests
            .send(Request { op, reply })
            .map_err(|_| LinkError::WorkerGone)?;
        response.await.map_err(|_| LinkError::WorkerGone)?
    }

    async fn call_done(&self, op: LinkOp) -> Result<(), LinkError> {
        match self.call(op).await? {
            LinkReply::Done => Ok(()),
            LinkReply::Link(link) => Err(LinkError::Failed {
                op: "apply link operation".to_string(),
                reason: format!("unexpected reply {link}"),
            }),
        }
    }

    /// Stop the worker and wait for its thread to leave the namespace.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        drop(self.requests.take());
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("namespace worker for {} panicked", self.path.display());
        }
    }
}

impl Drop for NetnsWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(
    netns: &NetNs,
    ready: oneshot::Sender<Result<(), NetnsError>>,
    mut requests: mpsc::UnboundedReceiver<Request>,
) {
    let fail = |reason: String| NetnsError::Worker {
        path: netns.path().to_path_buf(),
        reason,
    };
    let _guard = match netns.enter() {
        Ok(guard) => guard,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(fail(err.to_string())));
            return;
        }
    };
    runtime.block_on(async {
        let netlink = match Netlink::connect() {
            Ok(netlink) => netlink,
            Err(err) => {
                let _ = ready.send(Err(fail(err.to_string())));
                return;
            }
        };
        if ready.send(Ok(())).is_err() {
            return;
        }
        while let Some(Request { op, reply }) = requests.recv().await {
            let result = op.apply(&netlink).await;
            if reply.send(result).is_err() {
                debug!("caller of namespace worker went away");
            }
        }
    });
}

impl LinkControl for NetnsWorker {
    async fn get(&self, name: &InterfaceName) -> Result<Link, LinkError> {
        match self.call(LinkOp::Get(name.clone())).await? {
            LinkReply::Link(link) => Ok(link),
            LinkReply::Done => Err(LinkError::Failed {
                op: format!("look up {name}"),
                reason: "no link in reply".to_string(),
            }),
        }
    }

    async fn set_up(&self, link: &Link) -> Result<(), LinkError> {
        self.call_done(LinkOp::SetUp(link.clone())).await
    }

    async fn set_down(&self, link: &Link) -> Result<(), LinkError> {
        self.call_done(LinkOp::SetDown(link.clone())).await
    }

    async fn rename(&self, link: &Link, name: &InterfaceName) -> Result<(), LinkError> {
        self.call_done(LinkOp::Rename(link.clone(), name.clone()))
            .await
    }

    async fn set_alias(&self, link: &Link, alias: &str) -> Result<(), LinkError> {
        self.call_done(LinkOp::SetAlias(link.clone(), alias.to_string()))
            .await
    }

    async fn move_to(&self, link: &Link, netns: &NetNs) -> Result<(), LinkError> {
        let netns = netns.try_clone().map_err(|e| LinkError::Failed {
            op: format!("move {link} to {netns}"),
            reason: e.to_string(),
        })?;
        self.call_done(LinkOp::MoveTo(link.clone(), netns)).await
    }

    async fn set_vf(&self, pf: &Link, vf: VfIndex, attribute: VfAttribute) -> Result<(), LinkError> {
        self.call_done(LinkOp::SetVf(pf.clone(), vf, attribute))
            .await
    }

    async fn add_address(&self, link: &Link, address: IpNet) -> Result<(), LinkError> {
        self.call_done(LinkOp::AddAddress(link.clone(), address))
            .await
    }

    async fn add_route(&self, link: &Link, route: &Route) -> Result<(), LinkError> {
        self.call_done(LinkOp::AddRoute(link.clone(), *route)).await
    }
}
