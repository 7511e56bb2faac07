// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Authoritative map of known containers, with blocking PID lookups.
//!
//! All state lives inside one serializing loop; callers talk to it over
//! queues. A lookup that cannot be answered from the container map is
//! parked with the PID chain it walked, and resolves as soon as a
//! matching snapshot is submitted, bounded by the caller's deadline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::props::{ContainerSnapshot, DockerProps};
use crate::errors::Error;
use crate::proc::ProcessTable;

pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

enum Reply {
    Found(DockerProps),
    InvalidPid,
}

struct LookupRequest {
    pid: i32,
    reply: oneshot::Sender<Reply>,
    cancel: CancellationToken,
}

struct Pending {
    serial: u64,
    pids: Vec<i32>,
    reply: Option<oneshot::Sender<Reply>>,
}

/// Handle to the registry loop.
#[derive(Clone)]
pub struct Registry {
    submit_tx: mpsc::Sender<ContainerSnapshot>,
    lookup_tx: mpsc::Sender<LookupRequest>,
    cancel: CancellationToken,
}

impl Registry {
    pub fn spawn(
        parent: &CancellationToken,
        procs: Arc<dyn ProcessTable>,
    ) -> (Self, JoinHandle<()>) {
        let cancel = parent.child_token();
        let (submit_tx, submit_rx) = mpsc::channel(1);
        let (lookup_tx, lookup_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run(cancel.clone(), procs, submit_rx, lookup_rx));
        (
            Self {
                submit_tx,
                lookup_tx,
                cancel,
            },
            handle,
        )
    }

    /// Notifies the registry of a new or updated container snapshot.
    pub async fn submit(&self, snapshot: ContainerSnapshot) -> Result<(), Error> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::NotRunning),
            sent = self.submit_tx.send(snapshot) => sent.map_err(|_| Error::NotRunning),
        }
    }

    /// Finds the container whose process tree holds `pid`, waiting up to
    /// [`LOOKUP_TIMEOUT`] for one to appear.
    pub async fn lookup(&self, pid: i32) -> Result<DockerProps, Error> {
        let deadline = CancellationToken::new();
        let _guard = deadline.clone().drop_guard();

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = LookupRequest {
            pid,
            reply: reply_tx,
            cancel: deadline.clone(),
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::NotRunning),
            _ = sleep(LOOKUP_TIMEOUT) => Err(Error::NotFound),
            outcome = async {
                self.lookup_tx
                    .send(request)
                    .await
                    .map_err(|_| Error::NotRunning)?;
                match reply_rx.await {
                    Ok(Reply::Found(props)) => Ok(props),
                    Ok(Reply::InvalidPid) => Err(Error::InvalidPid),
                    Err(_) => Err(Error::NotRunning),
                }
            } => outcome,
        }
    }
}

async fn run(
    cancel: CancellationToken,
    procs: Arc<dyn ProcessTable>,
    mut submit_rx: mpsc::Receiver<ContainerSnapshot>,
    mut lookup_rx: mpsc::Receiver<LookupRequest>,
) {
    let (purge_tx, mut purge_rx) = mpsc::channel::<u64>(1);
    let mut containers: HashMap<String, ContainerSnapshot> = HashMap::new();
    let mut waiting: Vec<Pending> = Vec::new();
    let mut serial: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            Some(snapshot) = submit_rx.recv() => {
                do_submit(&mut containers, &mut waiting, snapshot);
            }

            Some(request) = lookup_rx.recv() => {
                serial += 1;
                do_lookup(
                    &containers,
                    &mut waiting,
                    procs.as_ref(),
                    request,
                    serial,
                    &purge_tx,
                );
            }

            Some(id) = purge_rx.recv() => {
                purge(&mut waiting, id);
            }
        }
    }

    // Pending callers unblock through the registry token; their cancel
    // watchers then deliver the purges drained here.
    debug!(pending = waiting.len(), "draining lookups");
    while !waiting.is_empty() {
        match purge_rx.recv().await {
            Some(id) => purge(&mut waiting, id),
            None => break,
        }
    }
    debug!("registry done");
}

/// Resolves every pending lookup whose PID chain holds the snapshot's
/// root PID, then stores the snapshot, overwriting any previous entry
/// for the same id. Reply slots are single-use, so racing resolutions
/// of an already-resolved lookup are no-ops; resolved entries are
/// dropped from the pending list.
fn do_submit(
    containers: &mut HashMap<String, ContainerSnapshot>,
    waiting: &mut Vec<Pending>,
    snapshot: ContainerSnapshot,
) {
    if let Some(props) = snapshot.props() {
        let root = props.pid;
        for pending in waiting.iter_mut() {
            if pending.pids.contains(&root) {
                if let Some(reply) = pending.reply.take() {
                    debug!(pid = root, docker_id = %props.id, "match found");
                    let _ = reply.send(Reply::Found(props.clone()));
                }
            }
        }
        waiting.retain(|pending| pending.reply.is_some());
    }

    containers.insert(snapshot.id.clone(), snapshot);
}

/// Walks upward from the requested PID. Each generation is first checked
/// against the container map; unmatched generations are recorded so a
/// later submission can resolve the lookup. A walk that collects no
/// generations (PID 1, or an unreadable process) is answered with
/// `InvalidPid`.
fn do_lookup(
    containers: &HashMap<String, ContainerSnapshot>,
    waiting: &mut Vec<Pending>,
    procs: &dyn ProcessTable,
    request: LookupRequest,
    serial: u64,
    purge_tx: &mpsc::Sender<u64>,
) {
    debug!(request_pid = request.pid, "looking up container");

    let mut pids = Vec::new();
    let mut pid = request.pid;

    while pid > 1 {
        if let Some(props) = find_by_root_pid(containers, pid) {
            debug!(pid, docker_id = %props.id, "match found");
            let _ = request.reply.send(Reply::Found(props));
            return;
        }

        match procs.parent_of(pid) {
            Some(parent) => {
                pids.push(pid);
                pid = parent;
            }
            None => break,
        }
    }

    if pids.is_empty() {
        let _ = request.reply.send(Reply::InvalidPid);
        return;
    }

    debug!(
        request_pid = request.pid,
        generations = pids.len(),
        "no match found, waiting for new containers"
    );

    waiting.push(Pending {
        serial,
        pids,
        reply: Some(request.reply),
    });

    let purge_tx = purge_tx.clone();
    let cancel = request.cancel;
    tokio::spawn(async move {
        cancel.cancelled().await;
        let _ = purge_tx.send(serial).await;
    });
}

fn find_by_root_pid(
    containers: &HashMap<String, ContainerSnapshot>,
    pid: i32,
) -> Option<DockerProps> {
    containers
        .values()
        .find(|snapshot| snapshot.root_pid() == Some(pid))
        .and_then(|snapshot| snapshot.props())
}

fn purge(waiting: &mut Vec<Pending>, serial: u64) {
    waiting.retain(|pending| pending.serial != serial);
}
