// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Per-container inspection task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::DockerApi;
use super::props::ContainerSnapshot;
use super::registry::Registry;
use crate::runner::{self, Runner};

/// Handle to one container's task. The task inspects its container
/// immediately on start and again on every refresh, submitting snapshots
/// with populated state to the registry; it reports its id on exit.
pub struct ContainerHandle {
    id: String,
    refresh_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
}

impl ContainerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Requests a re-inspection. Refreshes are coalesced: one queued
    /// request at most, and none taken while a fetch is in flight.
    pub fn refresh(&self) {
        let _ = self.refresh_tx.try_send(());
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

pub fn spawn(
    parent: &CancellationToken,
    api: Arc<dyn DockerApi>,
    registry: Registry,
    id: String,
    exits: mpsc::Sender<String>,
) -> ContainerHandle {
    let cancel = parent.child_token();
    let (refresh_tx, refresh_rx) = mpsc::channel(1);

    tokio::spawn(run(
        cancel.clone(),
        api,
        registry,
        id.clone(),
        refresh_rx,
        exits,
    ));

    ContainerHandle {
        id,
        refresh_tx,
        cancel,
    }
}

async fn run(
    cancel: CancellationToken,
    api: Arc<dyn DockerApi>,
    registry: Registry,
    id: String,
    mut refresh_rx: mpsc::Receiver<()>,
    exits: mpsc::Sender<String>,
) {
    let mut fetch: Option<Runner<ContainerSnapshot>> = Some(spawn_inspect(&cancel, &api, &id));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            fetched = runner::wait_slot(&mut fetch), if fetch.is_some() => {
                fetch = None;
                match fetched {
                    Ok(snapshot) => match &snapshot.state {
                        Some(state) => {
                            debug!(
                                docker_id = %id,
                                running = state.running,
                                pid = state.pid,
                                "inspect complete"
                            );
                            if registry.submit(snapshot).await.is_err() {
                                break;
                            }
                        }
                        None => warn!(docker_id = %id, "incomplete state"),
                    },
                    Err(err) => warn!(docker_id = %id, error = %err, "inspect failed"),
                }
            }

            Some(()) = refresh_rx.recv() => {
                if fetch.is_none() {
                    debug!(docker_id = %id, "beginning refresh");
                    fetch = Some(spawn_inspect(&cancel, &api, &id));
                }
            }
        }
    }

    if let Some(mut in_flight) = fetch.take() {
        in_flight.stop();
        let _ = in_flight.wait().await;
    }

    debug!(docker_id = %id, "done");
    let _ = exits.send(id).await;
}

fn spawn_inspect(
    cancel: &CancellationToken,
    api: &Arc<dyn DockerApi>,
    id: &str,
) -> Runner<ContainerSnapshot> {
    let api = api.clone();
    let id = id.to_string();
    Runner::spawn(cancel, async move { api.inspect(&id).await })
}
