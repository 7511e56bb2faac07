// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Docker probe supervisor.
//!
//! Reconciles lister deltas and watcher events into one container task
//! per container id. The lister and watcher race around container
//! termination, so a container missing from a single lister delivery is
//! only marked stale; missing from a second consecutive delivery, its
//! task is shut down. Reappearing clears the mark.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::client::{DockerApi, Engine};
use super::container::{self, ContainerHandle};
use super::lister::Lister;
use super::props::DockerProps;
use super::registry::Registry;
use super::watcher::Watcher;
use super::{EventKind, WatchEvent};
use crate::errors::Error;
use crate::proc::{ProcFs, ProcessTable};

/// The docker probe: maintains the set of active containers and a
/// registry for finding containers by PID.
pub struct DockerService {
    registry: Registry,
    cancel: CancellationToken,
    join: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DockerService {
    /// Connects to the local engine, verifies it responds, and starts
    /// the probe.
    pub async fn connect(parent: &CancellationToken) -> Result<Self, Error> {
        let engine = Engine::connect()?;
        engine.ping().await?;
        debug!("connected to docker engine");
        Ok(Self::with_api(
            parent,
            Arc::new(engine),
            Arc::new(ProcFs::new()),
        ))
    }

    pub fn with_api(
        parent: &CancellationToken,
        api: Arc<dyn DockerApi>,
        procs: Arc<dyn ProcessTable>,
    ) -> Self {
        let cancel = parent.child_token();
        let (registry, registry_handle) = Registry::spawn(&cancel, procs);
        let lister = Lister::spawn(&cancel, api.clone());
        let watcher = Watcher::spawn(&cancel, api.clone());

        let (exit_tx, exit_rx) = mpsc::channel(1);
        let supervisor = Supervisor {
            cancel: cancel.clone(),
            api,
            registry: registry.clone(),
            registry_handle,
            lister,
            watcher,
            containers: HashMap::new(),
            listed: HashSet::new(),
            stale: HashSet::new(),
            exit_tx,
            exit_rx,
        };

        let join = tokio::spawn(supervisor.run());

        Self {
            registry,
            cancel,
            join: tokio::sync::Mutex::new(Some(join)),
        }
    }

    /// Finds the container running `pid`, blocking up to the registry's
    /// lookup deadline for it to become known.
    pub async fn lookup(&self, pid: i32) -> Result<DockerProps, Error> {
        self.registry.lookup(pid).await
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.join.lock().await.take() {
            let _ = handle.await;
        }
    }
}

struct Supervisor {
    cancel: CancellationToken,
    api: Arc<dyn DockerApi>,
    registry: Registry,
    registry_handle: JoinHandle<()>,
    lister: Lister,
    watcher: Watcher,

    containers: HashMap<String, ContainerHandle>,

    /// Mirror of the lister's committed running set, maintained by
    /// applying its deltas.
    listed: HashSet<String>,

    /// Containers missing from exactly one lister delivery so far.
    stale: HashSet<String>,

    exit_tx: mpsc::Sender<String>,
    exit_rx: mpsc::Receiver<String>,
}

impl Supervisor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("context cancelled");
                    break;
                }

                delta = self.lister.deltas.recv() => {
                    match delta {
                        Some(events) => self.handle_delta(events),
                        None => {
                            debug!("early lister completion");
                            break;
                        }
                    }
                }

                event = self.watcher.events.recv() => {
                    match event {
                        Some(event) => self.handle_watch_event(event),
                        None => {
                            debug!("early watcher completion");
                            break;
                        }
                    }
                }

                Some(id) = self.exit_rx.recv() => {
                    debug!(docker_id = %id, "container complete");
                    self.containers.remove(&id);
                    self.stale.remove(&id);
                }
            }
        }

        self.cancel.cancel();

        debug!(containers = self.containers.len(), "draining containers");
        while !self.containers.is_empty() {
            match self.exit_rx.recv().await {
                Some(id) => {
                    debug!(docker_id = %id, "container drained");
                    self.containers.remove(&id);
                    self.stale.remove(&id);
                }
                None => break,
            }
        }

        let _ = self.lister.handle.await;
        let _ = self.watcher.handle.await;
        let _ = self.registry_handle.await;
        debug!("docker service done");
    }

    /// Applies one lister delivery: create events behave like watcher
    /// creates and clear any stale mark, delete events update the
    /// mirrored set. The delivery boundary then advances the two-strike
    /// clock: tasks absent from the mirrored set are marked stale on the
    /// first delivery and shut down on the second.
    fn handle_delta(&mut self, events: Vec<WatchEvent>) {
        debug!(
            active = self.containers.len(),
            stale = self.stale.len(),
            events = events.len(),
            "lister delta"
        );

        for event in events {
            match event.kind {
                EventKind::Create | EventKind::Update => {
                    self.listed.insert(event.id.clone());
                    self.stale.remove(&event.id);
                    self.refresh_container(&event.id);
                }
                EventKind::Delete => {
                    self.listed.remove(&event.id);
                }
            }
        }

        let absent: Vec<String> = self
            .containers
            .keys()
            .filter(|id| !self.listed.contains(*id))
            .cloned()
            .collect();

        for id in absent {
            if self.stale.contains(&id) {
                debug!(docker_id = %id, "shutting down stale container");
                if let Some(handle) = self.containers.get(&id) {
                    handle.shutdown();
                }
            } else {
                self.stale.insert(id);
            }
        }
    }

    fn handle_watch_event(&mut self, event: WatchEvent) {
        debug!(docker_id = %event.id, kind = ?event.kind, "watcher event");
        match event.kind {
            EventKind::Create | EventKind::Update => self.refresh_container(&event.id),
            EventKind::Delete => {
                if let Some(handle) = self.containers.get(&event.id) {
                    handle.shutdown();
                }
            }
        }
    }

    fn refresh_container(&mut self, id: &str) {
        if let Some(handle) = self.containers.get(id) {
            handle.refresh();
            return;
        }
        self.create_container(id);
    }

    fn create_container(&mut self, id: &str) {
        debug!(docker_id = %id, "creating container");
        let handle = container::spawn(
            &self.cancel,
            self.api.clone(),
            self.registry.clone(),
            id.to_string(),
            self.exit_tx.clone(),
        );
        self.containers.insert(id.to_string(), handle);
    }
}
