// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use dd_workloadid::docker::{ContainerSnapshot, DockerApi, EngineEvent, RunState};
use dd_workloadid::errors::Error;
use dd_workloadid::proc::ProcessTable;

/// Scriptable docker engine: listed frames are consumed in order (the
/// last one repeats), inspections answer from a snapshot table, and
/// events fan out to every subscriber.
pub struct MockEngine {
    lists: Mutex<VecDeque<Vec<String>>>,
    last_list: Mutex<Vec<String>>,
    snapshots: Mutex<HashMap<String, ContainerSnapshot>>,
    events: broadcast::Sender<EngineEvent>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            lists: Mutex::new(VecDeque::new()),
            last_list: Mutex::new(Vec::new()),
            snapshots: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn push_list(&self, ids: &[&str]) {
        self.lists
            .lock()
            .unwrap()
            .push_back(ids.iter().map(|id| id.to_string()).collect());
    }

    pub fn add_snapshot(&self, snapshot: ContainerSnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.id.clone(), snapshot);
    }

    pub fn send_event(&self, action: &str, id: &str) {
        let _ = self.events.send(EngineEvent {
            action: action.to_string(),
            id: id.to_string(),
            timestamp: None,
        });
    }
}

#[async_trait]
impl DockerApi for MockEngine {
    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<String>, Error> {
        let next = self.lists.lock().unwrap().pop_front();
        match next {
            Some(ids) => {
                *self.last_list.lock().unwrap() = ids.clone();
                Ok(ids)
            }
            None => Ok(self.last_list.lock().unwrap().clone()),
        }
    }

    async fn inspect(&self, id: &str) -> Result<ContainerSnapshot, Error> {
        self.snapshots
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn events(
        &self,
        _since: Option<DateTime<Utc>>,
    ) -> Result<BoxStream<'static, Result<EngineEvent, Error>>, Error> {
        let subscription = BroadcastStream::new(self.events.subscribe())
            .filter_map(|item| async move { item.ok().map(Ok::<_, Error>) });
        Ok(subscription.boxed())
    }
}

/// Canned process tree, edges as `(pid, parent)`.
pub struct Tree(HashMap<i32, i32>);

impl Tree {
    pub fn new(edges: &[(i32, i32)]) -> Arc<Self> {
        Arc::new(Self(edges.iter().copied().collect()))
    }
}

impl ProcessTable for Tree {
    fn parent_of(&self, pid: i32) -> Option<i32> {
        self.0.get(&pid).copied()
    }
}

pub fn snapshot(id: &str, pid: i32, labels: &[(&str, &str)]) -> ContainerSnapshot {
    ContainerSnapshot {
        id: id.to_string(),
        image: "img".to_string(),
        path: "/bin/app".to_string(),
        labels: labels
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        state: Some(RunState { running: true, pid }),
    }
}
