// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Engine client port and its `bollard` adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::system::EventsOptions;
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;

use super::props::{ContainerSnapshot, RunState};
use crate::errors::Error;

/// One engine event relevant to container tracking.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub action: String,
    pub id: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// The engine operations used by the docker probe.
#[async_trait]
pub trait DockerApi: Send + Sync + 'static {
    async fn ping(&self) -> Result<(), Error>;

    /// IDs of containers currently in the `running` state.
    async fn list_running(&self) -> Result<Vec<String>, Error>;

    async fn inspect(&self, id: &str) -> Result<ContainerSnapshot, Error>;

    /// Container-scoped engine events starting at `since`.
    async fn events(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<BoxStream<'static, Result<EngineEvent, Error>>, Error>;
}

/// `bollard`-backed engine client.
pub struct Engine {
    docker: Docker,
}

impl Engine {
    pub fn connect() -> Result<Self, Error> {
        Ok(Self {
            docker: Docker::connect_with_local_defaults()?,
        })
    }
}

#[async_trait]
impl DockerApi for Engine {
    async fn ping(&self) -> Result<(), Error> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<String>, Error> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([(
                "status".to_string(),
                vec!["running".to_string()],
            )]),
            ..Default::default()
        };

        let listed = self.docker.list_containers(Some(options)).await?;
        Ok(listed
            .into_iter()
            .filter(|container| container.state.as_deref() == Some("running"))
            .filter_map(|container| container.id)
            .collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerSnapshot, Error> {
        let detail = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let state = detail.state.and_then(|state| {
            let pid = state.pid?;
            Some(RunState {
                running: state.running.unwrap_or(false),
                pid: pid as i32,
            })
        });

        Ok(ContainerSnapshot {
            id: detail.id.unwrap_or_else(|| id.to_string()),
            image: detail.image.unwrap_or_default(),
            path: detail.path.unwrap_or_default(),
            labels: detail
                .config
                .and_then(|config| config.labels)
                .unwrap_or_default(),
            state,
        })
    }

    async fn events(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<BoxStream<'static, Result<EngineEvent, Error>>, Error> {
        let options = EventsOptions::<String> {
            since,
            until: None,
            filters: HashMap::from([(
                "type".to_string(),
                vec!["container".to_string()],
            )]),
        };

        let stream = self.docker.events(Some(options)).map(|item| {
            item.map_err(Error::from).map(|message| EngineEvent {
                action: message.action.unwrap_or_default(),
                id: message.actor.and_then(|actor| actor.id).unwrap_or_default(),
                timestamp: event_time(message.time, message.time_nano),
            })
        });

        Ok(stream.boxed())
    }
}

fn event_time(secs: Option<i64>, nanos: Option<i64>) -> Option<DateTime<Utc>> {
    let secs = secs?;
    let subsec = nanos
        .map(|total| (total.rem_euclid(1_000_000_000)) as u32)
        .unwrap_or(0);
    DateTime::from_timestamp(secs, subsec)
}
