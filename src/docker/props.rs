// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;

use crate::propset::PropSet;

/// Run state of an inspected container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub running: bool,
    pub pid: i32,
}

/// Full inspection result for one container, as submitted to the
/// registry. Inspections can race container teardown, so `state` may be
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSnapshot {
    pub id: String,
    pub image: String,
    pub path: String,
    pub labels: HashMap<String, String>,
    pub state: Option<RunState>,
}

impl ContainerSnapshot {
    pub fn root_pid(&self) -> Option<i32> {
        self.state.as_ref().map(|state| state.pid)
    }

    /// The caller-facing projection of this snapshot; `None` while the
    /// state is unpopulated.
    pub fn props(&self) -> Option<DockerProps> {
        let state = self.state.as_ref()?;
        Some(DockerProps {
            id: self.id.clone(),
            pid: state.pid,
            image: self.image.clone(),
            path: self.path.clone(),
            labels: self.labels.clone(),
        })
    }
}

/// Container attributes exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerProps {
    pub id: String,
    pub pid: i32,
    pub image: String,
    pub path: String,
    pub labels: HashMap<String, String>,
}

impl DockerProps {
    pub fn prop_set(&self) -> PropSet {
        PropSet::new()
            .add_string("docker-id", &self.id)
            .add_int("docker-pid", i64::from(self.pid))
            .add_string("docker-image", &self.image)
            .add_string("docker-path", &self.path)
            .add_map("docker-labels", self.labels.clone())
    }
}
