// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Docker probe: maps host PIDs to the containers running them.
//!
//! Two redundant sources feed the probe: a [`lister::Lister`] that
//! periodically enumerates running containers and emits deltas, and a
//! [`watcher::Watcher`] subscribed to engine start/die events. The
//! [`service::DockerService`] supervisor reconciles both into one
//! [`container::ContainerHandle`] task per container, each of which
//! inspects its container and submits snapshots to the
//! [`registry::Registry`] answering PID lookups.

pub mod client;
pub mod container;
pub mod lister;
pub mod props;
pub mod registry;
pub mod service;
pub mod watcher;

pub use client::{DockerApi, Engine, EngineEvent};
pub use props::{ContainerSnapshot, DockerProps, RunState};
pub use registry::Registry;
pub use service::DockerService;

/// Change observed against a prior view of the container set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

/// One container change, emitted by the watcher and (batched as deltas)
/// by the lister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub id: String,
}
