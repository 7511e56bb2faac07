// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Kube probe: maps docker containers to pods and container statuses.

pub mod props;
pub mod service;

pub use props::KubeProps;
pub use service::{KubeService, DEFAULT_NAMESPACE};
