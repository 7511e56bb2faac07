// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The addressed service has already shut down.
    #[error("no longer running")]
    NotRunning,

    /// The requested PID walks off the process tree at PID 1 with no
    /// intermediate generations.
    #[error("invalid PID")]
    InvalidPid,

    /// The lookup deadline elapsed without a match.
    #[error("not found")]
    NotFound,

    #[error("cancelled")]
    Cancelled,

    /// An upstream call exceeded its deadline.
    #[error("upstream call timed out")]
    Timeout,

    /// The peer is not connected over a Unix-domain socket, or its
    /// credentials could not be read.
    #[error("invalid connection")]
    InvalidConnection,

    /// The docker labels do not name a pod.
    #[error("container not recognized")]
    ContainerNotRecognized,

    /// The pod UID asserted by the docker labels does not match the pod
    /// observed in the cluster.
    #[error("invalid pod UID")]
    InvalidPodUid,

    /// The container ID asserted by the docker labels does not match the
    /// pod's container status.
    #[error("invalid container ID")]
    InvalidContainerId,

    /// Pod resolution is driven by docker container labels, so the kube
    /// probe cannot run without the docker probe.
    #[error("kube probe requires the docker probe")]
    KubeRequiresDocker,

    #[error("docker engine: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("kube api: {0}")]
    Kube(#[from] kube::Error),
}
