// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Probe chain: docker first, then kube, with best-effort merging.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::docker::DockerService;
use crate::errors::Error;
use crate::kube::{KubeService, DEFAULT_NAMESPACE};
use crate::propset::PropSet;

/// Probe selection.
#[derive(Debug, Clone)]
pub struct Config {
    pub docker: bool,
    pub kube: bool,
    pub kube_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker: true,
            kube: false,
            kube_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// The discovery strategy chains the enabled probes and merges whatever
/// they find. Probe failures degrade to a partial result: the daemon's
/// value is best-effort enrichment, so a lookup never fails outright.
pub struct Strategy {
    docker: Option<DockerService>,
    kube: Option<KubeService>,
}

impl Strategy {
    /// Builds the probe chain. The kube probe locates pods through
    /// docker container labels, so enabling it without the docker probe
    /// is rejected.
    pub async fn build(parent: &CancellationToken, config: &Config) -> Result<Self, Error> {
        if config.kube && !config.docker {
            return Err(Error::KubeRequiresDocker);
        }

        let docker = if config.docker {
            Some(DockerService::connect(parent).await?)
        } else {
            None
        };

        let kube = if config.kube {
            match KubeService::connect(parent, &config.kube_namespace).await {
                Ok(service) => Some(service),
                Err(err) => {
                    if let Some(docker) = &docker {
                        docker.shutdown().await;
                    }
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(Self { docker, kube })
    }

    pub fn with_probes(docker: Option<DockerService>, kube: Option<KubeService>) -> Self {
        Self { docker, kube }
    }

    /// Resolves properties for `pid`. The result always carries the
    /// system PID; docker and kube attributes are merged in as far as
    /// resolution gets.
    pub async fn lookup(&self, pid: i32) -> PropSet {
        let mut props = PropSet::new().add_int("system-pid", i64::from(pid));

        let Some(docker) = &self.docker else {
            return props;
        };

        let dprops = match docker.lookup(pid).await {
            Ok(dprops) => dprops,
            Err(err) => {
                debug!(pid, error = %err, "docker lookup failed");
                return props;
            }
        };
        props.merge(dprops.prop_set());

        if let Some(kube) = &self.kube {
            match kube.lookup(&dprops).await {
                Ok(kprops) => props.merge(kprops.prop_set()),
                Err(err) => debug!(pid, error = %err, "kube lookup failed"),
            }
        }

        props
    }

    /// Shuts the probes down in parallel; returns when both are done.
    pub async fn shutdown(&self) {
        let docker = async {
            if let Some(docker) = &self.docker {
                docker.shutdown().await;
            }
        };
        let kube = async {
            if let Some(kube) = &self.kube {
                kube.shutdown().await;
            }
        };
        tokio::join!(docker, kube);
    }
}
