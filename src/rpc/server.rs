// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! gRPC server bound to a Unix socket.
//!
//! The `Register` request body is empty; the peer's identity is read
//! from the socket credentials the kernel attached to the connection.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::discovery::Strategy;
use crate::proto::workloadid::workload_server::{Workload, WorkloadServer};
use crate::proto::workloadid::{RegisterRequest, RegisterResponse, FILE_DESCRIPTOR_SET};
use crate::ucred::{self, PeerCreds};

/// gRPC implementation of the workload registration service.
pub struct WorkloadService {
    strategy: Arc<Strategy>,
}

impl WorkloadService {
    pub fn new(strategy: Arc<Strategy>) -> Self {
        Self { strategy }
    }
}

#[tonic::async_trait]
impl Workload for WorkloadService {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let creds = match ucred::from_request(&request) {
            Ok(creds) => creds,
            Err(err) => {
                warn!(error = %err, "peer credentials unavailable");
                PeerCreds::unknown()
            }
        };

        info!(
            pid = creds.pid,
            uid = creds.uid,
            gid = creds.gid,
            "register request"
        );

        let mut props = creds.prop_set();
        props.merge(self.strategy.lookup(creds.pid).await);

        info!("resolved workload properties:\n{props}");

        Ok(Response::new(RegisterResponse {}))
    }
}

fn setup_socket(path: &Path) -> anyhow::Result<UnixListener> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::remove_file(path)
        .or_else(|err| {
            if err.kind() == ErrorKind::NotFound {
                Ok(())
            } else {
                Err(err)
            }
        })
        .context("failed to remove existing socket")?;

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }
    }

    let listener = UnixListener::bind(path).context("could not bind socket")?;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660))
        .context("could not set socket permissions")?;

    Ok(listener)
}

/// Serves the workload RPC on `path` until `shutdown` fires. The
/// listener closes on shutdown and in-flight requests drain naturally;
/// the socket file is removed on the way out.
pub async fn serve(
    path: &Path,
    strategy: Arc<Strategy>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = setup_socket(path)?;
    info!(socket = %path.display(), "grpc server listening");

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build()
        .context("failed to build reflection service")?;

    let result = Server::builder()
        .add_service(WorkloadServer::new(WorkloadService::new(strategy)))
        .add_service(reflection)
        .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown.cancelled())
        .await;

    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != ErrorKind::NotFound {
            warn!(error = %err, "could not remove socket file");
        }
    }

    result.context("grpc server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn setup_socket_binds_and_replaces_stale_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("workloadid.sock");

        std::fs::write(&path, b"stale").unwrap();

        let listener = setup_socket(&path).unwrap();
        drop(listener);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn setup_socket_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("workloadid.sock");

        let listener = setup_socket(&path).unwrap();
        drop(listener);
        assert!(path.exists());
    }
}
