// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Client side of the registration RPC.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::net::UnixStream;
use tonic::transport::{Endpoint, Uri};
use tower::service_fn;
use tracing::info;

use crate::proto::workloadid::workload_client::WorkloadClient;
use crate::proto::workloadid::RegisterRequest;

/// Connects to the daemon socket and issues a single `Register` call.
/// The daemon identifies this process from the socket credentials; the
/// request itself is empty.
pub async fn register(path: &Path) -> anyhow::Result<()> {
    info!(socket = %path.display(), "connecting");

    let socket = PathBuf::from(path);
    // The URI is required by the endpoint builder but never resolved;
    // every connection goes through the Unix socket connector.
    let channel = Endpoint::try_from("http://[::]:50051")
        .context("invalid endpoint")?
        .connect_with_connector(service_fn(move |_: Uri| {
            UnixStream::connect(socket.clone())
        }))
        .await
        .context("could not connect to daemon socket")?;

    let mut client = WorkloadClient::new(channel);
    client
        .register(RegisterRequest {})
        .await
        .context("register call failed")?;

    info!("ok");
    Ok(())
}
