// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

use dd_workloadid::discovery::{Config, Strategy};
use dd_workloadid::rpc;

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    match args.command {
        Command::Server {
            docker,
            kube,
            kube_namespace,
        } => {
            run_server(
                &args.socket,
                Config {
                    docker,
                    kube,
                    kube_namespace,
                },
            )
            .await
        }
        Command::Client => rpc::client::register(&args.socket).await,
        Command::Pid { pids } => run_pid(&pids).await,
    }
}

async fn run_server(socket: &Path, config: Config) -> Result<()> {
    let root = CancellationToken::new();
    let strategy = Arc::new(
        Strategy::build(&root, &config)
            .await
            .context("failed to build discovery strategy")?,
    );

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    let shutdown = root.child_token();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
            shutdown.cancel();
        });
    }

    let result = rpc::server::serve(socket, strategy.clone(), shutdown).await;

    info!("shutting down probes");
    strategy.shutdown().await;

    result
}

async fn run_pid(pids: &[i32]) -> Result<()> {
    let root = CancellationToken::new();
    let strategy = Strategy::build(&root, &Config::default())
        .await
        .context("failed to build discovery strategy")?;

    for pid in pids {
        info!(pid, "looking up");
        let props = strategy.lookup(*pid).await;
        println!("{props}");
    }

    strategy.shutdown().await;
    Ok(())
}
