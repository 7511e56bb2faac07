// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Resolve which container and pod a local process belongs to.
#[derive(Parser, Debug)]
#[command(name = "dd-workloadid")]
#[command(about = "Workload identity daemon for local processes")]
pub struct Args {
    /// Path of the daemon's Unix socket
    #[arg(short = 's', long, default_value = "/tmp/dd-workloadid.sock")]
    pub socket: PathBuf,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the resolution daemon
    Server {
        /// Enable the docker probe
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        docker: bool,

        /// Enable the kube probe (requires the docker probe)
        #[arg(long, default_value_t = false, action = ArgAction::Set)]
        kube: bool,

        /// Namespace watched by the kube probe
        #[arg(long, default_value = "default")]
        kube_namespace: String,
    },

    /// Register this process with a running daemon
    Client,

    /// Resolve the given host PIDs directly and print their properties
    Pid {
        /// PIDs to resolve
        #[arg(required = true)]
        pids: Vec<i32>,
    },
}
