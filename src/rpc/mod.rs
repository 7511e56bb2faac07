// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Workload registration RPC over a Unix-domain socket.

pub mod client;
pub mod server;

pub use server::{serve, WorkloadService};
