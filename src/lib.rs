// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Workload identity resolution for local processes.
//!
//! A daemon listens on a Unix-domain socket; peers connect and issue an
//! empty `Register` RPC. The daemon reads the peer's `{pid, uid, gid}`
//! from the kernel's socket credentials (`SO_PEERCRED`) and resolves the
//! PID through a chain of probes: a docker probe mapping PID to
//! container, and a kube probe mapping container to pod and container
//! status. The union of everything discovered comes back as a flat
//! property set.
//!
//! Each probe is a long-lived, self-healing service that keeps an
//! eventually-consistent cache of upstream state fed by two redundant
//! sources (a periodic lister and a push-based event watcher). Lookups
//! that cannot be answered from the cache block, bounded by a deadline,
//! and wake as soon as the missing entity is observed.

pub mod discovery;
pub mod docker;
pub mod errors;
pub mod kube;
pub mod proc;
pub mod propset;
pub mod rpc;
pub mod runner;
pub mod ucred;

// Generated protobuf types
pub mod proto {
    pub mod workloadid {
        tonic::include_proto!("workloadid.v1");

        // Include file descriptor for reflection
        pub const FILE_DESCRIPTOR_SET: &[u8] =
            tonic::include_file_descriptor_set!("workloadid_descriptor");
    }
}

pub use errors::Error;
pub use propset::PropSet;
