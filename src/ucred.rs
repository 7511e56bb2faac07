// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Peer credentials extracted from Unix-domain socket connections.
//!
//! On Linux the kernel attaches a `{pid, uid, gid}` triple to every
//! connected Unix socket (`SO_PEERCRED`); tonic surfaces it through the
//! connection info of streams accepted from a `UnixListener`. On other
//! platforms the triple is unavailable and callers fall back to
//! [`PeerCreds::unknown`].

use tonic::transport::server::UdsConnectInfo;

use crate::errors::Error;
use crate::propset::PropSet;

/// The identity of a connected peer, derived once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCreds {
    pub pid: i32,
    pub uid: u32,
    pub gid: u32,
}

impl PeerCreds {
    /// Placeholder credentials for peers whose identity could not be
    /// read. Resolution still runs, keyed on PID 0.
    pub fn unknown() -> Self {
        Self {
            pid: 0,
            uid: 0,
            gid: 0,
        }
    }

    pub fn prop_set(&self) -> PropSet {
        PropSet::new()
            .add_int("system-pid", i64::from(self.pid))
            .add_int("system-uid", i64::from(self.uid))
            .add_int("system-gid", i64::from(self.gid))
    }
}

/// Reads the peer credentials attached to an accepted request.
pub fn from_request<T>(request: &tonic::Request<T>) -> Result<PeerCreds, Error> {
    let info = request
        .extensions()
        .get::<UdsConnectInfo>()
        .ok_or(Error::InvalidConnection)?;
    let cred = info.peer_cred.ok_or(Error::InvalidConnection)?;
    from_ucred(cred)
}

#[cfg(target_os = "linux")]
fn from_ucred(cred: tokio::net::unix::UCred) -> Result<PeerCreds, Error> {
    match cred.pid() {
        Some(pid) => Ok(PeerCreds {
            pid,
            uid: cred.uid(),
            gid: cred.gid(),
        }),
        None => Err(Error::InvalidConnection),
    }
}

#[cfg(not(target_os = "linux"))]
fn from_ucred(_cred: tokio::net::unix::UCred) -> Result<PeerCreds, Error> {
    Err(Error::InvalidConnection)
}
