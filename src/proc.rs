// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Host process-table introspection.
//!
//! The docker registry walks PID chains upward through the process tree;
//! that walk goes through the [`ProcessTable`] trait so tests can
//! substitute a canned tree.

use std::env;
use std::fs;
use std::path::PathBuf;

/// Parent-PID resolution over the host process table.
pub trait ProcessTable: Send + Sync + 'static {
    /// Parent PID of `pid`, or `None` when the process cannot be
    /// inspected (it exited, or the walk is not permitted).
    fn parent_of(&self, pid: i32) -> Option<i32>;
}

/// `/proc`-backed process table.
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new() -> Self {
        Self {
            root: default_root(),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

fn default_root() -> PathBuf {
    if let Ok(root) = env::var("HOST_PROC") {
        return root.into();
    }
    "/proc".into()
}

impl ProcessTable for ProcFs {
    fn parent_of(&self, pid: i32) -> Option<i32> {
        if pid <= 0 {
            return None;
        }
        let stat = fs::read_to_string(self.root.join(pid.to_string()).join("stat")).ok()?;
        parse_ppid(&stat)
    }
}

/// Extracts the ppid (field 4) from `/proc/<pid>/stat`. The comm field
/// may itself contain spaces and parentheses, so fields are taken after
/// the last `)`.
fn parse_ppid(stat: &str) -> Option<i32> {
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parses_ppid_from_stat_line() {
        assert_eq!(parse_ppid("300 (worker) S 200 300 100 0 -1"), Some(200));
    }

    #[test]
    fn parses_ppid_with_hostile_comm() {
        assert_eq!(
            parse_ppid("300 (a b) c) R 200 300 100 0 -1"),
            Some(200)
        );
    }

    #[test]
    fn rejects_malformed_stat_line() {
        assert_eq!(parse_ppid("garbage"), None);
        assert_eq!(parse_ppid("300 (worker) S"), None);
    }

    #[test]
    fn reads_parent_from_proc_root() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("300");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("stat"), "300 (worker) S 200 300 100 0 -1").unwrap();

        let procs = ProcFs::with_root(root.path());
        assert_eq!(procs.parent_of(300), Some(200));
        assert_eq!(procs.parent_of(999), None);
        assert_eq!(procs.parent_of(0), None);
        assert_eq!(procs.parent_of(-1), None);
    }
}
