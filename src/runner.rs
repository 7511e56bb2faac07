// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! One-shot timed upstream calls.

use std::future::Future;

use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use crate::errors::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A single invocation of an upstream operation with a deadline and a
/// cancellation handle. Completion is signalled exactly once; retries
/// are the caller's concern.
pub struct Runner<T> {
    rx: oneshot::Receiver<Result<T, Error>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> Runner<T> {
    pub fn spawn<F>(parent: &CancellationToken, op: F) -> Self
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        Self::spawn_with_timeout(parent, DEFAULT_TIMEOUT, op)
    }

    pub fn spawn_with_timeout<F>(parent: &CancellationToken, deadline: Duration, op: F) -> Self
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let cancel = parent.child_token();
        let (tx, rx) = oneshot::channel();
        let token = cancel.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => Err(Error::Cancelled),
                completed = timeout(deadline, op) => match completed {
                    Ok(inner) => inner,
                    Err(_) => Err(Error::Timeout),
                },
            };
            let _ = tx.send(outcome);
        });

        Self { rx, cancel }
    }

    /// Waits for the operation to finish. The result is delivered to the
    /// first `wait` that observes completion.
    pub async fn wait(&mut self) -> Result<T, Error> {
        match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Cancelled),
        }
    }

    /// Cancels the in-flight operation.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Awaits the runner in `slot` when one is present and pends forever
/// otherwise, so select loops can keep the branch disabled while no call
/// is in flight.
pub async fn wait_slot<T: Send + 'static>(slot: &mut Option<Runner<T>>) -> Result<T, Error> {
    match slot {
        Some(runner) => runner.wait().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_the_operation_result() {
        let root = CancellationToken::new();
        let mut runner = Runner::spawn(&root, async { Ok(7) });
        assert_eq!(runner.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn delivers_the_operation_error() {
        let root = CancellationToken::new();
        let mut runner: Runner<i32> = Runner::spawn(&root, async { Err(Error::NotFound) });
        assert!(matches!(runner.wait().await, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn stop_cancels_in_flight_work() {
        let root = CancellationToken::new();
        let mut runner: Runner<i32> = Runner::spawn(&root, async {
            std::future::pending::<()>().await;
            Ok(0)
        });

        runner.stop();
        assert!(matches!(runner.wait().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn parent_cancellation_propagates() {
        let root = CancellationToken::new();
        let mut runner: Runner<i32> = Runner::spawn(&root, async {
            std::future::pending::<()>().await;
            Ok(0)
        });

        root.cancel();
        assert!(matches!(runner.wait().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn deadline_elapses_as_timeout() {
        let root = CancellationToken::new();
        let mut runner: Runner<i32> =
            Runner::spawn_with_timeout(&root, Duration::from_millis(10), async {
                std::future::pending::<()>().await;
                Ok(0)
            });

        assert!(matches!(runner.wait().await, Err(Error::Timeout)));
    }
}
