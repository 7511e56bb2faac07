// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Periodic container enumeration, delivered as deltas.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::client::DockerApi;
use super::{EventKind, WatchEvent};
use crate::runner::{self, Runner};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

/// Periodically enumerates running containers and emits the delta
/// against its previous enumeration as create/delete events. Every tick
/// produces a delivery, even an empty one: the supervisor uses delivery
/// boundaries to age out containers the lister no longer sees.
///
/// The committed enumeration advances only once a delta is delivered;
/// while the consumer is slow, later fetches keep diffing against the
/// same committed set and replace the pending delta.
///
/// A fetch error terminates the lister; the supervisor treats that as an
/// early-completion signal.
pub struct Lister {
    pub deltas: mpsc::Receiver<Vec<WatchEvent>>,
    pub handle: JoinHandle<()>,
}

impl Lister {
    pub fn spawn(parent: &CancellationToken, api: Arc<dyn DockerApi>) -> Self {
        Self::with_period(parent, api, DEFAULT_PERIOD)
    }

    pub fn with_period(
        parent: &CancellationToken,
        api: Arc<dyn DockerApi>,
        period: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let cancel = parent.child_token();
        let handle = tokio::spawn(run(cancel, api, period, tx));
        Self {
            deltas: rx,
            handle,
        }
    }
}

async fn run(
    cancel: CancellationToken,
    api: Arc<dyn DockerApi>,
    period: Duration,
    deltas: mpsc::Sender<Vec<WatchEvent>>,
) {
    let mut committed: HashSet<String> = HashSet::new();
    let mut fetch: Option<Runner<Vec<String>>> = Some(spawn_fetch(&cancel, &api));
    let mut pending: Option<(Vec<WatchEvent>, HashSet<String>)> = None;
    let mut next_fetch: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            fetched = runner::wait_slot(&mut fetch), if fetch.is_some() => {
                fetch = None;
                match fetched {
                    Ok(ids) => {
                        let current: HashSet<String> = ids.into_iter().collect();
                        let delta = diff(&committed, &current);
                        debug!(
                            containers = current.len(),
                            events = delta.len(),
                            "list complete"
                        );
                        pending = Some((delta, current));
                        next_fetch = Some(Instant::now() + period);
                    }
                    Err(err) => {
                        error!(error = %err, "container list failed");
                        break;
                    }
                }
            }

            permit = deltas.reserve(), if pending.is_some() => {
                let Ok(permit) = permit else { break };
                if let Some((delta, next)) = pending.take() {
                    debug!(events = delta.len(), "delta delivered");
                    permit.send(delta);
                    committed = next;
                }
            }

            _ = sleep_until_opt(next_fetch), if next_fetch.is_some() => {
                next_fetch = None;
                fetch = Some(spawn_fetch(&cancel, &api));
            }
        }
    }

    if let Some(mut in_flight) = fetch.take() {
        in_flight.stop();
        let _ = in_flight.wait().await;
    }
    debug!("lister done");
}

fn spawn_fetch(cancel: &CancellationToken, api: &Arc<dyn DockerApi>) -> Runner<Vec<String>> {
    let api = api.clone();
    Runner::spawn(cancel, async move { api.list_running().await })
}

/// Delta between the committed and current running sets: a create event
/// per id newly present, a delete event per id newly absent.
fn diff(committed: &HashSet<String>, current: &HashSet<String>) -> Vec<WatchEvent> {
    let mut events: Vec<WatchEvent> = current
        .iter()
        .filter(|id| !committed.contains(*id))
        .map(|id| WatchEvent {
            kind: EventKind::Create,
            id: id.clone(),
        })
        .collect();

    events.extend(
        committed
            .iter()
            .filter(|id| !current.contains(*id))
            .map(|id| WatchEvent {
                kind: EventKind::Delete,
                id: id.clone(),
            }),
    );

    events
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::super::client::EngineEvent;
    use super::*;
    use crate::errors::Error;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use futures::stream::BoxStream;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::timeout;

    struct FrameApi {
        frames: Mutex<VecDeque<Result<Vec<String>, Error>>>,
    }

    impl FrameApi {
        fn new(frames: Vec<Result<Vec<String>, Error>>) -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(frames.into()),
            })
        }
    }

    #[async_trait]
    impl DockerApi for FrameApi {
        async fn ping(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn list_running(&self) -> Result<Vec<String>, Error> {
            match self.frames.lock().unwrap().pop_front() {
                Some(frame) => frame,
                None => Ok(Vec::new()),
            }
        }

        async fn inspect(&self, _id: &str) -> Result<crate::docker::ContainerSnapshot, Error> {
            Err(Error::NotFound)
        }

        async fn events(
            &self,
            _since: Option<DateTime<Utc>>,
        ) -> Result<BoxStream<'static, Result<EngineEvent, Error>>, Error> {
            Ok(futures::stream::pending().boxed())
        }
    }

    fn sorted(mut events: Vec<WatchEvent>) -> Vec<WatchEvent> {
        events.sort_by(|a, b| a.id.cmp(&b.id));
        events
    }

    #[test]
    fn diff_is_exact() {
        let committed: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let current: HashSet<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();

        let events = sorted(diff(&committed, &current));
        assert_eq!(
            events,
            vec![
                WatchEvent {
                    kind: EventKind::Delete,
                    id: "a".into()
                },
                WatchEvent {
                    kind: EventKind::Create,
                    id: "c".into()
                },
            ]
        );
    }

    #[test]
    fn diff_of_identical_sets_is_empty() {
        let set: HashSet<String> = ["a"].iter().map(|s| s.to_string()).collect();
        assert!(diff(&set, &set).is_empty());
    }

    #[tokio::test]
    async fn delivers_creates_then_deletes() {
        let api = FrameApi::new(vec![
            Ok(vec!["a".into(), "b".into()]),
            Ok(vec!["b".into()]),
        ]);
        let root = CancellationToken::new();
        let mut lister = Lister::with_period(&root, api, Duration::from_millis(20));

        let first = timeout(Duration::from_secs(5), lister.deltas.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            sorted(first),
            vec![
                WatchEvent {
                    kind: EventKind::Create,
                    id: "a".into()
                },
                WatchEvent {
                    kind: EventKind::Create,
                    id: "b".into()
                },
            ]
        );

        let second = timeout(Duration::from_secs(5), lister.deltas.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            second,
            vec![WatchEvent {
                kind: EventKind::Delete,
                id: "a".into()
            }]
        );

        root.cancel();
        let _ = lister.handle.await;
    }

    #[tokio::test]
    async fn delivers_empty_deltas_on_quiet_ticks() {
        let api = FrameApi::new(vec![Ok(vec!["a".into()]), Ok(vec!["a".into()])]);
        let root = CancellationToken::new();
        let mut lister = Lister::with_period(&root, api, Duration::from_millis(20));

        let first = timeout(Duration::from_secs(5), lister.deltas.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.len(), 1);

        let second = timeout(Duration::from_secs(5), lister.deltas.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(second.is_empty());

        root.cancel();
        let _ = lister.handle.await;
    }

    #[tokio::test]
    async fn terminates_on_fetch_error() {
        let api = FrameApi::new(vec![Err(Error::Timeout)]);
        let root = CancellationToken::new();
        let mut lister = Lister::with_period(&root, api, Duration::from_millis(20));

        let delivered = timeout(Duration::from_secs(5), lister.deltas.recv())
            .await
            .unwrap();
        assert!(delivered.is_none());
        let _ = lister.handle.await;
    }
}
