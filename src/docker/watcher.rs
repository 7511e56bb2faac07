// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Push-based container event subscription.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::{DockerApi, EngineEvent};
use super::{EventKind, WatchEvent};

pub const EVENT_BUFFER: usize = 20;
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

const ACTION_START: &str = "start";
const ACTION_DIE: &str = "die";

/// Subscribes to engine container events and emits `start` as create and
/// `die` as delete. Events overflowing the buffer are dropped: the
/// lister reconciles on its next tick. On stream failure the watcher
/// re-subscribes from the last observed event timestamp, so no events
/// are missed across the gap.
pub struct Watcher {
    pub events: mpsc::Receiver<WatchEvent>,
    pub handle: JoinHandle<()>,
}

impl Watcher {
    pub fn spawn(parent: &CancellationToken, api: Arc<dyn DockerApi>) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = parent.child_token();
        let handle = tokio::spawn(run(cancel, api, tx));
        Self { events: rx, handle }
    }
}

async fn run(cancel: CancellationToken, api: Arc<dyn DockerApi>, events: mpsc::Sender<WatchEvent>) {
    let mut since: Option<DateTime<Utc>> = None;

    while !cancel.is_cancelled() {
        let subscribed = tokio::select! {
            _ = cancel.cancelled() => break,
            subscribed = api.events(since) => subscribed,
        };

        let mut stream = match subscribed {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "event subscription failed");
                pause(&cancel).await;
                continue;
            }
        };

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(event)) => {
                    if let Some(timestamp) = event.timestamp {
                        since = Some(timestamp);
                    }
                    let Some(mapped) = map_event(&event) else {
                        continue;
                    };
                    match events.try_send(mapped) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(dropped)) => {
                            warn!(docker_id = %dropped.id, "dropping event");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => return,
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "event stream failed");
                    break;
                }
                None => {
                    debug!("event stream ended");
                    break;
                }
            }
        }

        pause(&cancel).await;
    }

    debug!("watcher done");
}

/// Maps a container-scoped engine event onto a watch event; anything but
/// `start`/`die`, or an event without an actor id, is ignored.
fn map_event(event: &EngineEvent) -> Option<WatchEvent> {
    if event.id.is_empty() {
        return None;
    }
    let kind = match event.action.as_str() {
        ACTION_START => EventKind::Create,
        ACTION_DIE => EventKind::Delete,
        _ => return None,
    };
    Some(WatchEvent {
        kind,
        id: event.id.clone(),
    })
}

async fn pause(cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(RECONNECT_PAUSE) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::ContainerSnapshot;
    use crate::errors::Error;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use std::sync::Mutex;
    use tokio::time::timeout;
    use tokio_stream::wrappers::ReceiverStream;

    fn event(action: &str, id: &str) -> EngineEvent {
        EngineEvent {
            action: action.into(),
            id: id.into(),
            timestamp: None,
        }
    }

    #[test]
    fn maps_start_to_create_and_die_to_delete() {
        assert_eq!(
            map_event(&event("start", "abc")),
            Some(WatchEvent {
                kind: EventKind::Create,
                id: "abc".into()
            })
        );
        assert_eq!(
            map_event(&event("die", "abc")),
            Some(WatchEvent {
                kind: EventKind::Delete,
                id: "abc".into()
            })
        );
    }

    #[test]
    fn ignores_other_actions_and_empty_ids() {
        assert_eq!(map_event(&event("pause", "abc")), None);
        assert_eq!(map_event(&event("start", "")), None);
    }

    struct StreamApi {
        streams: Mutex<Vec<mpsc::Receiver<Result<EngineEvent, Error>>>>,
        since_seen: Mutex<Vec<Option<DateTime<Utc>>>>,
    }

    #[async_trait]
    impl DockerApi for StreamApi {
        async fn ping(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn list_running(&self) -> Result<Vec<String>, Error> {
            Ok(Vec::new())
        }

        async fn inspect(&self, _id: &str) -> Result<ContainerSnapshot, Error> {
            Err(Error::NotFound)
        }

        async fn events(
            &self,
            since: Option<DateTime<Utc>>,
        ) -> Result<BoxStream<'static, Result<EngineEvent, Error>>, Error> {
            self.since_seen.lock().unwrap().push(since);
            let mut streams = self.streams.lock().unwrap();
            if streams.is_empty() {
                return Ok(futures::stream::pending().boxed());
            }
            Ok(ReceiverStream::new(streams.remove(0)).boxed())
        }
    }

    #[tokio::test]
    async fn forwards_mapped_events() {
        let (tx, stream_rx) = mpsc::channel(4);
        let api = Arc::new(StreamApi {
            streams: Mutex::new(vec![stream_rx]),
            since_seen: Mutex::new(Vec::new()),
        });

        let root = CancellationToken::new();
        let mut watcher = Watcher::spawn(&root, api);

        tx.send(Ok(event("start", "abc"))).await.unwrap();
        tx.send(Ok(event("attach", "abc"))).await.unwrap();
        tx.send(Ok(event("die", "abc"))).await.unwrap();

        let first = timeout(Duration::from_secs(5), watcher.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.kind, EventKind::Create);

        let second = timeout(Duration::from_secs(5), watcher.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.kind, EventKind::Delete);

        root.cancel();
        let _ = watcher.handle.await;
    }

    #[tokio::test]
    async fn resubscribes_from_last_event_timestamp() {
        let (tx, stream_rx) = mpsc::channel(4);
        let api = Arc::new(StreamApi {
            streams: Mutex::new(vec![stream_rx]),
            since_seen: Mutex::new(Vec::new()),
        });

        let root = CancellationToken::new();
        let mut watcher = Watcher::spawn(&root, api.clone());

        let stamp = DateTime::from_timestamp(1_700_000_000, 0);
        tx.send(Ok(EngineEvent {
            action: ACTION_START.into(),
            id: "abc".into(),
            timestamp: stamp,
        }))
        .await
        .unwrap();

        let _ = timeout(Duration::from_secs(5), watcher.events.recv())
            .await
            .unwrap()
            .unwrap();

        // Ending the stream forces a resubscription.
        drop(tx);

        timeout(Duration::from_secs(5), async {
            loop {
                if api.since_seen.lock().unwrap().len() >= 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        let seen = api.since_seen.lock().unwrap();
        assert_eq!(seen[0], None);
        assert_eq!(seen[1], stamp);

        root.cancel();
        let _ = watcher.handle.await;
    }
}
