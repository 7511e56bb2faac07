// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Informer-backed pod cache with pending lookups.
//!
//! One service loop owns an in-memory store of pods keyed by
//! `namespace/pod-name`, fed by a `kube` watcher stream. Lookups that
//! find no matching pod (or a pod whose container status is not yet
//! populated) park on a per-key pending list and are rechecked whenever
//! the informer applies that pod, bounded by the caller's deadline.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use kube::api::{Api, ListParams};
use kube::runtime::watcher::{self, Event};
use kube::Client;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::props::KubeProps;
use crate::docker::DockerProps;
use crate::errors::Error;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

const CONTAINER_ID_PREFIX: &str = "docker://";

const LABEL_POD_NAMESPACE: &str = "io.kubernetes.pod.namespace";
const LABEL_POD_NAME: &str = "io.kubernetes.pod.name";
const LABEL_POD_UID: &str = "io.kubernetes.pod.uid";
const LABEL_CONTAINER_NAME: &str = "io.kubernetes.container.name";

type PodStream = Pin<Box<dyn Stream<Item = Result<Event<Pod>, watcher::Error>> + Send>>;

/// Pod coordinates asserted by a container's docker labels.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryParams {
    namespace: String,
    pod_name: String,
    container_name: String,
    pod_uid: String,
    container_id: String,
}

impl QueryParams {
    fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.pod_name)
    }

    fn from_docker(dprops: &DockerProps) -> Result<Self, Error> {
        let field = |name: &str| -> Result<String, Error> {
            match dprops.labels.get(name) {
                Some(value) if !value.is_empty() => Ok(value.clone()),
                _ => Err(Error::ContainerNotRecognized),
            }
        };

        if dprops.id.is_empty() {
            return Err(Error::ContainerNotRecognized);
        }

        Ok(QueryParams {
            namespace: field(LABEL_POD_NAMESPACE)?,
            pod_name: field(LABEL_POD_NAME)?,
            container_name: field(LABEL_CONTAINER_NAME)?,
            pod_uid: field(LABEL_POD_UID)?,
            container_id: dprops.id.clone(),
        })
    }
}

struct LookupRequest {
    qp: QueryParams,
    reply: oneshot::Sender<Result<KubeProps, Error>>,
    cancel: CancellationToken,
}

struct PendingRequest {
    serial: u64,
    qp: QueryParams,
    reply: Option<oneshot::Sender<Result<KubeProps, Error>>>,
}

/// The kube probe service.
pub struct KubeService {
    request_tx: mpsc::Sender<LookupRequest>,
    cancel: CancellationToken,
    join: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl KubeService {
    /// Connects to the cluster (in-cluster configuration with a
    /// kubeconfig fallback), verifies the pod API responds, and starts
    /// the informer.
    pub async fn connect(parent: &CancellationToken, namespace: &str) -> Result<Self, Error> {
        let client = Client::try_default().await?;
        let pods: Api<Pod> = Api::namespaced(client, namespace);

        let listed = pods.list(&ListParams::default().limit(1)).await?;
        debug!(namespace, kube_pods = listed.items.len(), "connected to kube");

        let stream = watcher::watcher(pods, watcher::Config::default());
        Ok(Self::with_stream(parent, stream))
    }

    pub(crate) fn with_stream<S>(parent: &CancellationToken, stream: S) -> Self
    where
        S: Stream<Item = Result<Event<Pod>, watcher::Error>> + Send + 'static,
    {
        let cancel = parent.child_token();
        let (request_tx, request_rx) = mpsc::channel(1);
        let join = tokio::spawn(run(cancel.clone(), Box::pin(stream), request_rx));
        Self {
            request_tx,
            cancel,
            join: tokio::sync::Mutex::new(Some(join)),
        }
    }

    /// Resolves the pod and container status named by a container's
    /// docker labels, waiting up to [`LOOKUP_TIMEOUT`] for the informer
    /// to observe the pod.
    pub async fn lookup(&self, dprops: &DockerProps) -> Result<KubeProps, Error> {
        let qp = QueryParams::from_docker(dprops)?;
        debug!(docker_id = %dprops.id, lookup_key = %qp.key(), "resolving pod");

        let deadline = CancellationToken::new();
        let _guard = deadline.clone().drop_guard();

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = LookupRequest {
            qp,
            reply: reply_tx,
            cancel: deadline.clone(),
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::NotRunning),
            _ = sleep(LOOKUP_TIMEOUT) => Err(Error::NotFound),
            outcome = async {
                self.request_tx
                    .send(request)
                    .await
                    .map_err(|_| Error::NotRunning)?;
                match reply_rx.await {
                    Ok(result) => result,
                    Err(_) => Err(Error::NotRunning),
                }
            } => outcome,
        }
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.join.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn run(
    cancel: CancellationToken,
    mut stream: PodStream,
    mut request_rx: mpsc::Receiver<LookupRequest>,
) {
    let (purge_tx, mut purge_rx) = mpsc::channel::<(String, u64)>(1);
    let mut store: HashMap<String, Pod> = HashMap::new();
    let mut pending: HashMap<String, Vec<PendingRequest>> = HashMap::new();
    let mut serial: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            item = stream.next() => {
                match item {
                    Some(Ok(event)) => handle_event(&mut store, &mut pending, event),
                    Some(Err(err)) => warn!(error = %err, "watch error, will retry"),
                    None => {
                        debug!("watch stream ended");
                        break;
                    }
                }
            }

            Some(request) = request_rx.recv() => {
                serial += 1;
                handle_request(&store, &mut pending, request, serial, &purge_tx);
            }

            Some((key, serial)) = purge_rx.recv() => {
                purge_request(&mut pending, &key, serial);
            }
        }
    }

    let outstanding: usize = pending.values().map(Vec::len).sum();
    debug!(pending = outstanding, "draining pod requests");
    while !pending.is_empty() {
        match purge_rx.recv().await {
            Some((key, serial)) => purge_request(&mut pending, &key, serial),
            None => break,
        }
    }
    debug!("kube service done");
}

fn pod_key(pod: &Pod) -> Option<String> {
    let namespace = pod.metadata.namespace.as_deref()?;
    let name = pod.metadata.name.as_deref()?;
    Some(format!("{namespace}/{name}"))
}

/// The store is owned here and written only from informer events; an
/// applied pod triggers a recheck of its key's pending requests.
fn handle_event(
    store: &mut HashMap<String, Pod>,
    pending: &mut HashMap<String, Vec<PendingRequest>>,
    event: Event<Pod>,
) {
    match event {
        Event::Apply(pod) | Event::InitApply(pod) => {
            let Some(key) = pod_key(&pod) else { return };
            store.insert(key.clone(), pod);
            recheck(store, pending, &key);
        }
        Event::Delete(pod) => {
            if let Some(key) = pod_key(&pod) {
                store.remove(&key);
            }
        }
        Event::Init => debug!("watch init"),
        Event::InitDone => debug!("watch init done"),
    }
}

/// Reruns every pending request for `key` against the stored pod.
/// Matches resolve through their single-use reply slots (callers that
/// timed out already are silently missed); failed matches stay pending
/// until their deadlines purge them.
fn recheck(
    store: &HashMap<String, Pod>,
    pending: &mut HashMap<String, Vec<PendingRequest>>,
    key: &str,
) {
    let Some(pod) = store.get(key) else { return };
    let Some(requests) = pending.get_mut(key) else {
        return;
    };

    debug!(lookup_key = %key, requests = requests.len(), "rechecking requests");

    for request in requests.iter_mut() {
        if let Ok(Some(props)) = match_query(&request.qp, pod) {
            if let Some(reply) = request.reply.take() {
                let _ = reply.send(Ok(props));
            }
        }
    }

    requests.retain(|request| request.reply.is_some());
    if requests.is_empty() {
        pending.remove(key);
    }
}

fn handle_request(
    store: &HashMap<String, Pod>,
    pending: &mut HashMap<String, Vec<PendingRequest>>,
    request: LookupRequest,
    serial: u64,
    purge_tx: &mpsc::Sender<(String, u64)>,
) {
    let key = request.qp.key();

    if let Some(pod) = store.get(&key) {
        match match_query(&request.qp, pod) {
            Ok(Some(props)) => {
                let _ = request.reply.send(Ok(props));
                return;
            }
            Ok(None) => {}
            Err(err) => {
                let _ = request.reply.send(Err(err));
                return;
            }
        }
    }

    debug!(lookup_key = %key, "pod not matched, waiting for updates");
    pending.entry(key.clone()).or_default().push(PendingRequest {
        serial,
        qp: request.qp,
        reply: Some(request.reply),
    });

    let purge_tx = purge_tx.clone();
    let cancel = request.cancel;
    tokio::spawn(async move {
        cancel.cancelled().await;
        let _ = purge_tx.send((key, serial)).await;
    });
}

fn purge_request(
    pending: &mut HashMap<String, Vec<PendingRequest>>,
    key: &str,
    serial: u64,
) {
    let Some(requests) = pending.get_mut(key) else {
        return;
    };
    requests.retain(|request| request.serial != serial);
    if requests.is_empty() {
        pending.remove(key);
    }
}

/// Matches the asserted query parameters against a stored pod.
///
/// `Ok(None)` means "no match yet, retry later": the named container
/// status is missing or its container id is not populated. A UID or
/// container-id disagreement is drift between what the docker labels
/// assert and what the cluster observes, and fails the lookup.
fn match_query(qp: &QueryParams, pod: &Pod) -> Result<Option<KubeProps>, Error> {
    let uid = pod.metadata.uid.as_deref().unwrap_or_default();
    if uid != qp.pod_uid {
        warn!(lookup_key = %qp.key(), "mismatched pod uid");
        return Err(Error::InvalidPodUid);
    }

    let statuses = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref());
    let Some(statuses) = statuses else {
        return Ok(None);
    };

    for status in statuses {
        if status.name != qp.container_name {
            continue;
        }

        let container_id = status.container_id.as_deref().unwrap_or_default();
        if container_id.is_empty() {
            debug!(lookup_key = %qp.key(), "container id not yet populated");
            return Ok(None);
        }

        let expected = format!("{CONTAINER_ID_PREFIX}{}", qp.container_id);
        if container_id != expected {
            warn!(
                kube_container_id = %container_id,
                docker_container_id = %qp.container_id,
                "mismatched container id"
            );
            return Err(Error::InvalidContainerId);
        }

        debug!(
            kube_ns = %qp.namespace,
            kube_pod = %qp.pod_name,
            kube_container = %status.name,
            "container found"
        );
        return Ok(Some(props_from(pod, status)));
    }

    debug!(lookup_key = %qp.key(), "container status not found");
    Ok(None)
}

fn props_from(pod: &Pod, status: &ContainerStatus) -> KubeProps {
    KubeProps {
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        pod_name: pod.metadata.name.clone().unwrap_or_default(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        annotations: pod.metadata.annotations.clone().unwrap_or_default(),
        container_name: status.name.clone(),
    }
}
