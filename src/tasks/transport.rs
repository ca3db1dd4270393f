//! Transport Boundary
//!
//! The dispatcher hands every task to a `Transport` and never waits for remote
//! acknowledgement. Two implementations ship with the crate:
//!
//! - **`LocalTransport`**: writes straight into a shared `TaskQueue`, playing the
//!   role of the farm's shared task store. Used for in-process farms and tests.
//! - **`HttpTransport`**: one ordered outbound worker per peer, draining a per-peer
//!   backlog. Persisted tasks are retried with backoff until delivered or the peer
//!   leaves the registry; memory-only tasks get a single attempt, and only while the
//!   peer is reachable.
//!
//! Undelivered tasks stay inside the transport, so the health monitor reaches them
//! through `purge_memory_only` and `forget_server`.

use super::protocol::{DeliverTaskRequest, ENDPOINT_DELIVER_TASK};
use super::queue::TaskQueue;
use super::types::{TaskEnvelope, TaskTarget};
use crate::error::{FarmError, FarmResult};
use crate::farm::registry::ServerRegistry;
use crate::farm::types::{ServerId, ServerSnapshot};

use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Accepts a task for delivery and returns how many target servers it was queued for.
    ///
    /// Must not wait on any remote node.
    async fn send(&self, envelope: TaskEnvelope) -> FarmResult<usize>;

    /// Drops every memory-only task still waiting to reach `server`.
    ///
    /// Returns the number of tasks dropped.
    fn purge_memory_only(&self, server: &ServerId) -> usize;

    /// Drops everything still waiting for a server that left the farm.
    fn forget_server(&self, server: &ServerId) -> usize;
}

/// Resolves the servers a task must reach, applying the memory-only reachability rule.
async fn resolve_targets(
    registry: &ServerRegistry,
    envelope: &TaskEnvelope,
) -> FarmResult<Vec<ServerSnapshot>> {
    let memory_only = envelope.task.is_memory_only();

    match envelope.task.target() {
        TaskTarget::AllOthers => Ok(registry.fan_out_targets(&envelope.sender, memory_only).await),
        TaskTarget::Server(id) => {
            let server = registry
                .snapshot(id)
                .await
                .ok_or_else(|| FarmError::UnknownServer(id.0.clone()))?;

            if memory_only && !server.status.accepts_memory_tasks() {
                tracing::debug!(
                    "Dropping memory-only task {} for {} ({:?})",
                    envelope.id,
                    id,
                    server.status
                );
                return Ok(Vec::new());
            }
            Ok(vec![server])
        }
    }
}

pub struct LocalTransport {
    registry: Arc<ServerRegistry>,
    queue: Arc<TaskQueue>,
}

impl LocalTransport {
    pub fn new(registry: Arc<ServerRegistry>, queue: Arc<TaskQueue>) -> Arc<Self> {
        Arc::new(Self { registry, queue })
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, envelope: TaskEnvelope) -> FarmResult<usize> {
        let targets = resolve_targets(&self.registry, &envelope).await?;
        let envelope = Arc::new(envelope);

        for target in &targets {
            self.queue.push(&target.id, envelope.clone());
        }

        tracing::debug!(
            "Task {} ({}) queued for {} server(s)",
            envelope.id,
            envelope.task.type_tag(),
            targets.len()
        );
        Ok(targets.len())
    }

    fn purge_memory_only(&self, server: &ServerId) -> usize {
        self.queue.purge_memory_only(server)
    }

    fn forget_server(&self, server: &ServerId) -> usize {
        self.queue.remove_server(server)
    }
}


/// Backoff applied by the HTTP outbound workers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub request_timeout: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            initial_delay: Duration::from_millis(150),
            max_delay: Duration::from_secs(10),
        }
    }
}

enum DeliveryError {
    /// The receiver refused the task; retrying cannot help.
    Rejected(String),
    /// Network failure or server error; worth retrying.
    Transient(String),
}

type WorkerTable = DashMap<ServerId, Arc<Notify>>;

pub struct HttpTransport {
    registry: Arc<ServerRegistry>,
    http_client: reqwest::Client,
    retry: RetryPolicy,
    /// Tasks accepted for a peer but not yet taken by its worker.
    backlog: Arc<TaskQueue>,
    workers: Arc<WorkerTable>,
}

impl HttpTransport {
    pub fn new(registry: Arc<ServerRegistry>, retry: RetryPolicy) -> Arc<Self> {
        Arc::new(Self {
            registry,
            http_client: reqwest::Client::new(),
            retry,
            backlog: TaskQueue::new(),
            workers: Arc::new(DashMap::new()),
        })
    }

    /// Tasks for `peer` that its worker has not picked up yet.
    pub fn backlog_len(&self, peer: &ServerId) -> usize {
        self.backlog.pending(peer)
    }

    /// Number of peers with a running outbound worker.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Appends the envelope to the peer's backlog and wakes its worker, spawning it if needed.
    fn enqueue_for(&self, peer: &ServerId, envelope: Arc<TaskEnvelope>) {
        self.backlog.push(peer, envelope);

        let wake = self
            .workers
            .entry(peer.clone())
            .or_insert_with(|| self.spawn_worker(peer.clone()))
            .value()
            .clone();
        wake.notify_one();
    }

    fn spawn_worker(&self, peer: ServerId) -> Arc<Notify> {
        let wake = Arc::new(Notify::new());
        let worker = PeerWorker {
            peer,
            wake: wake.clone(),
            registry: self.registry.clone(),
            backlog: self.backlog.clone(),
            workers: self.workers.clone(),
            client: self.http_client.clone(),
            retry: self.retry.clone(),
        };

        tracing::debug!("Starting outbound task worker for {}", worker.peer);
        tokio::spawn(worker.run());
        wake
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, envelope: TaskEnvelope) -> FarmResult<usize> {
        let targets = resolve_targets(&self.registry, &envelope).await?;
        let envelope = Arc::new(envelope);

        let mut queued = 0;
        for target in &targets {
            if target.http_addr.is_none() {
                tracing::warn!("Server {} has no known HTTP address yet", target.id);
                if envelope.task.is_memory_only() {
                    continue;
                }
            }
            self.enqueue_for(&target.id, envelope.clone());
            queued += 1;
        }
        Ok(queued)
    }

    fn purge_memory_only(&self, server: &ServerId) -> usize {
        self.backlog.purge_memory_only(server)
    }

    fn forget_server(&self, server: &ServerId) -> usize {
        // Detach the worker first so it stops at its next check.
        if let Some((_, wake)) = self.workers.remove(server) {
            wake.notify_one();
        }
        self.backlog.remove_server(server)
    }
}

/// Delivers one peer's backlog strictly in order.
struct PeerWorker {
    peer: ServerId,
    wake: Arc<Notify>,
    registry: Arc<ServerRegistry>,
    backlog: Arc<TaskQueue>,
    workers: Arc<WorkerTable>,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl PeerWorker {
    async fn run(self) {
        loop {
            if !self.is_current() {
                break;
            }
            let Some(envelope) = self.backlog.pop(&self.peer) else {
                if !self.registry.contains(&self.peer) {
                    break;
                }
                self.wake.notified().await;
                continue;
            };
            if !self.deliver_with_retry(&envelope).await {
                break;
            }
        }

        self.workers
            .remove_if(&self.peer, |_, current| Arc::ptr_eq(current, &self.wake));
        tracing::debug!("Outbound task worker for {} stopped", self.peer);
    }

    /// Whether this worker still owns the peer's slot in the worker table.
    fn is_current(&self) -> bool {
        self.workers
            .get(&self.peer)
            .is_some_and(|current| Arc::ptr_eq(current.value(), &self.wake))
    }

    /// Returns `false` once the peer has left the farm and the worker should stop.
    async fn deliver_with_retry(&self, envelope: &TaskEnvelope) -> bool {
        let memory_only = envelope.task.is_memory_only();
        let mut delay = self.retry.initial_delay;

        loop {
            let server = match self.registry.snapshot(&self.peer).await {
                Some(server) if self.is_current() => server,
                _ => {
                    tracing::info!(
                        "Server {} left the farm; dropping task {} and {} queued after it",
                        self.peer,
                        envelope.id,
                        self.backlog.pending(&self.peer)
                    );
                    return false;
                }
            };

            if memory_only && !server.status.accepts_memory_tasks() {
                tracing::debug!(
                    "Dropping memory-only task {} for {} ({:?})",
                    envelope.id,
                    self.peer,
                    server.status
                );
                return true;
            }

            let result = match server.http_addr {
                Some(addr) => {
                    deliver(&self.client, addr, envelope, self.retry.request_timeout).await
                }
                None => Err(DeliveryError::Transient("no HTTP address".to_string())),
            };

            match result {
                Ok(()) => {
                    tracing::debug!("Delivered task {} to {}", envelope.id, self.peer);
                    return true;
                }
                Err(DeliveryError::Rejected(reason)) => {
                    tracing::error!(
                        "Server {} rejected task {}: {}",
                        self.peer,
                        envelope.id,
                        reason
                    );
                    return true;
                }
                Err(DeliveryError::Transient(reason)) if memory_only => {
                    tracing::debug!(
                        "Dropping memory-only task {} for {}: {}",
                        envelope.id,
                        self.peer,
                        reason
                    );
                    return true;
                }
                Err(DeliveryError::Transient(reason)) => {
                    tracing::warn!(
                        "Delivery of task {} to {} failed ({}), retrying in {:?}",
                        envelope.id,
                        self.peer,
                        reason,
                        delay
                    );
                    // Jitter keeps peers from retrying in lockstep.
                    let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                    tokio::time::sleep(delay + jitter).await;
                    delay = (delay * 2).min(self.retry.max_delay);
                }
            }
        }
    }
}

async fn deliver(
    client: &reqwest::Client,
    addr: SocketAddr,
    envelope: &TaskEnvelope,
    timeout: Duration,
) -> Result<(), DeliveryError> {
    let url = format!("http://{}{}", addr, ENDPOINT_DELIVER_TASK);
    let payload = DeliverTaskRequest {
        envelope: envelope.clone(),
    };

    let response = client
        .post(url)
        .json(&payload)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| DeliveryError::Transient(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else if status.is_client_error() {
        Err(DeliveryError::Rejected(status.to_string()))
    } else {
        Err(DeliveryError::Transient(status.to_string()))
    }
}
