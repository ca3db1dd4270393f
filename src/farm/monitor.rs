//! Heartbeat Monitor
//!
//! Records pings and classifies every server from its ping history:
//!
//! 1. Ever pinged, but nothing inside the dead window -> `AutoDisabled`.
//! 2. Nothing inside the responsive window, or disabled -> `NotResponding`.
//! 3. At most `transitioning_ping_ceiling` pings in the responsive window -> `Transitioning`.
//! 4. Otherwise -> `Healthy`.
//!
//! Both windows end at `now + clock_tolerance`. Side effects fire only when the
//! classification changes, while the record's lock is held.

use super::alerts::{AlertSink, HealthAlert};
use super::clock::Clock;
use super::registry::{ServerHandle, ServerRegistry};
use super::types::{MembershipMode, ServerId, ServerRecord, ServerStatus};
use crate::config::HealthPolicy;
use crate::tasks::transport::Transport;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Number of pings in `[now - window, now + tolerance]`.
fn count_within<'a>(
    pings: impl IntoIterator<Item = &'a u64>,
    now_ms: u64,
    window: Duration,
    tolerance: Duration,
) -> usize {
    let lower = now_ms.saturating_sub(window.as_millis() as u64);
    let upper = now_ms.saturating_add(tolerance.as_millis() as u64);
    pings
        .into_iter()
        .filter(|&&ping| ping >= lower && ping <= upper)
        .count()
}

/// Classifies a server. Pure: the same history, flag and clock give the same answer.
pub fn classify<'a, I>(pings: I, enabled: bool, now_ms: u64, policy: &HealthPolicy) -> ServerStatus
where
    I: IntoIterator<Item = &'a u64>,
    I::IntoIter: Clone,
{
    let pings = pings.into_iter();
    let ever_pinged = pings.clone().next().is_some();

    let count_all = count_within(
        pings.clone(),
        now_ms,
        policy.dead_window,
        policy.clock_tolerance,
    );
    if ever_pinged && count_all == 0 {
        return ServerStatus::AutoDisabled;
    }

    let count_recent = count_within(
        pings,
        now_ms,
        policy.responsive_window,
        policy.clock_tolerance,
    );
    if count_recent == 0 || !enabled {
        return ServerStatus::NotResponding;
    }

    if count_recent <= policy.transitioning_ping_ceiling {
        ServerStatus::Transitioning
    } else {
        ServerStatus::Healthy
    }
}

/// A liveness signal as received from the transport layer.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub server: ServerId,
    /// Sender's clock, ms since epoch.
    pub timestamp_ms: u64,
    pub heartbeat_addr: Option<SocketAddr>,
    pub http_addr: Option<SocketAddr>,
}

impl Heartbeat {
    pub fn new(server: ServerId, timestamp_ms: u64) -> Self {
        Self {
            server,
            timestamp_ms,
            heartbeat_addr: None,
            http_addr: None,
        }
    }
}

pub struct HeartbeatMonitor {
    registry: Arc<ServerRegistry>,
    /// Holds whatever has not reached each server yet.
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    policy: HealthPolicy,
    mode: MembershipMode,
}

impl HeartbeatMonitor {
    pub fn new(
        registry: Arc<ServerRegistry>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
        policy: HealthPolicy,
        mode: MembershipMode,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            transport,
            clock,
            alerts,
            policy,
            mode,
        })
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn mode(&self) -> MembershipMode {
        self.mode
    }

    /// Records that `server` was seen alive at `timestamp_ms` and re-evaluates it.
    pub async fn record_ping(&self, server: &ServerId, timestamp_ms: u64) -> ServerStatus {
        self.record_heartbeat(Heartbeat::new(server.clone(), timestamp_ms))
            .await
    }

    pub async fn record_heartbeat(&self, heartbeat: Heartbeat) -> ServerStatus {
        loop {
            let (handle, _created) = self.registry.get_or_create(&heartbeat.server);
            let mut record = handle.lock().await;

            // Removed between lookup and lock: recreate.
            if record.retired {
                continue;
            }

            record.ping_history.push_back(heartbeat.timestamp_ms);
            if heartbeat.heartbeat_addr.is_some() {
                record.heartbeat_addr = heartbeat.heartbeat_addr;
            }
            if heartbeat.http_addr.is_some() {
                record.http_addr = heartbeat.http_addr;
            }

            tracing::trace!("Ping from {} at {}", heartbeat.server, heartbeat.timestamp_ms);
            return self.evaluate_locked(&mut record);
        }
    }

    /// Current classification of `server`, or `None` if it is not registered.
    ///
    /// Re-evaluates against the clock so the answer is never older than the query.
    pub async fn get_status(&self, server: &ServerId) -> Option<ServerStatus> {
        let handle = self.registry.get(server)?;
        self.evaluate_handle(&handle).await
    }

    /// Re-evaluates every known server. Returns the servers whose status changed.
    pub async fn sweep(&self) -> Vec<(ServerId, ServerStatus)> {
        let mut changed = Vec::new();

        for id in self.registry.ids() {
            let Some(handle) = self.registry.get(&id) else {
                continue;
            };

            let mut record = handle.lock().await;
            if record.retired {
                continue;
            }
            let previous = record.status;
            let current = self.evaluate_locked(&mut record);
            if current != previous {
                changed.push((id, current));
            }
        }

        if !changed.is_empty() {
            tracing::debug!("Health sweep changed {} server(s)", changed.len());
        }
        changed
    }

    /// Spawns the periodic sweep.
    pub fn start(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tracing::info!("Starting health sweep every {:?}", interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }

    async fn evaluate_handle(&self, handle: &ServerHandle) -> Option<ServerStatus> {
        let mut record = handle.lock().await;
        if record.retired {
            return None;
        }
        Some(self.evaluate_locked(&mut record))
    }

    fn evaluate_locked(&self, record: &mut ServerRecord) -> ServerStatus {
        let now = self.clock.now_ms();
        let current = classify(&record.ping_history, record.enabled, now, &self.policy);
        let previous = record.status;

        if current != previous {
            tracing::info!("Server {} status: {:?} -> {:?}", record.id, previous, current);
            record.status = current;
            self.on_transition(record, previous, now);
        }

        if !record.retired {
            let horizon = now.saturating_sub(self.policy.dead_window.as_millis() as u64);
            record.prune_before(horizon);
        }

        current
    }

    fn on_transition(&self, record: &mut ServerRecord, previous: ServerStatus, now: u64) {
        match record.status {
            ServerStatus::AutoDisabled => match self.mode {
                MembershipMode::Automatic => {
                    self.registry.remove_locked(record);
                    self.transport.forget_server(&record.id);
                }
                MembershipMode::Manual => {
                    self.transport.purge_memory_only(&record.id);
                }
            },
            ServerStatus::NotResponding => {
                self.alerts.notify(&HealthAlert {
                    server: record.id.clone(),
                    previous,
                    current: record.status,
                    last_ping: record.last_ping(),
                    observed_at: now,
                });
            }
            ServerStatus::Transitioning | ServerStatus::Healthy => {}
        }
    }
}
