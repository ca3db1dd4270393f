//! UDP heartbeat exchange between farm members.
//!
//! Every interval a node records its own ping and sends a `HeartbeatMessage::Ping`
//! to each seed peer and each server in the registry with a known heartbeat address.
//! Received pings are handed to the `HeartbeatMonitor`.

use super::clock::Clock;
use super::monitor::{Heartbeat, HeartbeatMonitor};
use super::protocol::HeartbeatMessage;
use super::types::ServerId;

use anyhow::Result;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

pub struct HeartbeatService {
    local: ServerId,
    heartbeat_addr: SocketAddr,
    http_addr: SocketAddr,
    seeds: Vec<SocketAddr>,
    interval: Duration,
    monitor: Arc<HeartbeatMonitor>,
    clock: Arc<dyn Clock>,
    socket: Arc<UdpSocket>,
}

impl HeartbeatService {
    pub async fn bind(
        local: ServerId,
        bind_addr: SocketAddr,
        http_addr: SocketAddr,
        seeds: Vec<SocketAddr>,
        interval: Duration,
        monitor: Arc<HeartbeatMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let heartbeat_addr = socket.local_addr()?;
        tracing::info!("Heartbeat socket bound on {}", heartbeat_addr);

        Ok(Arc::new(Self {
            local,
            heartbeat_addr,
            http_addr,
            seeds,
            interval,
            monitor,
            clock,
            socket: Arc::new(socket),
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.heartbeat_addr
    }

    pub async fn start(self: Arc<Self>) {
        let _send_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.send_loop().await;
            })
        };

        let _receive_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.receive_loop().await;
            })
        };

        tracing::info!("Heartbeat loops started for {}", self.local);
    }

    /// Heartbeat destinations: seeds plus every known server except ourselves.
    fn destinations(&self, known: Vec<SocketAddr>) -> Vec<SocketAddr> {
        let mut seen = HashSet::new();
        self.seeds
            .iter()
            .copied()
            .chain(known)
            .filter(|addr| *addr != self.heartbeat_addr)
            .filter(|addr| seen.insert(*addr))
            .collect()
    }

    async fn send_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;
            let now = self.clock.now_ms();

            self.monitor
                .record_heartbeat(Heartbeat {
                    server: self.local.clone(),
                    timestamp_ms: now,
                    heartbeat_addr: Some(self.heartbeat_addr),
                    http_addr: Some(self.http_addr),
                })
                .await;

            let msg = HeartbeatMessage::Ping {
                from: self.local.clone(),
                sent_at_ms: now,
                heartbeat_addr: self.heartbeat_addr,
                http_addr: self.http_addr,
            };
            let encoded = match bincode::serialize(&msg) {
                Ok(encoded) => encoded,
                Err(e) => {
                    tracing::error!("Failed to serialize heartbeat: {}", e);
                    continue;
                }
            };

            let mut known = Vec::new();
            for id in self.monitor.registry().ids() {
                if id == self.local {
                    continue;
                }
                if let Some(handle) = self.monitor.registry().get(&id)
                    && let Some(addr) = handle.lock().await.heartbeat_addr
                {
                    known.push(addr);
                }
            }

            for target in self.destinations(known) {
                if let Err(e) = self.socket.send_to(&encoded, target).await {
                    tracing::warn!("Failed to send heartbeat to {}: {}", target, e);
                } else {
                    tracing::trace!("Sent heartbeat to {}", target);
                }
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<HeartbeatMessage>(&buf[..len]) {
                    Ok(msg) => self.handle_message(msg).await,
                    Err(e) => {
                        tracing::warn!("Failed to deserialize heartbeat from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_message(&self, msg: HeartbeatMessage) {
        match msg {
            HeartbeatMessage::Ping {
                from,
                sent_at_ms,
                heartbeat_addr,
                http_addr,
            } => {
                if from == self.local {
                    return;
                }
                let status = self
                    .monitor
                    .record_heartbeat(Heartbeat {
                        server: from.clone(),
                        timestamp_ms: sent_at_ms,
                        heartbeat_addr: Some(heartbeat_addr),
                        http_addr: Some(http_addr),
                    })
                    .await;
                tracing::debug!("Heartbeat from {} -> {:?}", from, status);
            }
        }
    }
}
