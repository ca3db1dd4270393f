//! Node Configuration
//!
//! Holds the operational policy of a farm member: who it is, where it listens,
//! which peers it heartbeats to, and the time windows used to classify server
//! health. The windows are plain values so they can be tuned per deployment and
//! exercised in tests against a `ManualClock`.

use crate::error::{FarmError, FarmResult};
use crate::farm::types::{MembershipMode, ServerId};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Time windows and thresholds driving the server health state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthPolicy {
    /// Trailing window inside which a server must have pinged to be responsive.
    pub responsive_window: Duration,
    /// Trailing window with zero pings after which a server is auto-disabled.
    /// Also the retention horizon for ping history.
    pub dead_window: Duration,
    /// Forward tolerance added to "now" to absorb daylight-saving shifts and
    /// clock skew between nodes.
    pub clock_tolerance: Duration,
    /// A server with at most this many pings in the responsive window is
    /// `Transitioning` rather than `Healthy`.
    pub transitioning_ping_ceiling: usize,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            responsive_window: Duration::from_secs(3 * 60),
            dead_window: Duration::from_secs(24 * 60 * 60),
            clock_tolerance: Duration::from_secs(65 * 60),
            transitioning_ping_ceiling: 7,
        }
    }
}

impl HealthPolicy {
    pub fn validate(&self) -> FarmResult<()> {
        if self.responsive_window.is_zero() {
            return Err(FarmError::Config(
                "responsive window must be non-zero".to_string(),
            ));
        }
        if self.dead_window < self.responsive_window {
            return Err(FarmError::Config(format!(
                "dead window ({:?}) must not be shorter than the responsive window ({:?})",
                self.dead_window, self.responsive_window
            )));
        }
        Ok(())
    }
}

/// Farm-wide switches read by the stock task conditions.
///
/// Flags are atomics so an administrator can flip them while tasks are in
/// flight; conditions observe the new value at execution time.
#[derive(Debug)]
pub struct SyncSettings {
    files: AtomicBool,
    cache: AtomicBool,
    sessions: AtomicBool,
}

impl SyncSettings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn files_enabled(&self) -> bool {
        self.files.load(Ordering::Acquire)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.load(Ordering::Acquire)
    }

    pub fn sessions_enabled(&self) -> bool {
        self.sessions.load(Ordering::Acquire)
    }

    pub fn set_files(&self, enabled: bool) {
        self.files.store(enabled, Ordering::Release);
    }

    pub fn set_cache(&self, enabled: bool) {
        self.cache.store(enabled, Ordering::Release);
    }

    pub fn set_sessions(&self, enabled: bool) {
        self.sessions.store(enabled, Ordering::Release);
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            files: AtomicBool::new(true),
            cache: AtomicBool::new(true),
            sessions: AtomicBool::new(true),
        }
    }
}

/// Distance between the heartbeat port and the default HTTP port.
const HTTP_PORT_OFFSET: u16 = 1000;

/// Everything a node needs to join the farm.
#[derive(Debug, Clone)]
pub struct FarmConfig {
    pub server_id: ServerId,
    /// UDP address heartbeats are received on.
    pub heartbeat_bind: SocketAddr,
    /// HTTP address tasks and status queries are served on.
    pub http_bind: SocketAddr,
    /// Heartbeat addresses of peers known at start-up.
    pub peers: Vec<SocketAddr>,
    pub membership_mode: MembershipMode,
    pub heartbeat_interval: Duration,
    pub sweep_interval: Duration,
    pub executor_poll_interval: Duration,
    /// Root directory synchronized files are written under.
    pub file_root: PathBuf,
    pub health: HealthPolicy,
}

impl FarmConfig {
    /// Builds a configuration with default intervals for the given identity and addresses.
    ///
    /// Without an explicit `http_bind`, HTTP listens on the heartbeat port + 1000.
    ///
    /// # Errors
    /// `Config` if no HTTP address is given and the heartbeat port leaves no room
    /// for the derived one.
    pub fn new(
        server_id: ServerId,
        heartbeat_bind: SocketAddr,
        http_bind: Option<SocketAddr>,
    ) -> FarmResult<Self> {
        let http_bind = match http_bind {
            Some(addr) => addr,
            None => {
                let port = heartbeat_bind
                    .port()
                    .checked_add(HTTP_PORT_OFFSET)
                    .ok_or_else(|| {
                        FarmError::Config(format!(
                            "cannot derive an HTTP port from heartbeat port {}; \
                             set the HTTP bind address explicitly",
                            heartbeat_bind.port()
                        ))
                    })?;
                SocketAddr::new(heartbeat_bind.ip(), port)
            }
        };

        Ok(Self {
            server_id,
            heartbeat_bind,
            http_bind,
            peers: Vec::new(),
            membership_mode: MembershipMode::Automatic,
            heartbeat_interval: Duration::from_secs(15),
            sweep_interval: Duration::from_secs(30),
            executor_poll_interval: Duration::from_millis(100),
            file_root: PathBuf::from("./farm-files"),
            health: HealthPolicy::default(),
        })
    }

    pub fn validate(&self) -> FarmResult<()> {
        if self.server_id.0.trim().is_empty() {
            return Err(FarmError::Config("server id must not be empty".to_string()));
        }
        for (name, interval) in [
            ("heartbeat interval", self.heartbeat_interval),
            ("sweep interval", self.sweep_interval),
            ("executor poll interval", self.executor_poll_interval),
        ] {
            if interval.is_zero() {
                return Err(FarmError::Config(format!("{} must be non-zero", name)));
            }
        }
        if self.heartbeat_interval >= self.health.responsive_window {
            return Err(FarmError::Config(format!(
                "heartbeat interval {:?} never fits inside the responsive window {:?}",
                self.heartbeat_interval, self.health.responsive_window
            )));
        }
        self.health.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FarmConfig {
        FarmConfig::new(ServerId::new("node-1"), "127.0.0.1:5000".parse().unwrap(), None)
            .unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = config();

        assert!(config.validate().is_ok());
        assert_eq!(config.http_bind, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.health.transitioning_ping_ceiling, 7);
    }

    #[test]
    fn test_high_heartbeat_port_needs_explicit_http_bind() {
        let bind: SocketAddr = "0.0.0.0:65000".parse().unwrap();

        let derived = FarmConfig::new(ServerId::new("node-1"), bind, None);
        assert!(matches!(derived, Err(FarmError::Config(_))));

        let explicit: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        let config = FarmConfig::new(ServerId::new("node-1"), bind, Some(explicit)).unwrap();
        assert_eq!(config.http_bind, explicit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_highest_derivable_port() {
        let bind: SocketAddr = "127.0.0.1:64535".parse().unwrap();

        let config = FarmConfig::new(ServerId::new("node-1"), bind, None).unwrap();

        assert_eq!(config.http_bind.port(), 65535);
    }

    #[test]
    fn test_empty_server_id_rejected() {
        let mut config = config();
        config.server_id = ServerId::new("  ");

        assert!(matches!(config.validate(), Err(FarmError::Config(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = config();
        config.sweep_interval = Duration::ZERO;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sweep interval"));
    }

    #[test]
    fn test_heartbeat_slower_than_responsive_window_rejected() {
        let mut config = config();
        config.heartbeat_interval = Duration::from_secs(5 * 60);

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dead_window_shorter_than_responsive_window_rejected() {
        let policy = HealthPolicy {
            dead_window: Duration::from_secs(60),
            ..HealthPolicy::default()
        };

        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_sync_settings_toggle() {
        let settings = SyncSettings::new();
        assert!(settings.files_enabled());
        assert!(settings.cache_enabled());
        assert!(settings.sessions_enabled());

        settings.set_cache(false);

        assert!(!settings.cache_enabled());
        assert!(settings.files_enabled());
    }
}
