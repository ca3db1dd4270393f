use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use webfarm_sync::config::{FarmConfig, SyncSettings};
use webfarm_sync::error::FarmResult;
use webfarm_sync::farm::alerts::TracingAlertSink;
use webfarm_sync::farm::clock::{Clock, SystemClock};
use webfarm_sync::farm::handlers::{handle_get_status, handle_list_servers, handle_set_enabled};
use webfarm_sync::farm::heartbeat::HeartbeatService;
use webfarm_sync::farm::monitor::HeartbeatMonitor;
use webfarm_sync::farm::protocol::{
    ENDPOINT_SERVER_ENABLED, ENDPOINT_SERVER_STATUS, ENDPOINT_SERVERS,
};
use webfarm_sync::farm::registry::ServerRegistry;
use webfarm_sync::farm::types::{MembershipMode, ServerId};
use webfarm_sync::sync::SyncModules;
use webfarm_sync::sync::files::FileSync;
use webfarm_sync::tasks::dispatcher::TaskDispatcher;
use webfarm_sync::tasks::executor::TaskExecutor;
use webfarm_sync::tasks::handlers::{LocalServer, handle_deliver_task};
use webfarm_sync::tasks::protocol::ENDPOINT_DELIVER_TASK;
use webfarm_sync::tasks::queue::TaskQueue;
use webfarm_sync::tasks::registry::TaskRegistry;
use webfarm_sync::tasks::transport::{HttpTransport, RetryPolicy, Transport};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Membership {
    Automatic,
    Manual,
}

impl From<Membership> for MembershipMode {
    fn from(mode: Membership) -> Self {
        match mode {
            Membership::Automatic => MembershipMode::Automatic,
            Membership::Manual => MembershipMode::Manual,
        }
    }
}

/// Web farm node: task synchronization and server health monitoring.
#[derive(Debug, Parser)]
#[command(name = "webfarm-node", version)]
struct Args {
    /// Identity of this server within the farm.
    #[arg(long, env = "WEBFARM_SERVER_ID")]
    server_id: String,

    /// UDP address to receive heartbeats on.
    #[arg(long, env = "WEBFARM_BIND")]
    bind: SocketAddr,

    /// HTTP address for task delivery and status queries (default: heartbeat port + 1000).
    #[arg(long, env = "WEBFARM_HTTP_BIND")]
    http_bind: Option<SocketAddr>,

    /// Heartbeat address of a peer; repeat or comma-separate.
    #[arg(long = "peer", env = "WEBFARM_PEERS", value_delimiter = ',')]
    peers: Vec<SocketAddr>,

    #[arg(long, env = "WEBFARM_MEMBERSHIP", value_enum, default_value = "automatic")]
    membership: Membership,

    /// Servers to pre-register in manual membership mode; repeat or comma-separate.
    #[arg(long = "server", env = "WEBFARM_SERVERS", value_delimiter = ',')]
    servers: Vec<String>,

    #[arg(long, env = "WEBFARM_HEARTBEAT_SECS", default_value_t = 15)]
    heartbeat_secs: u64,

    #[arg(long, env = "WEBFARM_SWEEP_SECS", default_value_t = 30)]
    sweep_secs: u64,

    /// Directory synchronized files are written under.
    #[arg(long, env = "WEBFARM_FILE_ROOT", default_value = "./farm-files")]
    file_root: PathBuf,
}

impl Args {
    fn into_config(self) -> FarmResult<(FarmConfig, Vec<String>)> {
        let mut config = FarmConfig::new(ServerId(self.server_id), self.bind, self.http_bind)?;
        config.peers = self.peers;
        config.membership_mode = self.membership.into();
        config.heartbeat_interval = Duration::from_secs(self.heartbeat_secs);
        config.sweep_interval = Duration::from_secs(self.sweep_secs);
        config.file_root = self.file_root;
        Ok((config, self.servers))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (config, preregistered) = Args::parse().into_config()?;
    config.validate()?;

    tracing::info!(
        "Starting farm node {} (heartbeat {}, http {}, {:?} membership)",
        config.server_id,
        config.heartbeat_bind,
        config.http_bind,
        config.membership_mode
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let servers = ServerRegistry::new();
    let queue = TaskQueue::new();

    if config.membership_mode == MembershipMode::Manual {
        for server in preregistered {
            servers.register(ServerId(server), true);
        }
    }

    // 1. Task registry (every module registers before anything runs):
    let settings = SyncSettings::new();
    let tasks = TaskRegistry::new();
    let modules = SyncModules::new(FileSync::new(config.file_root.clone()));
    modules.register_all(&tasks, &settings)?;
    tracing::info!("Registered task types: {:?}", tasks.type_tags());

    // 2. Dispatch + execution:
    let transport: Arc<dyn Transport> = HttpTransport::new(servers.clone(), RetryPolicy::default());
    let dispatcher = TaskDispatcher::new(
        config.server_id.clone(),
        tasks.clone(),
        transport.clone(),
        clock.clone(),
    );
    tracing::info!("Dispatcher ready for {}", dispatcher.local_server());

    let executor = TaskExecutor::new(
        config.server_id.clone(),
        queue.clone(),
        tasks.clone(),
        config.executor_poll_interval,
    );
    let _executor_handle = executor.start();

    // 3. Health monitoring:
    let monitor = HeartbeatMonitor::new(
        servers.clone(),
        transport,
        clock.clone(),
        Arc::new(TracingAlertSink),
        config.health.clone(),
        config.membership_mode,
    );
    let _sweep_handle = monitor.clone().start(config.sweep_interval);

    let heartbeats = HeartbeatService::bind(
        config.server_id.clone(),
        config.heartbeat_bind,
        config.http_bind,
        config.peers.clone(),
        config.heartbeat_interval,
        monitor.clone(),
        clock.clone(),
    )
    .await?;
    heartbeats.start().await;

    // 4. HTTP Router:
    let app = Router::new()
        .route(ENDPOINT_DELIVER_TASK, post(handle_deliver_task))
        .route(ENDPOINT_SERVER_STATUS, get(handle_get_status))
        .route(ENDPOINT_SERVERS, get(handle_list_servers))
        .route(ENDPOINT_SERVER_ENABLED, post(handle_set_enabled))
        .layer(Extension(queue))
        .layer(Extension(monitor))
        .layer(Extension(LocalServer(config.server_id.clone())));

    tracing::info!("HTTP server listening on {}", config.http_bind);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.http_bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
