//! The `serve` command.

use super::{CliError, CliResult};
use clap::{Args, ValueEnum};
use cinedex_core::{Accounts, AccountsConfig, Catalog, CatalogConfig, CredentialStore, RecordStore};
use cinedex_server::{shutdown_signal, AppState, LimiterConfig, LogMailer, Server, ServerConfig};
use cinedex_storage::{MemoryBackend, PostgresBackend, PostgresConfig};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    /// Local development.
    Development,
    /// Pre-production.
    Staging,
    /// Production.
    Production,
}

impl Environment {
    fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Record and credential backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// In-process maps, lost on exit.
    Memory,
    /// PostgreSQL through `--dsn`.
    Postgres,
}

/// Flags for `serve`.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "CINEDEX_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// API server port
    #[arg(long, env = "CINEDEX_PORT", default_value_t = 4000)]
    pub port: u16,

    /// Environment reported by the healthcheck
    #[arg(long, env = "CINEDEX_ENV", value_enum, default_value = "development")]
    pub env: Environment,

    /// Storage backend
    #[arg(long, env = "CINEDEX_STORAGE", value_enum, default_value = "postgres")]
    pub storage: StorageKind,

    /// PostgreSQL connection string
    #[arg(long, env = "CINEDEX_DB_DSN")]
    pub dsn: Option<String>,

    /// PostgreSQL maximum open connections
    #[arg(long, env = "CINEDEX_DB_MAX_OPEN_CONNS", default_value_t = 25)]
    pub db_max_open_conns: u32,

    /// PostgreSQL maximum connection idle time (e.g. 15m, 90s)
    #[arg(long, env = "CINEDEX_DB_MAX_IDLE_TIME", default_value = "15m", value_parser = humantime::parse_duration)]
    pub db_max_idle_time: Duration,

    /// Rate limiter maximum requests per second
    #[arg(long, env = "CINEDEX_LIMITER_RPS", default_value_t = 2.0)]
    pub limiter_rps: f64,

    /// Rate limiter maximum burst
    #[arg(long, env = "CINEDEX_LIMITER_BURST", default_value_t = 4)]
    pub limiter_burst: u32,

    /// Enable rate limiter
    #[arg(
        long,
        env = "CINEDEX_LIMITER_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub limiter_enabled: bool,

    /// Lifetime of issued authentication tokens (e.g. 1h, 30m)
    #[arg(long, env = "CINEDEX_AUTH_TOKEN_TTL", default_value = "1h", value_parser = humantime::parse_duration)]
    pub auth_token_ttl: Duration,

    /// Grace period for in-flight requests on shutdown (e.g. 5s)
    #[arg(long, env = "CINEDEX_SHUTDOWN_GRACE", default_value = "5s", value_parser = humantime::parse_duration)]
    pub shutdown_grace: Duration,

    /// How long shutdown waits for background tasks (e.g. 30s)
    #[arg(long, env = "CINEDEX_BACKGROUND_DRAIN", default_value = "30s", value_parser = humantime::parse_duration)]
    pub background_drain: Duration,

    /// Maximum background tasks running at once
    #[arg(long, env = "CINEDEX_MAX_BACKGROUND_TASKS", default_value_t = 64)]
    pub max_background_tasks: usize,
}

impl ServeArgs {
    /// Builds the server configuration from the flags.
    pub fn server_config(&self) -> CliResult<ServerConfig> {
        let limiter = if self.limiter_enabled {
            if !(self.limiter_rps.is_finite() && self.limiter_rps > 0.0) {
                return Err(CliError::Config("--limiter-rps must be positive".into()));
            }
            if self.limiter_burst == 0 {
                return Err(CliError::Config("--limiter-burst must be positive".into()));
            }
            LimiterConfig::new(self.limiter_rps, self.limiter_burst)
        } else {
            LimiterConfig::disabled()
        };

        Ok(ServerConfig::new(SocketAddr::new(self.host, self.port))
            .with_environment(self.env.as_str())
            .with_limiter(limiter)
            .with_shutdown_grace(self.shutdown_grace)
            .with_background_drain(self.background_drain)
            .with_max_background_tasks(self.max_background_tasks))
    }

    /// Builds the account service configuration from the flags.
    pub fn accounts_config(&self) -> AccountsConfig {
        AccountsConfig::default().with_authentication_ttl(self.auth_token_ttl)
    }
}

/// Runs the API server until a shutdown signal arrives.
pub async fn run(args: ServeArgs) -> CliResult<()> {
    let config = args.server_config()?;
    let accounts_config = args.accounts_config();

    let mut postgres = None;
    let (records, credentials): (Arc<dyn RecordStore>, Arc<dyn CredentialStore>) =
        match args.storage {
            StorageKind::Memory => {
                info!("using in-memory storage, data is lost on exit");
                let backend = Arc::new(MemoryBackend::new());
                let records: Arc<dyn RecordStore> = backend.clone();
                let credentials: Arc<dyn CredentialStore> = backend;
                (records, credentials)
            }
            StorageKind::Postgres => {
                let dsn = args.dsn.as_deref().ok_or_else(|| {
                    CliError::Config("--dsn is required with --storage postgres".into())
                })?;
                let pg_config = PostgresConfig::new(dsn)
                    .with_max_connections(args.db_max_open_conns)
                    .with_max_idle_time(args.db_max_idle_time);
                let backend = Arc::new(PostgresBackend::connect(&pg_config).await?);
                postgres = Some(Arc::clone(&backend));
                let records: Arc<dyn RecordStore> = backend.clone();
                let credentials: Arc<dyn CredentialStore> = backend;
                (records, credentials)
            }
        };

    let catalog = Catalog::new(records, CatalogConfig::default());
    let accounts = Accounts::new(credentials, accounts_config);
    let state = AppState::new(config, catalog, accounts, Arc::new(LogMailer));

    let listener = TcpListener::bind(state.config().bind_addr).await?;
    let result = Server::new(state).run(listener, shutdown_signal()).await;

    if let Some(backend) = postgres {
        backend.close().await;
    }
    result.map_err(CliError::from)
}
