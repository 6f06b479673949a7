//! Server configuration.

use crate::mailer::RetryConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the per-client rate limiter.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Whether admission control is applied at all.
    pub enabled: bool,
    /// Sustained requests per second per client.
    pub rps: f64,
    /// Bucket capacity.
    pub burst: u32,
    /// How often idle clients are swept.
    pub sweep_interval: Duration,
    /// Clients idle for longer than this are forgotten.
    pub idle_timeout: Duration,
}

impl LimiterConfig {
    /// Creates an enabled limiter configuration.
    pub fn new(rps: f64, burst: u32) -> Self {
        Self {
            enabled: true,
            rps,
            burst,
            sweep_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(3 * 60),
        }
    }

    /// Creates a configuration that admits every request.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the idle eviction threshold.
    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::new(2.0, 4)
    }
}

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Deployment environment reported by the healthcheck.
    pub environment: String,
    /// Rate limiter settings.
    pub limiter: LimiterConfig,
    /// Time in-flight requests get to finish after a shutdown signal.
    pub shutdown_grace: Duration,
    /// Bound on waiting for background tasks during shutdown.
    pub background_drain: Duration,
    /// Maximum background tasks running at once.
    pub max_background_tasks: usize,
    /// Retry policy for outgoing notifications.
    pub mail_retry: RetryConfig,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            environment: "development".to_string(),
            limiter: LimiterConfig::default(),
            shutdown_grace: Duration::from_secs(5),
            background_drain: Duration::from_secs(30),
            max_background_tasks: 64,
            mail_retry: RetryConfig::default(),
        }
    }

    /// Sets the environment name.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Sets the rate limiter configuration.
    pub fn with_limiter(mut self, limiter: LimiterConfig) -> Self {
        self.limiter = limiter;
        self
    }

    /// Sets the in-flight request grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Sets the background drain bound.
    pub fn with_background_drain(mut self, drain: Duration) -> Self {
        self.background_drain = drain;
        self
    }

    /// Sets the background concurrency cap.
    pub fn with_max_background_tasks(mut self, max: usize) -> Self {
        self.max_background_tasks = max;
        self
    }

    /// Sets the notification retry policy.
    pub fn with_mail_retry(mut self, retry: RetryConfig) -> Self {
        self.mail_retry = retry;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 4000)))
    }
}
