//! Per-client request admission.
//!
//! Each client gets a token bucket holding up to `burst` tokens and refilled
//! at `rps` tokens per second. A request consumes one token; an empty bucket
//! means the request is denied.
//!
//! # Thread Safety
//!
//! All bucket state lives behind a single mutex owned by [`ClientRegistry`].
//! Lookup, lazy creation, refill and consumption for one client happen under
//! one lock acquisition, and nothing slow runs while it is held.
//!
//! # Memory Management
//!
//! Entries are never removed on the request path. A sweeper task (see
//! [`ClientRegistry::spawn_sweeper`]) runs every `sweep_interval` and drops
//! clients idle for longer than `idle_timeout`.

use crate::config::LimiterConfig;
use crate::error::ServerError;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use cinedex_core::{Clock, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed.
    Allow,
    /// The client has exhausted its budget.
    Deny,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refills for the time elapsed since the last call, then takes a token.
    fn try_take(&mut self, now: Instant, rate: f64, capacity: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct ClientEntry {
    bucket: Bucket,
    last_seen: Instant,
}

/// Token buckets for every recently seen client.
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, ClientEntry>>,
    clock: Arc<dyn Clock>,
    config: LimiterConfig,
}

impl ClientRegistry {
    /// Creates a registry on the system clock.
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a registry reading time from `clock`.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            clock,
            config,
        }
    }

    /// Returns the limiter configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Decides whether a request from `client` may proceed.
    ///
    /// When the limiter is disabled every request is allowed and no entry
    /// is created.
    pub fn admit(&self, client: &str) -> Admission {
        if !self.config.enabled {
            return Admission::Allow;
        }

        let now = self.clock.now();
        let capacity = f64::from(self.config.burst);
        let mut clients = self.clients.lock();
        let entry = clients
            .entry(client.to_string())
            .or_insert_with(|| ClientEntry {
                bucket: Bucket::full(capacity, now),
                last_seen: now,
            });
        entry.last_seen = now;

        if entry.bucket.try_take(now, self.config.rps, capacity) {
            Admission::Allow
        } else {
            Admission::Deny
        }
    }

    /// Removes clients idle for longer than the configured threshold.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let idle = self.config.idle_timeout;
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle);
        before - clients.len()
    }

    /// Returns the number of tracked clients.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// Returns true if no client is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts the periodic sweep. The task ends once `stop` turns true or
    /// its sender is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = registry.config.sweep_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = registry.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = registry.len(), "evicted idle clients");
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("rate limiter sweeper stopped");
        })
    }

    #[cfg(test)]
    fn tokens(&self, client: &str) -> Option<f64> {
        self.clients.lock().get(client).map(|e| e.bucket.tokens)
    }
}

/// Middleware admitting requests by remote IP address.
///
/// A denial is an admission decision, not a failure, and is logged at
/// `debug`. A request without connection info cannot be attributed to a
/// client and fails with a server error.
pub async fn limit(
    State(registry): State<Arc<ClientRegistry>>,
    request: Request,
    next: Next,
) -> Response {
    if !registry.config().enabled {
        return next.run(request).await;
    }

    let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>().copied()
    else {
        return ServerError::Internal("request carries no remote address".into()).into_response();
    };

    let client = addr.ip().to_string();
    match registry.admit(&client) {
        Admission::Allow => next.run(request).await,
        Admission::Deny => {
            tracing::debug!(client = %client, "request rate limited");
            ServerError::RateLimited.into_response()
        }
    }
}
