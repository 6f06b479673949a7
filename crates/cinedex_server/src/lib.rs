//! # Cinedex Server
//!
//! HTTP API server for the cinedex movie catalog.
//!
//! This crate provides:
//! - Per-client token-bucket admission control with idle eviction
//! - Bearer-token authentication middleware
//! - Movie, user and token endpoints over [`cinedex_core`]
//! - Detached background work that takes part in graceful shutdown
//!
//! # Request Pipeline
//!
//! Every request passes the rate limiter first, so a denied client costs
//! no credential lookup. Survivors are authenticated and carry exactly one
//! [`Principal`](cinedex_core::Principal) into the handler. Write routes
//! further require an activated account.
//!
//! ```rust,ignore
//! use cinedex_server::{AppState, LogMailer, Server, ServerConfig, shutdown_signal};
//!
//! let state = AppState::new(ServerConfig::default(), catalog, accounts, Arc::new(LogMailer));
//! let listener = tokio::net::TcpListener::bind(state.config().bind_addr).await?;
//! Server::new(state).run(listener, shutdown_signal()).await?;
//! ```
//!
//! # Shutdown
//!
//! On signal the server stops accepting connections, gives in-flight
//! requests a grace period, then waits for [`BackgroundTasks`] to drain.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod auth;
mod background;
mod config;
mod error;
mod handlers;
mod mailer;
mod ratelimit;
mod router;
mod server;

pub use auth::{authenticate, require_activated, AuthOutcome, Authenticator};
pub use background::BackgroundTasks;
pub use config::{LimiterConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handlers::EXPECTED_VERSION;
pub use mailer::{render, LogMailer, MailError, Mailer, Message, RetryConfig, RetryingMailer};
pub use ratelimit::{limit, Admission, ClientRegistry};
pub use router::{router, AppState};
pub use server::{shutdown_signal, Server};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
