//! Route table and middleware stack.
//!
//! Layers run outermost first:
//!
//! 1. Panic recovery: a panicking handler becomes a 500 with
//!    `Connection: close`
//! 2. Request tracing
//! 3. Rate limiting by remote address
//! 4. Authentication, which attaches a [`Principal`](cinedex_core::Principal)
//!
//! Write routes additionally require an activated account.

use crate::auth::{authenticate, require_activated, Authenticator};
use crate::background::BackgroundTasks;
use crate::config::ServerConfig;
use crate::handlers;
use crate::mailer::{Mailer, RetryingMailer};
use crate::ratelimit::{limit, ClientRegistry};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use cinedex_core::{Accounts, Catalog};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) catalog: Catalog,
    pub(crate) accounts: Accounts,
    pub(crate) authenticator: Arc<Authenticator>,
    pub(crate) limiter: Arc<ClientRegistry>,
    pub(crate) tasks: BackgroundTasks,
    pub(crate) mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Assembles the state. `mailer` is wrapped with the configured retry policy.
    pub fn new(
        config: ServerConfig,
        catalog: Catalog,
        accounts: Accounts,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let limiter = Arc::new(ClientRegistry::new(config.limiter.clone()));
        let tasks = BackgroundTasks::new(config.max_background_tasks);
        let mailer: Arc<dyn Mailer> = Arc::new(RetryingMailer::new(mailer, config.mail_retry.clone()));

        Self {
            authenticator: Arc::new(Authenticator::new(accounts.clone())),
            config: Arc::new(config),
            catalog,
            accounts,
            limiter,
            tasks,
            mailer,
        }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the background task coordinator.
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Returns the client registry.
    pub fn limiter(&self) -> &Arc<ClientRegistry> {
        &self.limiter
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route("/v1/movies", get(handlers::list_movies))
        .route("/v1/movies/:id", get(handlers::show_movie))
        .route("/v1/users", post(handlers::register_user))
        .route("/v1/users/activated", put(handlers::activate_user))
        .route(
            "/v1/tokens/authentication",
            post(handlers::create_authentication_token),
        );

    let activated = Router::new()
        .route("/v1/movies", post(handlers::create_movie))
        .route(
            "/v1/movies/:id",
            patch(handlers::update_movie).delete(handlers::delete_movie),
        )
        .route_layer(from_fn(require_activated));

    Router::new()
        .merge(public)
        .merge(activated)
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(
            Arc::clone(&state.authenticator),
            authenticate,
        ))
        .layer(from_fn_with_state(Arc::clone(&state.limiter), limit))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = detail, "handler panicked");

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "the server encountered a problem and could not process your request" })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_response_closes_connection() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");

        let response = handle_panic(Box::new(String::from("boom")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
