//! Error types for the API server.
//!
//! Every rejection leaves the server as `{"error": <message>}`. Server-side
//! failures carry details for the log only; the body is a fixed message.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cinedex_core::{CoreError, StoreError, ValidationErrors};
use serde_json::json;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the API server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed request body, header or parameter.
    #[error("{0}")]
    BadRequest(String),

    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The requested resource does not exist.
    #[error("the requested resource could not be found")]
    NotFound,

    /// A conditional write lost against a concurrent one.
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// The client exhausted its request budget.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The bearer credential was malformed, unknown or expired.
    #[error("invalid or missing authentication token")]
    InvalidToken,

    /// Email and password did not match.
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// The route needs an identified principal.
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    /// The route needs an activated account.
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,

    /// A storage failure, transient or fatal.
    #[error("storage error: {0}")]
    Storage(StoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// In-flight requests did not finish within the shutdown grace period.
    #[error("shutdown grace period elapsed with requests still in flight")]
    ShutdownTimeout,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// Returns the HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::EditConflict => StatusCode::CONFLICT,
            ServerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServerError::InvalidToken
            | ServerError::InvalidCredentials
            | ServerError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ServerError::InactiveAccount => StatusCode::FORBIDDEN,
            ServerError::Storage(_)
            | ServerError::Internal(_)
            | ServerError::ShutdownTimeout
            | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServerError::NotFound,
            StoreError::EditConflict => ServerError::EditConflict,
            StoreError::DuplicateEmail => ServerError::Validation(ValidationErrors::single(
                "email",
                "a user with this email address already exists",
            )),
            other => ServerError::Storage(other),
        }
    }
}

impl From<ValidationErrors> for ServerError {
    fn from(errors: ValidationErrors) -> Self {
        ServerError::Validation(errors)
    }
}

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Store(err) => err.into(),
            CoreError::Invalid(errors) => ServerError::Validation(errors),
            CoreError::InvalidCredentials => ServerError::InvalidCredentials,
            CoreError::Hashing(msg) => ServerError::Internal(msg),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ServerError::Validation(errors) => json!({ "error": errors }),
            _ if status.is_server_error() => {
                tracing::error!(error = %self, "request failed");
                json!({ "error": "the server encountered a problem and could not process your request" })
            }
            _ => json!({ "error": self.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ServerError::InvalidToken | ServerError::AuthenticationRequired) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
