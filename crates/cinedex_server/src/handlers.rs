//! Request handlers.

use crate::error::{ServerError, ServerResult};
use crate::router::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use cinedex_core::{Filters, Metadata, MovieInput, MoviePatch, MovieQuery, Validator};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::error::Category;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Header carrying the version a PATCH was prepared against.
pub const EXPECTED_VERSION: &str = "x-expected-version";

/// Decodes a JSON request body.
fn read_json<T: DeserializeOwned>(body: &[u8]) -> ServerResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ServerError::BadRequest("body must not be empty".into()));
    }

    serde_json::from_slice(body).map_err(|err| {
        let message = match err.classify() {
            Category::Syntax => format!(
                "body contains badly-formed JSON (at line {}, column {})",
                err.line(),
                err.column()
            ),
            Category::Eof => "body contains badly-formed JSON".to_string(),
            Category::Data => format!("body contains invalid data: {err}"),
            Category::Io => err.to_string(),
        };
        ServerError::BadRequest(message)
    })
}

/// Parses a path id. Anything that is not an integer cannot name a record.
fn parse_id(raw: &str) -> ServerResult<i64> {
    raw.parse().map_err(|_| ServerError::NotFound)
}

fn expected_version(headers: &HeaderMap) -> ServerResult<Option<i32>> {
    let Some(value) = headers.get(EXPECTED_VERSION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| ServerError::BadRequest("X-Expected-Version must be an integer".into()))
}

/// Reads an integer query parameter, recording a validation error if it is
/// not one. Out-of-range values saturate so the filter rules report them.
fn read_int(params: &HashMap<String, String>, key: &str, default: u32, v: &mut Validator) -> u32 {
    let Some(raw) = params.get(key) else {
        return default;
    };
    match raw.parse::<i64>() {
        Ok(n) => u32::try_from(n.max(0)).unwrap_or(u32::MAX),
        Err(_) => {
            v.add_error(key, "must be an integer value");
            default
        }
    }
}

pub(crate) async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.environment,
            "version": crate::VERSION,
        }
    }))
}

pub(crate) async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ServerResult<Json<Value>> {
    let mut v = Validator::new();
    let defaults = Filters::default();
    let filters = Filters {
        page: read_int(&params, "page", defaults.page, &mut v),
        page_size: read_int(&params, "page_size", defaults.page_size, &mut v),
        sort: params.get("sort").cloned().unwrap_or(defaults.sort),
    };
    v.finish()?;

    let query = MovieQuery {
        title: params.get("title").cloned().unwrap_or_default(),
        genres: params
            .get("genres")
            .map(|g| {
                g.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        filters,
    };

    let (movies, total) = state.catalog.list(&query).await?;
    let metadata = Metadata::calculate(total, query.filters.page, query.filters.page_size);
    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

pub(crate) async fn create_movie(
    State(state): State<AppState>,
    body: Bytes,
) -> ServerResult<impl IntoResponse> {
    let input: MovieInput = read_json(&body)?;
    let movie = state.catalog.create(input.into()).await?;
    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "movie": movie })),
    ))
}

pub(crate) async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    let movie = state.catalog.get(parse_id(&id)?).await?;
    Ok(Json(json!({ "movie": movie })))
}

pub(crate) async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Json<Value>> {
    let id = parse_id(&id)?;
    let expected = expected_version(&headers)?;
    let patch: MoviePatch = read_json(&body)?;
    let movie = state.catalog.patch(id, expected, patch).await?;
    Ok(Json(json!({ "movie": movie })))
}

pub(crate) async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    state.catalog.delete(parse_id(&id)?).await?;
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RegisterInput {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub(crate) async fn register_user(
    State(state): State<AppState>,
    body: Bytes,
) -> ServerResult<impl IntoResponse> {
    let input: RegisterInput = read_json(&body)?;
    let (user, token) = state
        .accounts
        .register(&input.name, &input.email, &input.password)
        .await?;

    let mailer = Arc::clone(&state.mailer);
    let recipient = user.email.clone();
    let data = json!({ "activation_token": token.plaintext, "user_id": user.id });
    state.tasks.spawn("user_welcome", async move {
        mailer.send(&recipient, "user_welcome", &data).await
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": user }))))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ActivateInput {
    #[serde(default)]
    token: String,
}

pub(crate) async fn activate_user(
    State(state): State<AppState>,
    body: Bytes,
) -> ServerResult<Json<Value>> {
    let input: ActivateInput = read_json(&body)?;
    let user = state.accounts.activate(&input.token).await?;
    Ok(Json(json!({ "user": user })))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CredentialsInput {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub(crate) async fn create_authentication_token(
    State(state): State<AppState>,
    body: Bytes,
) -> ServerResult<impl IntoResponse> {
    let input: CredentialsInput = read_json(&body)?;
    let token = state
        .accounts
        .authenticate(&input.email, &input.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    ))
}

pub(crate) async fn not_found() -> ServerError {
    ServerError::NotFound
}
