//! End-to-end request handling through the full middleware stack.

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use cinedex_core::{Accounts, AccountsConfig, Catalog, CatalogConfig};
use cinedex_server::{
    router, AppState, LimiterConfig, MailError, Mailer, RetryConfig, ServerConfig,
    EXPECTED_VERSION,
};
use cinedex_storage::MemoryBackend;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

/// Records every notification instead of delivering it.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String, Value)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, template: &str, data: &Value) -> Result<(), MailError> {
        cinedex_server::render(template, data)?;
        self.sent
            .lock()
            .push((recipient.to_string(), template.to_string(), data.clone()));
        Ok(())
    }
}

struct TestApp {
    app: Router,
    state: AppState,
    mailer: Arc<RecordingMailer>,
}

impl TestApp {
    fn new(limiter: LimiterConfig) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let catalog = Catalog::new(backend.clone(), CatalogConfig::default());
        let accounts = Accounts::new(backend, AccountsConfig::default().with_password_cost(4));
        let mailer = Arc::new(RecordingMailer::default());
        let config = ServerConfig::default()
            .with_environment("testing")
            .with_limiter(limiter)
            .with_mail_retry(RetryConfig::no_retry());
        let state = AppState::new(config, catalog, accounts, mailer.clone());

        Self {
            app: router(state.clone()),
            state,
            mailer,
        }
    }

    fn unlimited() -> Self {
        Self::new(LimiterConfig::disabled())
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send(request(method, uri, token, body, [127, 0, 0, 1])).await;
        read(response).await
    }

    /// Registers, activates and logs in a user, returning its bearer token.
    async fn activated_user(&self, email: &str) -> String {
        let token = self.registered_user(email).await;
        let activation = self.activation_token(email);
        let (status, body) = self
            .call(
                Method::PUT,
                "/v1/users/activated",
                None,
                Some(json!({ "token": activation })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["user"]["activated"], true);
        token
    }

    /// Registers and logs in a user without activating it.
    async fn registered_user(&self, email: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/v1/users",
                None,
                Some(json!({ "name": "Alice Smith", "email": email, "password": "pa55word123" })),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "{body}");
        self.state.tasks().wait().await;

        let (status, body) = self
            .call(
                Method::POST,
                "/v1/tokens/authentication",
                None,
                Some(json!({ "email": email, "password": "pa55word123" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["authentication_token"]["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn activation_token(&self, email: &str) -> String {
        let sent = self.mailer.sent.lock();
        let (_, _, data) = sent
            .iter()
            .find(|(recipient, template, _)| recipient == email && template == "user_welcome")
            .expect("welcome notification sent");
        data["activation_token"].as_str().unwrap().to_string()
    }
}

fn request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
    ip: [u8; 4],
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from((ip, 50_000))));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn read(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn heat() -> Value {
    json!({ "title": "Heat", "year": 1995, "runtime": "170 mins", "genres": ["crime", "drama"] })
}

#[tokio::test]
async fn healthcheck_reports_environment() {
    let app = TestApp::unlimited();
    let (status, body) = app.call(Method::GET, "/v1/healthcheck", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["environment"], "testing");
    assert_eq!(body["system_info"]["version"], cinedex_server::VERSION);
}

#[tokio::test]
async fn anonymous_reads_are_public() {
    let app = TestApp::unlimited();
    let response = app
        .send(request(Method::GET, "/v1/movies", None, None, [127, 0, 0, 1]))
        .await;
    assert_eq!(response.headers().get(header::VARY).unwrap(), "Authorization");

    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movies"], json!([]));
    assert_eq!(body["metadata"], json!({}));
}

#[tokio::test]
async fn anonymous_write_requires_authentication() {
    let app = TestApp::unlimited();
    let response = app
        .send(request(Method::POST, "/v1/movies", None, Some(heat()), [127, 0, 0, 1]))
        .await;
    assert_eq!(response.headers().get(header::VARY).unwrap(), "Authorization");
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );

    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "you must be authenticated to access this resource");
}

#[tokio::test]
async fn malformed_bearer_is_rejected_with_challenge() {
    let app = TestApp::unlimited();
    let response = app
        .send(request(
            Method::GET,
            "/v1/movies",
            Some("not-a-token"),
            None,
            [127, 0, 0, 1],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );
    assert_eq!(response.headers().get(header::VARY).unwrap(), "Authorization");
}

#[tokio::test]
async fn unknown_bearer_is_rejected() {
    let app = TestApp::unlimited();
    let (status, body) = app
        .call(
            Method::GET,
            "/v1/movies",
            Some("0123456789abcdef0123456789abcdef"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid or missing authentication token");
}

#[tokio::test]
async fn inactive_account_cannot_write() {
    let app = TestApp::unlimited();
    let token = app.registered_user("bob@example.com").await;

    let (status, body) = app
        .call(Method::POST, "/v1/movies", Some(&token), Some(heat()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        "your user account must be activated to access this resource"
    );
}

#[tokio::test]
async fn create_patch_conflict_delete() {
    let app = TestApp::unlimited();
    let token = app.activated_user("alice@example.com").await;

    let response = app
        .send(request(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(heat()),
            [127, 0, 0, 1],
        ))
        .await;
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["movie"]["id"].as_i64().unwrap();
    assert_eq!(location, format!("/v1/movies/{id}"));
    assert_eq!(body["movie"]["version"], 1);
    assert_eq!(body["movie"]["runtime"], "170 mins");

    let (status, body) = app.call(Method::GET, &location, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movie"]["title"], "Heat");

    let mut patch = request(
        Method::PATCH,
        &location,
        Some(&token),
        Some(json!({ "year": 1996 })),
        [127, 0, 0, 1],
    );
    patch
        .headers_mut()
        .insert(EXPECTED_VERSION, "1".parse().unwrap());
    let (status, body) = read(app.send(patch).await).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["movie"]["version"], 2);
    assert_eq!(body["movie"]["year"], 1996);

    // Same stale version again.
    let mut stale = request(
        Method::PATCH,
        &location,
        Some(&token),
        Some(json!({ "year": 1997 })),
        [127, 0, 0, 1],
    );
    stale
        .headers_mut()
        .insert(EXPECTED_VERSION, "1".parse().unwrap());
    let (status, body) = read(app.send(stale).await).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    let (status, body) = app.call(Method::DELETE, &location, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "movie successfully deleted");

    let (status, _) = app.call(Method::GET, &location, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_movie_is_unprocessable() {
    let app = TestApp::unlimited();
    let token = app.activated_user("alice@example.com").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(json!({ "title": "", "year": 1995, "runtime": "170 mins", "genres": ["drama", "drama"] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["title"], "must be provided");
    assert_eq!(body["error"]["genres"], "must not contain duplicate values");
}

#[tokio::test]
async fn bad_bodies_are_bad_requests() {
    let app = TestApp::unlimited();
    let token = app.activated_user("alice@example.com").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/movies",
            Some(&token),
            Some(json!({ "title": "Heat", "rating": 5 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unknown field"));

    let (status, body) = app.call(Method::POST, "/v1/movies", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "body must not be empty");
}

#[tokio::test]
async fn list_filters_and_validates() {
    let app = TestApp::unlimited();
    let token = app.activated_user("alice@example.com").await;
    for movie in [
        heat(),
        json!({ "title": "Black Panther", "year": 2018, "runtime": "134 mins", "genres": ["action", "adventure"] }),
        json!({ "title": "The Breakfast Club", "year": 1985, "runtime": "97 mins", "genres": ["comedy", "drama"] }),
    ] {
        let (status, _) = app
            .call(Method::POST, "/v1/movies", Some(&token), Some(movie))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .call(Method::GET, "/v1/movies?genres=drama&sort=-year", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body["movies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Heat", "The Breakfast Club"]);
    assert_eq!(body["metadata"]["total_records"], 2);

    let (status, body) = app
        .call(Method::GET, "/v1/movies?page=abc&sort=budget", None, None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["page"], "must be an integer value");
}

#[tokio::test]
async fn rate_limit_is_per_client() {
    let app = TestApp::new(LimiterConfig::new(0.001, 2));

    for _ in 0..2 {
        let response = app
            .send(request(Method::GET, "/v1/healthcheck", None, None, [10, 0, 0, 1]))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let (status, body) = read(
        app.send(request(Method::GET, "/v1/healthcheck", None, None, [10, 0, 0, 1]))
            .await,
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate limit exceeded");

    let response = app
        .send(request(Method::GET, "/v1/healthcheck", None, None, [10, 0, 0, 2]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.state.limiter().len(), 2);
}

#[tokio::test]
async fn request_without_remote_address_fails() {
    let app = TestApp::new(LimiterConfig::default());
    let request = Request::builder()
        .uri("/v1/healthcheck")
        .body(Body::empty())
        .unwrap();
    let (status, body) = read(app.send(request).await).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        "the server encountered a problem and could not process your request"
    );
}

#[tokio::test]
async fn duplicate_registration_is_unprocessable() {
    let app = TestApp::unlimited();
    app.registered_user("carol@example.com").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({ "name": "Carol Jones", "email": "carol@example.com", "password": "pa55word123" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["error"]["email"],
        "a user with this email address already exists"
    );
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::unlimited();
    app.registered_user("dave@example.com").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "dave@example.com", "password": "wrongpassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid authentication credentials");
}

#[tokio::test]
async fn unknown_route_and_bad_id_are_not_found() {
    let app = TestApp::unlimited();
    let (status, body) = app.call(Method::GET, "/v1/nothing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "the requested resource could not be found");

    let (status, _) = app.call(Method::GET, "/v1/movies/abc", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
