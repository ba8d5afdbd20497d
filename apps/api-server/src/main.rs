//! api-server — HTTP API for the link shortener workspace.
//!
//! Provides the public redirect endpoint and the admin API behind the
//! single-admin credential gate:
//! - Auth: register-once + login issuing bearer session tokens
//!   (see the `credential-auth` adapter).
//! - Storage: SQLite (default, `sqlite` feature) or in-memory for
//!   disposable deployments.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN (origin string) for an admin
//!   frontend.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # in-memory storage, fixed session secret
//! STORAGE_PROVIDER=memory SESSION_SECRET=dev-secret cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use axum::http::HeaderValue;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use credential_auth::{AuthError, AuthGate, SessionUser};
use domain::adapters::memory_repo::{InMemoryRepo, InMemoryUserRepo};
use domain::code::RandomCodeGenerator;
use domain::service::LinkService;
use domain::{
    Clock, CoreError, LinkRepository, NewLink, ShortCode, ShortLink, User, UserRepository,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Local repo abstraction supporting memory or sqlite (feature-gated).
enum RepoKind {
    Memory {
        links: InMemoryRepo,
        users: InMemoryUserRepo,
    },
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteRepo),
}

#[derive(Clone)]
struct AnyRepo {
    kind: Arc<RepoKind>,
}

impl AnyRepo {
    fn memory() -> Self {
        Self {
            kind: Arc::new(RepoKind::Memory {
                links: InMemoryRepo::new(),
                users: InMemoryUserRepo::new(),
            }),
        }
    }

    #[cfg(feature = "sqlite")]
    fn sqlite(cfg: &config::Config) -> Result<Self, CoreError> {
        let repo = match &cfg.db_path {
            Some(path) => sqlite_adapter::SqliteRepo::new(path)?,
            None => sqlite_adapter::SqliteRepo::from_env()?,
        };
        Ok(Self {
            kind: Arc::new(RepoKind::Sqlite(repo)),
        })
    }
}

impl LinkRepository for AnyRepo {
    fn insert(&self, link: ShortLink) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory { links, .. } => links.insert(link),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.insert(link),
        }
    }

    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        match &*self.kind {
            RepoKind::Memory { links, .. } => links.find_by_code(code),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_by_code(code),
        }
    }

    fn find_by_id(&self, id: &str) -> Result<Option<ShortLink>, CoreError> {
        match &*self.kind {
            RepoKind::Memory { links, .. } => links.find_by_id(id),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_by_id(id),
        }
    }

    fn find_all(&self) -> Result<Vec<ShortLink>, CoreError> {
        match &*self.kind {
            RepoKind::Memory { links, .. } => links.find_all(),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_all(),
        }
    }

    fn increment_click(&self, code: &ShortCode) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory { links, .. } => links.increment_click(code),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.increment_click(code),
        }
    }

    fn update(&self, link: &ShortLink) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory { links, .. } => links.update(link),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.update(link),
        }
    }

    fn delete(&self, id: &str) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory { links, .. } => links.delete(id),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.delete(id),
        }
    }
}

impl UserRepository for AnyRepo {
    fn find_users(&self) -> Result<Vec<User>, CoreError> {
        match &*self.kind {
            RepoKind::Memory { users, .. } => users.find_users(),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_users(),
        }
    }

    fn find_user(&self, id: &str) -> Result<Option<User>, CoreError> {
        match &*self.kind {
            RepoKind::Memory { users, .. } => users.find_user(id),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_user(id),
        }
    }

    fn create_user(&self, user: User) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory { users, .. } => users.create_user(user),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.create_user(user),
        }
    }
}

#[derive(Clone)]
struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[derive(Clone)]
struct AppState {
    svc: Arc<LinkService<AnyRepo, RandomCodeGenerator, StdClock>>,
    users: AnyRepo,
    auth: Arc<AuthGate>,
}

impl AppState {
    fn new(repo: AnyRepo, auth: AuthGate) -> Self {
        Self {
            svc: Arc::new(LinkService::new(
                repo.clone(),
                RandomCodeGenerator,
                StdClock,
            )),
            users: repo,
            auth: Arc::new(auth),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_insecure();

    let repo = build_repo(&cfg);
    let secret = cfg
        .session_secret
        .clone()
        .unwrap_or_else(credential_auth::random_secret);
    let state = AppState::new(repo, AuthGate::new(secret.as_bytes(), cfg.session_ttl));

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = router(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind port");
    axum::serve(listener, app).await.expect("server error");
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct a repository instance based on config and feature flags.
fn build_repo(cfg: &config::Config) -> AnyRepo {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => match AnyRepo::sqlite(cfg) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("failed to init SqliteRepo: {e}");
                AnyRepo::memory()
            }
        },
        _ => AnyRepo::memory(),
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route(
            "/api/links",
            get(list_links).post(create_link).delete(delete_link),
        )
        .route("/:code", get(follow_code))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkOut {
    id: String,
    short_code: String,
    original_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    created_at: String,
    click_count: u64,
}

fn link_to_out(link: ShortLink) -> LinkOut {
    LinkOut {
        id: link.id,
        short_code: link.short_code.as_str().to_string(),
        original_url: link.original_url,
        title: link.title,
        created_at: http_common::system_time_to_rfc3339(link.created_at),
        click_count: link.click_count,
    }
}

#[derive(Deserialize)]
struct CredentialsIn {
    #[serde(default)]
    name: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserOut {
    id: String,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginOut {
    token: String,
    user: UserOut,
}

#[derive(Deserialize)]
struct DeleteQuery {
    id: Option<String>,
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Check the bearer session token; all admin endpoints go through this.
fn session_user(state: &AppState, headers: &HeaderMap) -> Result<SessionUser, Response> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(unauthorized)?;
    let token = auth.strip_prefix("Bearer ").ok_or_else(unauthorized)?;
    state.auth.verify(token).map_err(|e| {
        warn!(err = %e, "session rejected");
        unauthorized()
    })
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(http_common::json_err("unauthorized")),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(http_common::json_err("internal")),
    )
        .into_response()
}

fn redirect_home() -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, HeaderValue::from_static("/"))],
    )
        .into_response()
}

fn redirect_to(target: &str) -> Response {
    let Ok(location) = HeaderValue::from_str(target) else {
        warn!(%target, "redirect target not representable as a header");
        return redirect_home();
    };
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Public redirect endpoint. A malformed code can never match a stored link,
/// so it gets the same home redirect as a miss.
async fn follow_code(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    let Ok(code) = ShortCode::new(code) else {
        return redirect_home();
    };
    match state.svc.resolve(&code) {
        Ok(Some(resolved)) => {
            info!(code = %code, target = %resolved.target, counted = resolved.counted, "resolve ok");
            redirect_to(&resolved.target)
        }
        Ok(None) => {
            warn!(code = %code, "resolve miss");
            redirect_home()
        }
        Err(e) => {
            error!(code = %code, err = %e, "resolve error");
            internal_error()
        }
    }
}

async fn register(State(state): State<AppState>, Json(body): Json<CredentialsIn>) -> Response {
    match state.auth.register(&state.users, &body.name, &body.password) {
        Ok(user) => {
            info!(user = %user.id, "admin registered");
            (
                StatusCode::OK,
                Json(UserOut {
                    id: user.id,
                    name: user.name,
                }),
            )
                .into_response()
        }
        Err(AuthError::MissingField(field)) => (
            StatusCode::BAD_REQUEST,
            Json(http_common::json_error_with_message(
                "invalid_request",
                &format!("{field} is required"),
            )),
        )
            .into_response(),
        Err(AuthError::RegistrationClosed) => (
            StatusCode::FORBIDDEN,
            Json(http_common::json_error_with_message(
                "forbidden",
                "registration is closed",
            )),
        )
            .into_response(),
        Err(e) => {
            error!(err = %e, "register error");
            internal_error()
        }
    }
}

async fn login(State(state): State<AppState>, Json(body): Json<CredentialsIn>) -> Response {
    match state.auth.login(&state.users, &body.name, &body.password) {
        Ok((token, user)) => (
            StatusCode::OK,
            Json(LoginOut {
                token,
                user: UserOut {
                    id: user.id,
                    name: user.name,
                },
            }),
        )
            .into_response(),
        // One generic rejection; unknown user and wrong password look alike.
        Err(AuthError::InvalidCredentials) => (
            StatusCode::UNAUTHORIZED,
            Json(http_common::json_err("invalid_credentials")),
        )
            .into_response(),
        Err(e) => {
            error!(err = %e, "login error");
            internal_error()
        }
    }
}

async fn create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewLink>,
) -> Response {
    if let Err(resp) = session_user(&state, &headers) {
        return resp;
    }

    match state.svc.create_short_link(body) {
        Ok(link) => {
            info!(code = %link.short_code, "create ok");
            (StatusCode::CREATED, Json(link_to_out(link))).into_response()
        }
        Err(e @ (CoreError::InvalidUrl(_) | CoreError::MissingField(_))) => (
            StatusCode::BAD_REQUEST,
            Json(http_common::json_error_with_message(
                "invalid_request",
                &e.to_string(),
            )),
        )
            .into_response(),
        Err(e) => {
            error!(err = %e, "create error");
            internal_error()
        }
    }
}

async fn list_links(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = session_user(&state, &headers) {
        return resp;
    }

    match state.svc.get_all_links() {
        Ok(links) => {
            let out: Vec<LinkOut> = links.into_iter().map(link_to_out).collect();
            (StatusCode::OK, Json(out)).into_response()
        }
        Err(e) => {
            error!(err = %e, "list error");
            internal_error()
        }
    }
}

async fn delete_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<DeleteQuery>,
) -> Response {
    if let Err(resp) = session_user(&state, &headers) {
        return resp;
    }

    let Some(id) = q.id.filter(|id| !id.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(http_common::json_error_with_message(
                "invalid_request",
                "link id is required",
            )),
        )
            .into_response();
    };

    match state.svc.delete_link(&id) {
        Ok(()) => {
            info!(%id, "delete ok");
            (StatusCode::OK, Json(serde_json::json!({"success": true}))).into_response()
        }
        Err(e) => {
            error!(err = %e, "delete error");
            internal_error()
        }
    }
}
