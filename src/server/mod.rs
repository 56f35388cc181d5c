//! HTTP boundary adapter.
//!
//! Translates JSON requests into [`FollowService`] calls and service
//! outcomes into responses. All validation, clamping and error mapping lives
//! in the service; the handlers here only extract and serialize.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{PaginationConfig, ServiceConfig};
use crate::graph::FollowGraph;
use crate::types::{GraphError, User};

mod error;
mod service;

pub use error::{ApiCode, ApiError, INTERNAL_MESSAGE};
pub use service::{FollowService, MutationAck, UserList, READY_TIMEOUT};

/// Runtime options used to boot the HTTP server.
#[derive(Clone, Debug)]
pub struct ServeOptions {
    /// Network interface to bind to.
    pub host: IpAddr,
    /// Listening port. `0` picks a free one.
    pub port: u16,
    /// Whether to disable mutating endpoints.
    pub read_only: bool,
    /// Allowed CORS origins.
    pub allow_origins: Vec<String>,
    /// Deadline applied to every request.
    pub request_timeout: Duration,
    /// Pagination bounds.
    pub pagination: PaginationConfig,
}

impl ServeOptions {
    /// Options taken from the `[server]` and `[pagination]` sections.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            host: config.server.host,
            port: config.server.port,
            read_only: config.server.read_only,
            allow_origins: config.server.allow_origins.clone(),
            request_timeout: config.server.request_timeout(),
            pagination: config.pagination,
        }
    }

    /// Convenience accessor for `(host, port)` tuples.
    pub fn socket_parts(&self) -> (IpAddr, u16) {
        (self.host, self.port)
    }
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Opening or migrating the store failed.
    #[error("failed to open database: {0}")]
    Graph(#[from] GraphError),
    /// Binding or serving failed.
    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}

struct ServerState {
    service: FollowService,
    read_only: bool,
}

type AppState = Arc<ServerState>;

/// Serves `graph` until Ctrl-C.
pub async fn serve(graph: FollowGraph, options: ServeOptions) -> Result<(), ServerError> {
    let (host, port) = options.socket_parts();
    let listener = TcpListener::bind(SocketAddr::from((host, port))).await?;
    let addr = listener.local_addr()?;
    let app = build_router(graph, &options);

    tracing::info!(
        %addr,
        read_only = options.read_only,
        allow_origins = ?options.allow_origins,
        request_timeout_ms = options.request_timeout.as_millis() as u64,
        "follow graph listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

// Extractor rejections are answered with `ApiError` so malformed ids,
// query strings and bodies share the JSON `invalid_input` shape.
type IdPath = Result<Path<i64>, PathRejection>;
type PageQuery = Result<Query<PageParams>, QueryRejection>;
type FollowBody = Result<Json<FollowRequest>, JsonRejection>;

/// Builds the router without binding a socket.
pub fn build_router(graph: FollowGraph, options: &ServeOptions) -> Router {
    let state = Arc::new(ServerState {
        service: FollowService::new(graph, options.pagination, options.request_timeout),
        read_only: options.read_only,
    });

    let mut router = Router::new()
        .route("/health/live", get(live_handler))
        .route("/health/ready", get(ready_handler))
        .route("/v1/users", get(list_users_handler))
        .route("/v1/users/:id", get(get_user_handler))
        .route("/v1/users/:id/followers", get(followers_handler))
        .route("/v1/users/:id/following", get(following_handler))
        .route("/v1/follows", post(follow_handler).delete(unfollow_handler));

    if let Some(layer) = build_cors_layer(&options.allow_origins) {
        router = router.layer(layer);
    }

    router.with_state(state).layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            let parsed = normalize_origin(origin)
                .as_deref()
                .and_then(|value| HeaderValue::from_str(value).ok());
            if parsed.is_none() {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
            }
            parsed
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([ACCEPT, CONTENT_TYPE]),
    )
}

fn normalize_origin(origin: &str) -> Option<String> {
    let trimmed = origin.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageParams {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FollowRequest {
    follower_id: i64,
    following_id: i64,
}

async fn live_handler() -> &'static str {
    "OK"
}

async fn ready_handler(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.service.ready().await?;
    Ok("OK")
}

async fn list_users_handler(
    State(state): State<AppState>,
    params: PageQuery,
) -> Result<Json<UserList>, ApiError> {
    let Query(params) = params?;
    let list = state.service.list_users(params.limit, params.offset).await?;
    Ok(Json(list))
}

async fn get_user_handler(
    State(state): State<AppState>,
    id: IdPath,
) -> Result<Json<User>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.service.get_user(id).await?))
}

async fn followers_handler(
    State(state): State<AppState>,
    id: IdPath,
    params: PageQuery,
) -> Result<Json<UserList>, ApiError> {
    let (Path(id), Query(params)) = (id?, params?);
    let list = state
        .service
        .get_followers(id, params.limit, params.offset)
        .await?;
    Ok(Json(list))
}

async fn following_handler(
    State(state): State<AppState>,
    id: IdPath,
    params: PageQuery,
) -> Result<Json<UserList>, ApiError> {
    let (Path(id), Query(params)) = (id?, params?);
    let list = state
        .service
        .get_following(id, params.limit, params.offset)
        .await?;
    Ok(Json(list))
}

async fn follow_handler(
    State(state): State<AppState>,
    body: FollowBody,
) -> Result<Json<MutationAck>, ApiError> {
    if state.read_only {
        return Err(ApiError::read_only());
    }
    let Json(body) = body?;
    let ack = state
        .service
        .follow(body.follower_id, body.following_id)
        .await?;
    Ok(Json(ack))
}

async fn unfollow_handler(
    State(state): State<AppState>,
    body: FollowBody,
) -> Result<Json<MutationAck>, ApiError> {
    if state.read_only {
        return Err(ApiError::read_only());
    }
    let Json(body) = body?;
    let ack = state
        .service
        .unfollow(body.follower_id, body.following_id)
        .await?;
    Ok(Json(ack))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}
