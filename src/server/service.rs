use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{error, info, info_span, Span};

use crate::config::PaginationConfig;
use crate::context::Context;
use crate::graph::{Direction, FollowGraph};
use crate::types::{ErrorKind, GraphError, Page, User, UserId};

use super::error::{ApiCode, ApiError};

/// Deadline for readiness probes.
pub const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// `{users, total}` listing payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserList {
    /// The requested window.
    pub users: Vec<User>,
    /// Size of the whole collection.
    pub total: u64,
}

impl From<Page<User>> for UserList {
    fn from(page: Page<User>) -> Self {
        Self {
            users: page.items,
            total: page.total,
        }
    }
}

/// `{success, message}` payload of Follow and Unfollow.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MutationAck {
    /// Always `true`; failures travel as [`ApiError`].
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
}

/// Boundary adapter in front of [`FollowGraph`].
///
/// Validates raw ids, clamps pagination, runs each engine call on the
/// blocking pool under a per-request deadline, and maps the outcome to
/// [`ApiError`]. Dropping a returned future cancels the engine call.
#[derive(Clone)]
pub struct FollowService {
    graph: FollowGraph,
    pagination: PaginationConfig,
    request_timeout: Duration,
}

impl FollowService {
    /// Creates a service over `graph`.
    pub fn new(
        graph: FollowGraph,
        pagination: PaginationConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            graph,
            pagination,
            request_timeout,
        }
    }

    /// The wrapped engine.
    pub fn graph(&self) -> &FollowGraph {
        &self.graph
    }

    /// Normalizes a requested window: a missing, non-positive, or oversized
    /// limit becomes the default; a missing or negative offset becomes 0.
    pub fn clamp(&self, limit: Option<i64>, offset: Option<i64>) -> (u32, u64) {
        clamp_window(self.pagination, limit, offset)
    }

    /// GetUser.
    pub async fn get_user(&self, id: i64) -> Result<User, ApiError> {
        let id = require_id("user_id", id)?;
        let span = info_span!("get_user", user_id = %id);
        self.run(span, self.request_timeout, move |graph, ctx| graph.get_user(ctx, id))
            .await
    }

    /// ListUsers.
    pub async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<UserList, ApiError> {
        let (limit, offset) = self.clamp(limit, offset);
        let span = info_span!("list_users", limit, offset);
        let page = self
            .run(span, self.request_timeout, move |graph, ctx| {
                graph.list_users(ctx, limit, offset)
            })
            .await?;
        Ok(page.into())
    }

    /// GetFollowers.
    pub async fn get_followers(
        &self,
        id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<UserList, ApiError> {
        self.neighbors(Direction::Followers, id, limit, offset).await
    }

    /// GetFollowing.
    pub async fn get_following(
        &self,
        id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<UserList, ApiError> {
        self.neighbors(Direction::Following, id, limit, offset).await
    }

    async fn neighbors(
        &self,
        direction: Direction,
        id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<UserList, ApiError> {
        let id = require_id("user_id", id)?;
        let (limit, offset) = self.clamp(limit, offset);
        let span = info_span!("neighbors", user_id = %id, ?direction, limit, offset);
        let page = self
            .run(span, self.request_timeout, move |graph, ctx| {
                graph.neighbors(ctx, id, direction, limit, offset)
            })
            .await?;
        Ok(page.into())
    }

    /// Follow.
    pub async fn follow(
        &self,
        follower_id: i64,
        following_id: i64,
    ) -> Result<MutationAck, ApiError> {
        let follower = require_id("follower_id", follower_id)?;
        let following = require_id("following_id", following_id)?;
        let span = info_span!("follow", follower_id = %follower, following_id = %following);
        self.run(span, self.request_timeout, move |graph, ctx| {
            graph.follow(ctx, follower, following)
        })
        .await?;
        info!(follower_id = %follower, following_id = %following, "user followed");
        Ok(MutationAck {
            success: true,
            message: "successfully followed user".to_string(),
        })
    }

    /// Unfollow.
    pub async fn unfollow(
        &self,
        follower_id: i64,
        following_id: i64,
    ) -> Result<MutationAck, ApiError> {
        let follower = require_id("follower_id", follower_id)?;
        let following = require_id("following_id", following_id)?;
        let span = info_span!("unfollow", follower_id = %follower, following_id = %following);
        self.run(span, self.request_timeout, move |graph, ctx| {
            graph.unfollow(ctx, follower, following)
        })
        .await?;
        info!(follower_id = %follower, following_id = %following, "user unfollowed");
        Ok(MutationAck {
            success: true,
            message: "successfully unfollowed user".to_string(),
        })
    }

    /// Pings the store under [`READY_TIMEOUT`].
    pub async fn ready(&self) -> Result<(), ApiError> {
        let timeout = READY_TIMEOUT.min(self.request_timeout);
        self.run(info_span!("ready"), timeout, |graph, ctx| {
            graph.store().ping(ctx)
        })
        .await
        .map_err(|err| ApiError::new(ApiCode::Unavailable, format!("store unavailable: {err}")))
    }

    async fn run<T, F>(&self, span: Span, timeout: Duration, op: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&FollowGraph, &Context) -> Result<T, GraphError> + Send + 'static,
    {
        let ctx = Context::with_timeout(timeout);
        let guard = ctx.cancel_on_drop();
        let graph = self.graph.clone();
        let worker_span = span.clone();
        let joined = task::spawn_blocking(move || worker_span.in_scope(|| op(&graph, &ctx))).await;
        guard.disarm();
        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if err.kind() == ErrorKind::Internal {
                    span.in_scope(|| error!(error = %err, "operation failed"));
                }
                Err(err.into())
            }
            Err(join) => {
                span.in_scope(|| error!(error = %join, "worker task failed"));
                Err(ApiError::internal())
            }
        }
    }
}

fn require_id(field: &str, raw: i64) -> Result<UserId, ApiError> {
    let id = UserId(raw);
    if id.is_valid() {
        Ok(id)
    } else {
        Err(ApiError::invalid(format!("{field} must be a positive integer")))
    }
}

fn clamp_window(bounds: PaginationConfig, limit: Option<i64>, offset: Option<i64>) -> (u32, u64) {
    let limit = match limit {
        Some(requested) if requested > 0 && requested <= i64::from(bounds.max_limit) => {
            requested as u32
        }
        _ => bounds.default_limit,
    };
    let offset = offset.map_or(0, |requested| requested.max(0) as u64);
    (limit, offset)
}
