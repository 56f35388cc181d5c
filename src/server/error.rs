use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::types::{ErrorKind, GraphError};

/// Message returned for every internal failure.
pub const INTERNAL_MESSAGE: &str = "internal server error";

/// Caller-facing error code.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiCode {
    /// Malformed ids or body.
    InvalidInput,
    /// Unknown user.
    NotFound,
    /// follower == following.
    SelfFollow,
    /// Edge already present.
    AlreadyFollowing,
    /// Edge absent.
    NotFollowing,
    /// Username or email taken.
    Conflict,
    /// Mutating endpoint disabled.
    ReadOnly,
    /// Request cancelled before completion.
    Cancelled,
    /// Per-request deadline passed.
    DeadlineExceeded,
    /// The store is not reachable.
    Unavailable,
    /// Anything else.
    Internal,
}

impl ApiCode {
    /// HTTP status carried by this code.
    pub fn status(self) -> StatusCode {
        match self {
            ApiCode::InvalidInput | ApiCode::SelfFollow => StatusCode::BAD_REQUEST,
            ApiCode::NotFound | ApiCode::NotFollowing => StatusCode::NOT_FOUND,
            ApiCode::AlreadyFollowing | ApiCode::Conflict => StatusCode::CONFLICT,
            ApiCode::ReadOnly => StatusCode::FORBIDDEN,
            // nginx's "client closed request"; always in range.
            ApiCode::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ApiCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ErrorKind> for ApiCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound => ApiCode::NotFound,
            ErrorKind::SelfFollow => ApiCode::SelfFollow,
            ErrorKind::AlreadyFollowing => ApiCode::AlreadyFollowing,
            ErrorKind::NotFollowing => ApiCode::NotFollowing,
            ErrorKind::Conflict => ApiCode::Conflict,
            ErrorKind::InvalidInput => ApiCode::InvalidInput,
            ErrorKind::Cancelled => ApiCode::Cancelled,
            ErrorKind::DeadlineExceeded => ApiCode::DeadlineExceeded,
            ErrorKind::Internal => ApiCode::Internal,
        }
    }
}

/// Error returned by [`FollowService`](super::FollowService) and the HTTP
/// handlers.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    /// Classification.
    pub code: ApiCode,
    /// Caller-safe description.
    pub message: String,
}

impl ApiError {
    /// Builds an error from a code and message.
    pub fn new(code: ApiCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// An [`ApiCode::InvalidInput`] error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ApiCode::InvalidInput, message)
    }

    /// The opaque internal error.
    pub fn internal() -> Self {
        Self::new(ApiCode::Internal, INTERNAL_MESSAGE)
    }

    /// The read-only rejection.
    pub fn read_only() -> Self {
        Self::new(
            ApiCode::ReadOnly,
            "mutating endpoint is disabled in read-only mode",
        )
    }
}

impl From<GraphError> for ApiError {
    /// Domain and cancellation errors keep their message; anything internal
    /// is replaced by [`INTERNAL_MESSAGE`]. Callers log internal errors
    /// before converting.
    fn from(err: GraphError) -> Self {
        let code = ApiCode::from(err.kind());
        match code {
            ApiCode::Internal => Self::internal(),
            _ => Self::new(code, err.to_string()),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload<'a> {
    code: ApiCode,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorPayload {
            code: self.code,
            message: &self.message,
        });
        (self.code.status(), body).into_response()
    }
}
