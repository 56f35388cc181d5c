#![allow(missing_docs)]

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use follow_graph::{
    admin,
    server::{build_router, MutationAck, ServeOptions, UserList},
    Context, FollowGraph, NewUser, StoreOptions, User, UserId,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct Harness {
    _dir: TempDir,
    graph: FollowGraph,
    app: Router,
}

fn harness(options: ServeOptions) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let graph = FollowGraph::open(StoreOptions::new(dir.path().join("graph.db"))).expect("open");
    let app = build_router(graph.clone(), &options);
    Harness {
        _dir: dir,
        graph,
        app,
    }
}

impl Harness {
    fn user(&self, name: &str) -> UserId {
        admin::create_user(
            &self.graph,
            &Context::background(),
            &NewUser::new(name, format!("{name}@example.com")),
        )
        .expect("create user")
        .id
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, bytes.to_vec())
    }

    async fn json(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(method, uri, body).await;
        let value = serde_json::from_slice(&bytes).expect("json body");
        (status, value)
    }
}

fn edge(follower: UserId, following: UserId) -> Option<Value> {
    Some(json!({ "follower_id": follower.0, "following_id": following.0 }))
}

#[tokio::test]
async fn health_probes() {
    let h = harness(ServeOptions::default());
    let (status, body) = h.send(Method::GET, "/health/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
    let (status, body) = h.send(Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn follow_and_unfollow_round_trip() {
    let h = harness(ServeOptions::default());
    let a = h.user("ada");
    let b = h.user("grace");

    let (status, body) = h.json(Method::POST, "/v1/follows", edge(a, b)).await;
    assert_eq!(status, StatusCode::OK);
    let ack: MutationAck = serde_json::from_value(body).expect("ack");
    assert!(ack.success);

    let (status, body) = h.json(Method::GET, &format!("/v1/users/{}", b.0), None).await;
    assert_eq!(status, StatusCode::OK);
    let grace: User = serde_json::from_value(body).expect("user");
    assert_eq!(grace.followers_count, 1);

    let (status, body) = h.json(Method::DELETE, "/v1/follows", edge(a, b)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let (_, body) = h.json(Method::GET, &format!("/v1/users/{}", b.0), None).await;
    assert_eq!(body["followers_count"], json!(0));
}

#[tokio::test]
async fn domain_errors_map_to_codes() {
    let h = harness(ServeOptions::default());
    let a = h.user("ada");
    let b = h.user("grace");
    h.json(Method::POST, "/v1/follows", edge(a, b)).await;

    let (status, body) = h.json(Method::POST, "/v1/follows", edge(a, b)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!("already_following"));

    let (status, body) = h.json(Method::POST, "/v1/follows", edge(a, a)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("self_follow"));

    let (status, body) = h.json(Method::POST, "/v1/follows", edge(a, UserId(999))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("not_found"));

    let (status, body) = h.json(Method::DELETE, "/v1/follows", edge(b, a)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("not_following"));

    let (status, body) = h.json(Method::POST, "/v1/follows", edge(UserId(0), b)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("invalid_input"));

    let (status, body) = h.json(Method::GET, "/v1/users/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("not_found"));

    let (status, body) = h.json(Method::GET, "/v1/users/-3", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("invalid_input"));
}

#[tokio::test]
async fn follower_listing_is_paginated() {
    let h = harness(ServeOptions::default());
    let b = h.user("b");
    let ctx = Context::background();
    for name in ["a1", "a2", "a3"] {
        let follower = h.user(name);
        h.graph.follow(&ctx, follower, b).expect("follow");
    }

    let uri = format!("/v1/users/{}/followers?limit=2&offset=0", b.0);
    let (status, body) = h.json(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let list: UserList = serde_json::from_value(body).expect("list");
    assert_eq!(list.total, 3);
    let names: Vec<_> = list.users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["a3", "a2"]);

    let uri = format!("/v1/users/{}/following", b.0);
    let (status, body) = h.json(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(0));
}

#[tokio::test]
async fn out_of_range_windows_are_clamped() {
    let h = harness(ServeOptions::default());
    for i in 0..22 {
        h.user(&format!("user{i:02}"));
    }

    let (status, body) = h.json(Method::GET, "/v1/users?limit=500", None).await;
    assert_eq!(status, StatusCode::OK);
    let list: UserList = serde_json::from_value(body).expect("list");
    assert_eq!(list.total, 22);
    assert_eq!(list.users.len(), 20);

    let (_, body) = h.json(Method::GET, "/v1/users?limit=5&offset=-10", None).await;
    let list: UserList = serde_json::from_value(body).expect("list");
    assert_eq!(list.users.len(), 5);
    assert_eq!(list.users[0].username, "user00");

    let (_, body) = h.json(Method::GET, "/v1/users?limit=0&offset=20", None).await;
    let list: UserList = serde_json::from_value(body).expect("list");
    assert_eq!(list.users.len(), 2);
}

#[tokio::test]
async fn read_only_mode_rejects_mutations() {
    let options = ServeOptions {
        read_only: true,
        ..ServeOptions::default()
    };
    let h = harness(options);
    let a = h.user("ada");
    let b = h.user("grace");

    let (status, body) = h.json(Method::POST, "/v1/follows", edge(a, b)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("read_only"));
    let (status, _) = h.json(Method::DELETE, "/v1/follows", edge(a, b)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.json(Method::GET, "/v1/users", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!h
        .graph
        .is_following(&Context::background(), a, b)
        .expect("lookup"));
}

#[tokio::test]
async fn malformed_requests_are_invalid_input() {
    let h = harness(ServeOptions::default());
    let a = h.user("ada");

    for uri in [
        "/v1/users/abc".to_string(),
        "/v1/users/abc/followers".to_string(),
        format!("/v1/users/{}/following?limit=many", a.0),
        "/v1/users?offset=x".to_string(),
    ] {
        let (status, body) = h.json(Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["code"], json!("invalid_input"), "{uri}");
    }

    let bad_body = Some(json!({ "follower_id": "x", "following_id": a.0 }));
    let (status, body) = h.json(Method::POST, "/v1/follows", bad_body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("invalid_input"));

    let (status, body) = h
        .json(Method::DELETE, "/v1/follows", Some(json!({ "follower_id": a.0 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("invalid_input"));

    let (status, body) = h.json(Method::POST, "/v1/follows", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("invalid_input"));
}
