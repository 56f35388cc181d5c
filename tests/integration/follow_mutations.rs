#![allow(missing_docs)]

use std::thread;
use std::time::{Duration, Instant};

use follow_graph::{
    admin, Context, ErrorKind, FollowGraph, GraphError, NewUser, StoreOptions, UserId,
};
use rusqlite::Connection;
use tempfile::TempDir;

fn setup() -> (TempDir, FollowGraph) {
    let dir = TempDir::new().expect("tempdir");
    let graph = FollowGraph::open(StoreOptions::new(dir.path().join("graph.db"))).expect("open");
    (dir, graph)
}

fn setup_with_busy_timeout(busy: Duration) -> (TempDir, FollowGraph, Connection) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("graph.db");
    let graph = FollowGraph::open(StoreOptions::new(&path).busy_timeout(busy)).expect("open");
    let raw = Connection::open(&path).expect("raw connection");
    (dir, graph, raw)
}

fn cancel_after(ctx: &Context, delay: Duration) -> thread::JoinHandle<()> {
    let ctx = ctx.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        ctx.cancel();
    })
}

fn user(graph: &FollowGraph, name: &str) -> UserId {
    admin::create_user(
        graph,
        &Context::background(),
        &NewUser::new(name, format!("{name}@example.com")),
    )
    .expect("create user")
    .id
}

fn counters(graph: &FollowGraph, id: UserId) -> (u64, u64) {
    let user = graph.get_user(&Context::background(), id).expect("get user");
    (user.followers_count, user.following_count)
}

#[test]
fn follow_updates_edge_and_both_counters() {
    let (_dir, graph) = setup();
    let ctx = Context::background();
    let a = user(&graph, "ada");
    let b = user(&graph, "grace");

    let edge = graph.follow(&ctx, a, b).expect("follow");
    assert_eq!(edge.follower_id, a);
    assert_eq!(edge.following_id, b);
    assert!(graph.is_following(&ctx, a, b).expect("lookup"));
    assert!(!graph.is_following(&ctx, b, a).expect("lookup"));
    assert_eq!(counters(&graph, a), (0, 1));
    assert_eq!(counters(&graph, b), (1, 0));
}

#[test]
fn self_follow_is_rejected_without_side_effects() {
    let (_dir, graph) = setup();
    let ctx = Context::background();
    let a = user(&graph, "ada");

    let err = graph.follow(&ctx, a, a).expect_err("self follow");
    assert!(matches!(err, GraphError::SelfFollow));
    assert_eq!(err.kind(), ErrorKind::SelfFollow);
    assert_eq!(graph.edge_count(&ctx).expect("count"), 0);
    assert_eq!(counters(&graph, a), (0, 0));
}

#[test]
fn self_follow_wins_over_missing_user() {
    let (_dir, graph) = setup();
    let err = graph
        .follow(&Context::background(), UserId(77), UserId(77))
        .expect_err("self follow");
    assert!(matches!(err, GraphError::SelfFollow));
}

#[test]
fn duplicate_follow_is_rejected_once_counted() {
    let (_dir, graph) = setup();
    let ctx = Context::background();
    let a = user(&graph, "ada");
    let b = user(&graph, "grace");

    graph.follow(&ctx, a, b).expect("first follow");
    let err = graph.follow(&ctx, a, b).expect_err("second follow");
    assert!(matches!(err, GraphError::AlreadyFollowing));

    assert_eq!(graph.edge_count(&ctx).expect("count"), 1);
    assert_eq!(counters(&graph, a), (0, 1));
    assert_eq!(counters(&graph, b), (1, 0));
}

#[test]
fn reverse_direction_is_a_distinct_edge() {
    let (_dir, graph) = setup();
    let ctx = Context::background();
    let a = user(&graph, "ada");
    let b = user(&graph, "grace");

    graph.follow(&ctx, a, b).expect("a follows b");
    graph.follow(&ctx, b, a).expect("b follows a");
    assert_eq!(counters(&graph, a), (1, 1));
    assert_eq!(counters(&graph, b), (1, 1));
}

#[test]
fn follow_with_missing_user_is_not_found() {
    let (_dir, graph) = setup();
    let ctx = Context::background();
    let a = user(&graph, "ada");

    let err = graph.follow(&ctx, a, UserId(999)).expect_err("missing followee");
    assert!(matches!(err, GraphError::UserNotFound(UserId(999))));
    let err = graph.follow(&ctx, UserId(998), a).expect_err("missing follower");
    assert!(matches!(err, GraphError::UserNotFound(UserId(998))));

    assert_eq!(graph.edge_count(&ctx).expect("count"), 0);
    assert_eq!(counters(&graph, a), (0, 0));
}

#[test]
fn unfollow_missing_edge_changes_nothing() {
    let (_dir, graph) = setup();
    let ctx = Context::background();
    let a = user(&graph, "ada");
    let b = user(&graph, "grace");
    let c = user(&graph, "alan");
    graph.follow(&ctx, c, b).expect("unrelated edge");

    let err = graph.unfollow(&ctx, a, b).expect_err("not following");
    assert!(matches!(err, GraphError::NotFollowing));
    assert_eq!(err.kind(), ErrorKind::NotFollowing);

    assert_eq!(counters(&graph, a), (0, 0));
    assert_eq!(counters(&graph, b), (1, 0));
    assert_eq!(counters(&graph, c), (0, 1));
}

#[test]
fn follow_then_unfollow_restores_counters() {
    let (_dir, graph) = setup();
    let ctx = Context::background();
    let a = user(&graph, "ada");
    let b = user(&graph, "grace");
    let before = (counters(&graph, a), counters(&graph, b));

    graph.follow(&ctx, a, b).expect("follow");
    graph.unfollow(&ctx, a, b).expect("unfollow");

    assert_eq!((counters(&graph, a), counters(&graph, b)), before);
    assert!(!graph.is_following(&ctx, a, b).expect("lookup"));
    let err = graph.unfollow(&ctx, a, b).expect_err("second unfollow");
    assert!(matches!(err, GraphError::NotFollowing));

    graph.follow(&ctx, a, b).expect("follow again");
    assert_eq!(counters(&graph, b), (1, 0));
}

#[test]
fn cancelled_context_leaves_store_untouched() {
    let (_dir, graph) = setup();
    let a = user(&graph, "ada");
    let b = user(&graph, "grace");

    let ctx = Context::background();
    ctx.cancel();
    let err = graph.follow(&ctx, a, b).expect_err("cancelled");
    assert!(matches!(err, GraphError::Cancelled));
    assert!(!err.is_domain());

    let live = Context::background();
    assert_eq!(graph.edge_count(&live).expect("count"), 0);
    assert_eq!(counters(&graph, a), (0, 0));

    graph.follow(&live, a, b).expect("follow");
    let err = graph.unfollow(&ctx, a, b).expect_err("cancelled unfollow");
    assert!(matches!(err, GraphError::Cancelled));
    assert!(graph.is_following(&live, a, b).expect("lookup"));
    assert_eq!(counters(&graph, b), (1, 0));
}

#[test]
fn expired_deadline_is_reported_distinctly() {
    let (_dir, graph) = setup();
    let a = user(&graph, "ada");
    let b = user(&graph, "grace");

    let ctx = Context::with_deadline(Instant::now());
    let err = graph.follow(&ctx, a, b).expect_err("deadline");
    assert!(matches!(err, GraphError::DeadlineExceeded));
    assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    assert_eq!(
        graph.edge_count(&Context::background()).expect("count"),
        0
    );
}

#[test]
fn generous_deadline_does_not_interfere() {
    let (_dir, graph) = setup();
    let a = user(&graph, "ada");
    let b = user(&graph, "grace");

    let ctx = Context::with_timeout(Duration::from_secs(30));
    graph.follow(&ctx, a, b).expect("follow");
    graph.unfollow(&ctx, a, b).expect("unfollow");
    assert_eq!(counters(&graph, a), (0, 0));
}

#[test]
fn deadline_bounds_the_wait_for_a_held_write_lock() {
    let (_dir, graph, raw) = setup_with_busy_timeout(Duration::from_secs(2));
    let a = user(&graph, "ada");
    let b = user(&graph, "grace");
    raw.execute_batch("BEGIN IMMEDIATE").expect("take write lock");

    let started = Instant::now();
    let ctx = Context::with_timeout(Duration::from_millis(100));
    let err = graph.follow(&ctx, a, b).expect_err("lock is held");
    assert!(matches!(err, GraphError::DeadlineExceeded), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(1));

    let ctx = Context::background();
    let canceller = cancel_after(&ctx, Duration::from_millis(50));
    let started = Instant::now();
    let err = graph.follow(&ctx, a, b).expect_err("lock is held");
    canceller.join().expect("canceller");
    assert!(matches!(err, GraphError::Cancelled), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(1));

    raw.execute_batch("ROLLBACK").expect("release write lock");
    let live = Context::background();
    assert_eq!(graph.edge_count(&live).expect("count"), 0);
    assert_eq!((counters(&graph, a), counters(&graph, b)), ((0, 0), (0, 0)));
    graph.follow(&live, a, b).expect("follow once the lock is free");
}

#[test]
fn interrupted_transaction_rolls_back_edge_and_counters() {
    let (_dir, graph, raw) = setup_with_busy_timeout(Duration::from_secs(2));
    let live = Context::background();
    let a = user(&graph, "ada");
    let b = user(&graph, "grace");
    let c = user(&graph, "alan");
    graph.follow(&live, a, b).expect("follow");

    // Each edge write now runs a long statement inside the open transaction.
    raw.execute_batch(
        "CREATE TABLE pad (x INTEGER NOT NULL);
         WITH RECURSIVE seq(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM seq WHERE x < 1000)
         INSERT INTO pad (x) SELECT x FROM seq;
         CREATE TRIGGER slow_follow AFTER INSERT ON follows BEGIN
             SELECT sum(p.x * q.x + r.x) FROM pad p, pad q, pad r;
         END;
         CREATE TRIGGER slow_unfollow AFTER DELETE ON follows BEGIN
             SELECT sum(p.x * q.x + r.x) FROM pad p, pad q, pad r;
         END;",
    )
    .expect("install slow triggers");

    let started = Instant::now();
    let ctx = Context::with_timeout(Duration::from_millis(200));
    let err = graph.follow(&ctx, c, b).expect_err("interrupted");
    assert!(matches!(err, GraphError::DeadlineExceeded), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));

    let ctx = Context::background();
    let canceller = cancel_after(&ctx, Duration::from_millis(100));
    let err = graph.unfollow(&ctx, a, b).expect_err("interrupted");
    canceller.join().expect("canceller");
    assert!(matches!(err, GraphError::Cancelled), "{err:?}");

    raw.execute_batch("DROP TRIGGER slow_follow; DROP TRIGGER slow_unfollow;")
        .expect("drop triggers");
    assert!(!graph.is_following(&live, c, b).expect("lookup"));
    assert!(graph.is_following(&live, a, b).expect("lookup"));
    assert_eq!(graph.edge_count(&live).expect("count"), 1);
    assert_eq!(counters(&graph, a), (0, 1));
    assert_eq!(counters(&graph, b), (1, 0));
    assert_eq!(counters(&graph, c), (0, 0));
    assert!(admin::verify(&graph, &live).expect("verify").success);
}
