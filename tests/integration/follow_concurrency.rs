#![allow(missing_docs)]

use std::sync::{Arc, Barrier};
use std::thread;

use follow_graph::{
    admin, Context, FollowGraph, GraphError, NewUser, Result, StoreOptions, UserId,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::TempDir;

const NUM_THREADS: usize = 8;
const OPERATIONS_PER_THREAD: usize = 40;
const NUM_USERS: usize = 6;

fn setup(pool_size: usize) -> (TempDir, FollowGraph) {
    let dir = TempDir::new().expect("tempdir");
    let opts = StoreOptions::new(dir.path().join("graph.db")).pool_size(pool_size);
    let graph = FollowGraph::open(opts).expect("open");
    (dir, graph)
}

fn create_users(graph: &FollowGraph, count: usize) -> Vec<UserId> {
    let ctx = Context::background();
    (0..count)
        .map(|i| {
            admin::create_user(
                graph,
                &ctx,
                &NewUser::new(format!("user{i}"), format!("user{i}@example.com")),
            )
            .expect("create user")
            .id
        })
        .collect()
}

#[test]
fn concurrent_same_pair_follow_has_one_winner() {
    for _round in 0..5 {
        let (_dir, graph) = setup(4);
        let ids = create_users(&graph, 2);
        let (a, b) = (ids[0], ids[1]);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let graph = graph.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    graph.follow(&Context::background(), a, b).map(|_| ())
                })
            })
            .collect();
        let results: Vec<Result<()>> = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect();

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(GraphError::AlreadyFollowing)))
            .count();
        assert_eq!((ok, dup), (1, 1), "results: {results:?}");

        let ctx = Context::background();
        assert_eq!(graph.edge_count(&ctx).expect("count"), 1);
        assert_eq!(graph.get_user(&ctx, a).expect("a").following_count, 1);
        assert_eq!(graph.get_user(&ctx, b).expect("b").followers_count, 1);
    }
}

#[test]
fn concurrent_same_pair_unfollow_has_one_winner() {
    let (_dir, graph) = setup(4);
    let ids = create_users(&graph, 2);
    let (a, b) = (ids[0], ids[1]);
    graph.follow(&Context::background(), a, b).expect("follow");
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let graph = graph.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                graph.unfollow(&Context::background(), a, b)
            })
        })
        .collect();
    let results: Vec<Result<()>> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(GraphError::NotFollowing)))
            .count(),
        1
    );
    let ctx = Context::background();
    assert_eq!(graph.get_user(&ctx, a).expect("a").following_count, 0);
    assert_eq!(graph.get_user(&ctx, b).expect("b").followers_count, 0);
}

#[test]
fn random_concurrent_mutations_keep_counters_exact() {
    let (_dir, graph) = setup(NUM_THREADS);
    let ids = Arc::new(create_users(&graph, NUM_USERS));
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|thread_id| {
            let graph = graph.clone();
            let ids = Arc::clone(&ids);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(thread_id as u64);
                let ctx = Context::background();
                barrier.wait();
                for _ in 0..OPERATIONS_PER_THREAD {
                    let from = ids[rng.gen_range(0..ids.len())];
                    let to = ids[rng.gen_range(0..ids.len())];
                    let outcome = if rng.gen_bool(0.6) {
                        graph.follow(&ctx, from, to).map(|_| ())
                    } else {
                        graph.unfollow(&ctx, from, to)
                    };
                    match outcome {
                        Ok(())
                        | Err(GraphError::SelfFollow)
                        | Err(GraphError::AlreadyFollowing)
                        | Err(GraphError::NotFollowing) => {}
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked");
    }

    let ctx = Context::background();
    let report = admin::verify(&graph, &ctx).expect("verify");
    assert!(report.success, "findings: {:?}", report.findings);
    assert_eq!(report.counts.users_checked, NUM_USERS as u64);

    let edges = graph.edge_count(&ctx).expect("edges");
    let mut followers_sum = 0;
    let mut following_sum = 0;
    for &id in ids.iter() {
        let user = graph.get_user(&ctx, id).expect("user");
        followers_sum += user.followers_count;
        following_sum += user.following_count;
        let listed = graph.get_followers(&ctx, id, 100, 0).expect("followers");
        assert_eq!(listed.total, user.followers_count);
    }
    assert_eq!(followers_sum, edges);
    assert_eq!(following_sum, edges);
}

#[test]
fn pool_smaller_than_worker_count_still_serves_everyone() {
    let (_dir, graph) = setup(2);
    let ids = Arc::new(create_users(&graph, 2 * NUM_THREADS));
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|i| {
            let graph = graph.clone();
            let ids = Arc::clone(&ids);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                graph
                    .follow(&Context::background(), ids[2 * i], ids[2 * i + 1])
                    .map(|_| ())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked").expect("follow");
    }
    assert_eq!(
        graph.edge_count(&Context::background()).expect("edges"),
        NUM_THREADS as u64
    );
    assert!(graph.store().pool().status().open <= 2);
}
