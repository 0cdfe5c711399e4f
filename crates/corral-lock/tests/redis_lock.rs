//! Integration tests for distributed locks against a real Redis.
//!
//! Covers mutual exclusion, token-checked release after TTL expiry,
//! polling acquisition, and the `with_lock` conflict path.

use std::time::{Duration, Instant};

use corral_core::{RedisConfig, create_pool};
use corral_lock::{DEFAULT_LOCK_PREFIX, LockError, LockManager};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");
            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{host_port}");
            (container, url)
        })
        .await;
    url.clone()
}

async fn lock_manager() -> LockManager {
    let config = RedisConfig {
        url: redis_url().await,
        ..RedisConfig::default()
    };
    let pool = create_pool(&config).expect("create pool");
    LockManager::new(pool, DEFAULT_LOCK_PREFIX)
}

const TTL: Duration = Duration::from_secs(5);
const RETRY: Duration = Duration::from_millis(50);

#[tokio::test]
async fn concurrent_attempts_grant_exactly_one_lock() {
    let manager = lock_manager().await;

    let (a, b) = tokio::join!(
        manager.try_lock("exclusive", TTL, Duration::ZERO, RETRY),
        manager.try_lock("exclusive", TTL, Duration::ZERO, RETRY),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(a.is_some() != b.is_some(), "exactly one attempt must win");

    let winner = a.or(b).unwrap();
    assert!(winner.release().await.unwrap());
}

#[tokio::test]
async fn stale_holder_cannot_release_a_reacquired_lock() {
    let manager = lock_manager().await;

    let first = manager
        .try_lock("fleeting", Duration::from_millis(200), Duration::ZERO, RETRY)
        .await
        .unwrap()
        .expect("first acquisition");

    // Let the TTL lapse and a second party take over.
    tokio::time::sleep(Duration::from_millis(350)).await;
    let second = manager
        .try_lock("fleeting", TTL, Duration::ZERO, RETRY)
        .await
        .unwrap()
        .expect("re-acquisition after expiry");

    // The stale handle presents a token that is no longer current.
    assert!(!first.release().await.unwrap());
    assert!(second.release().await.unwrap());
}

#[tokio::test]
async fn release_reports_false_once_the_key_is_gone() {
    let manager = lock_manager().await;

    let lock = manager
        .try_lock("once", TTL, Duration::ZERO, RETRY)
        .await
        .unwrap()
        .expect("acquisition");

    assert!(lock.release().await.unwrap());
    assert!(!lock.release().await.unwrap());
}

#[tokio::test]
async fn waiting_acquisition_succeeds_after_release() {
    let manager = lock_manager().await;

    let held = manager
        .try_lock("handover", TTL, Duration::ZERO, RETRY)
        .await
        .unwrap()
        .expect("initial acquisition");

    let releaser = {
        let held = held;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            held.release().await.unwrap();
        })
    };

    let started = Instant::now();
    let lock = manager
        .try_lock("handover", TTL, Duration::from_secs(2), RETRY)
        .await
        .unwrap()
        .expect("acquisition within the wait budget");

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(lock.release().await.unwrap());
    releaser.await.unwrap();
}

#[tokio::test]
async fn with_lock_raises_not_acquired_on_contention() {
    let manager = lock_manager().await;

    let held = manager
        .try_lock("busy", TTL, Duration::ZERO, RETRY)
        .await
        .unwrap()
        .expect("initial acquisition");

    let result = manager
        .with_lock("busy", TTL, Duration::ZERO, RETRY, async { 42 })
        .await;
    match result {
        Err(LockError::NotAcquired(key)) => assert_eq!(key, "busy"),
        other => panic!("expected NotAcquired, got {other:?}"),
    }

    assert!(held.release().await.unwrap());

    let value = manager
        .with_lock("busy", TTL, Duration::ZERO, RETRY, async { 42 })
        .await
        .unwrap();
    assert_eq!(value, 42);

    // with_lock released on the way out; the key is free again.
    let free = manager
        .try_lock("busy", TTL, Duration::ZERO, RETRY)
        .await
        .unwrap();
    assert!(free.is_some());
}

#[tokio::test]
async fn zero_ttl_is_rejected() {
    let manager = lock_manager().await;
    match manager
        .try_lock("no-ttl", Duration::ZERO, Duration::ZERO, RETRY)
        .await
    {
        Err(LockError::InvalidTtl) => {}
        other => panic!("expected InvalidTtl, got {other:?}"),
    }
}
