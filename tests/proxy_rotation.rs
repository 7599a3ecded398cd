//! End-to-end proxy rotation: a dead endpoint drops out of the ring and
//! rejoins once its cooldown elapses.

use std::time::Duration;

use ad_library_collector::proxy::ProxyPool;

#[tokio::test]
async fn dead_endpoint_drops_out_and_rejoins_after_cooldown() {
    let pool = ProxyPool::with_options(
        vec!["p1:8080".into(), "p2:8080".into(), "p3:8080".into()],
        2,
        Duration::from_millis(60),
    )
    .unwrap();

    let p1 = pool.next().await.unwrap();
    assert!(p1.contains("p1"));

    // Two consecutive failures push p1 past max_failures and mark it dead.
    pool.mark_failure(&p1).await;
    pool.mark_failure(&p1).await;

    // p1 is now excluded from the ring: the next several draws cycle only
    // through p2 and p3.
    for _ in 0..4 {
        let endpoint = pool.next().await.unwrap();
        assert!(!endpoint.contains("p1"), "dead endpoint {endpoint} was handed out");
    }

    tokio::time::sleep(Duration::from_millis(90)).await;

    // Past cooldown, p1 is eligible again and eventually reappears.
    let mut revived = Vec::new();
    for _ in 0..3 {
        revived.push(pool.next().await.unwrap());
    }
    assert!(revived.iter().any(|e| e.contains("p1")));
}
