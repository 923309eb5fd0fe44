// tests/resource_locks.rs

use std::time::Duration;

use kiln::exec::ResourceLocks;
use kiln_test_utils::with_timeout;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_guard_holds_resources_until_dropped() {
    let locks = ResourceLocks::new();
    let guard = locks.acquire(&names(&["db", "port-8080"])).await.unwrap();
    assert!(locks.is_held("db"));
    assert!(locks.is_held("port-8080"));
    assert!(!locks.is_held("gpu"));

    drop(guard);
    assert!(!locks.is_held("db"));
    assert!(!locks.is_held("port-8080"));
}

#[tokio::test]
async fn test_second_holder_waits_for_release() {
    let locks = ResourceLocks::new();
    let first = locks.acquire(&names(&["db"])).await.unwrap();

    let waiting = {
        let locks = locks.clone();
        tokio::spawn(async move { locks.acquire(&names(&["db"])).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiting.is_finished());

    drop(first);
    with_timeout(waiting).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_overlapping_sets_in_any_order_do_not_deadlock() {
    let locks = ResourceLocks::new();
    let mut handles = Vec::new();
    for i in 0..8 {
        let locks = locks.clone();
        let set = if i % 2 == 0 { names(&["a", "b", "a"]) } else { names(&["b", "a"]) };
        handles.push(tokio::spawn(async move {
            let _guard = locks.acquire(&set).await.unwrap();
            tokio::task::yield_now().await;
        }));
    }
    for handle in handles {
        with_timeout(handle).await.unwrap();
    }
    assert!(!locks.is_held("a"));
}
