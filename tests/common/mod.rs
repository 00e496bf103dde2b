#![allow(dead_code)]

pub mod cluster;
pub mod reconcilers;

pub use cluster::*;
pub use reconcilers::*;

use std::time::Duration;

pub fn foo() -> reconciler_core::ResourceId {
    reconciler_core::ResourceId::namespaced("ns1", "foo")
}

/// Poll `condition` while letting (paused) time advance
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Let every timer and task that could still fire do so
pub async fn quiesce() {
    tokio::time::sleep(Duration::from_secs(30)).await;
}
