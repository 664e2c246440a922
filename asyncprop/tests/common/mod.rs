#![allow(dead_code)]

use asyncprop::Fetch;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A fake remote service that counts how often it is hit.
#[derive(Clone, Default)]
pub struct FakeApi {
    calls: Arc<AtomicUsize>,
    latency: Duration,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        FakeApi {
            calls: Arc::default(),
            latency,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Responds with `value` after the configured latency.
    pub fn respond(&self, value: Value) -> Fetch {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency;
        Fetch::deferred(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            value
        })
    }

    /// Fails with `message` after the configured latency.
    pub fn fail(&self, message: &str) -> Fetch {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency;
        let message = message.to_string();
        Fetch::deferred(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Err::<Value, _>(message)
        })
    }

    /// The n-th page of three consecutive numbers, starting at 1.
    pub fn page(&self, n: u64) -> Fetch {
        let start = n * 3 + 1;
        self.respond(json!([start, start + 1, start + 2]))
    }
}

/// Lets every ready task run without moving the clock.
pub async fn run_pending_tasks() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
