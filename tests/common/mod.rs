#![allow(dead_code)]

use askdata::error::Result;
use askdata::store::{DocumentStore, MemoryStore, Record};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn fenced(sql: &str) -> String {
    format!("```sql\n{}\n```", sql)
}

/// sales, users and marketing; add `payroll` with `with_payroll`.
pub fn fixture_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store
        .insert_json(
            "sales",
            &json!([
                {"_id": "s1", "channel": "web", "revenue": 100.0, "ad_spend": 10.0, "day": "2024-01-01"},
                {"_id": "s2", "channel": "store", "revenue": 40.0, "ad_spend": 5.0, "day": "2024-01-02"},
                {"_id": "s3", "channel": "web", "revenue": 60.0, "ad_spend": 8.0, "day": "2024-01-03"},
                {"_id": "s4", "channel": "partner", "revenue": 10.0, "ad_spend": 1.0, "day": "2024-01-04"}
            ]),
        )
        .unwrap();
    store
        .insert_json(
            "users",
            &json!([
                {"_id": "u1", "username": "alice", "role": "admin"},
                {"_id": "u2", "username": "bob", "role": "analyst"}
            ]),
        )
        .unwrap();
    store
        .insert_json(
            "marketing",
            &json!([
                {"channel": "web", "clicks": 120},
                {"channel": "store", "clicks": 30}
            ]),
        )
        .unwrap();
    store
}

pub fn with_payroll(mut store: MemoryStore) -> MemoryStore {
    store
        .insert_json(
            "payroll",
            &json!([
                {"employee": "carol", "channel": "web", "revenue": 999.0, "salary": 5000.0}
            ]),
        )
        .unwrap();
    store
}

/// Serves the first `find_all` of `failing` (profiling) and fails every later one.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub failing: String,
    loads: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, failing: &str) -> Self {
        Self {
            inner,
            failing: failing.to_string(),
            loads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Record>> {
        if collection == self.failing && self.loads.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(askdata::AssistantError::Store(format!("{} went away", collection)));
        }
        self.inner.find_all(collection).await
    }
}
