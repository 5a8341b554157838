//! Durable idempotency store plus a monotonic per-topic offset allocator.
//!
//! `put` is the idempotency barrier: once a key holds a result, retries for
//! the same key observe that result instead of re-invoking the tool. Offset
//! allocation is a single atomic read-modify-write in the store, so
//! concurrent callers always observe strictly increasing, gapless values.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("outbox database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("outbox decode error for key `{key}`: {reason}")]
    Decode { key: String, reason: String },
}

#[async_trait]
pub trait Outbox: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, OutboxError>;
    async fn put(&self, key: &str, value: &Value) -> Result<(), OutboxError>;
    async fn next_offset(&self, topic: &str) -> Result<i64, OutboxError>;
}

pub struct SqlOutbox {
    pool: DbPool,
}

impl SqlOutbox {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Outbox for SqlOutbox {
    async fn get(&self, key: &str) -> Result<Option<Value>, OutboxError> {
        let row: Option<String> = sqlx::query_scalar("SELECT v FROM outbox WHERE k = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|raw| {
            serde_json::from_str(&raw).map_err(|error| OutboxError::Decode {
                key: key.to_string(),
                reason: error.to_string(),
            })
        })
        .transpose()
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), OutboxError> {
        sqlx::query(
            "INSERT INTO outbox (k, v) VALUES (?, ?)
             ON CONFLICT(k) DO UPDATE SET v = excluded.v",
        )
        .bind(key)
        .bind(value.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn next_offset(&self, topic: &str) -> Result<i64, OutboxError> {
        let offset: i64 = sqlx::query_scalar(
            "INSERT INTO offsets (topic, val) VALUES (?, 0)
             ON CONFLICT(topic) DO UPDATE SET val = val + 1
             RETURNING val",
        )
        .bind(topic)
        .fetch_one(&self.pool)
        .await?;

        Ok(offset)
    }
}

#[derive(Default)]
pub struct InMemoryOutbox {
    entries: Mutex<HashMap<String, Value>>,
    offsets: Mutex<HashMap<String, i64>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn get(&self, key: &str) -> Result<Option<Value>, OutboxError> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), OutboxError> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn next_offset(&self, topic: &str) -> Result<i64, OutboxError> {
        let mut offsets = match self.offsets.lock() {
            Ok(offsets) => offsets,
            Err(poisoned) => poisoned.into_inner(),
        };
        let offset = offsets
            .entry(topic.to_string())
            .and_modify(|offset| *offset += 1)
            .or_insert(0);
        Ok(*offset)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use serde_json::json;

    use super::{InMemoryOutbox, Outbox, SqlOutbox};
    use crate::{connect_with_settings, migrations};

    // A single-connection pool keeps one private in-memory database per test.
    async fn sql_outbox() -> SqlOutbox {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlOutbox::new(pool)
    }

    #[tokio::test]
    async fn get_returns_none_for_missing_keys() {
        let outbox = sql_outbox().await;
        let found = outbox.get("e1:fetch_customer").await.expect("get");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips_the_stored_result() {
        let outbox = sql_outbox().await;
        let result = json!({"status": 200, "json": {"tier": "gold"}});

        outbox.put("e1:fetch_customer", &result).await.expect("put");

        let found = outbox.get("e1:fetch_customer").await.expect("get");
        assert_eq!(found, Some(result));
    }

    #[tokio::test]
    async fn offsets_start_at_zero_and_increase_without_gaps() {
        let outbox = sql_outbox().await;

        for expected in 0..5 {
            let offset = outbox.next_offset("oms.events").await.expect("next offset");
            assert_eq!(offset, expected);
        }
    }

    #[tokio::test]
    async fn offsets_are_tracked_per_topic() {
        let outbox = sql_outbox().await;

        assert_eq!(outbox.next_offset("oms.events").await.expect("oms 0"), 0);
        assert_eq!(outbox.next_offset("oms.events").await.expect("oms 1"), 1);
        assert_eq!(outbox.next_offset("tickets").await.expect("tickets 0"), 0);
        assert_eq!(outbox.next_offset("jms:QUEUE.DEFAULT").await.expect("jms 0"), 0);
    }

    #[tokio::test]
    async fn concurrent_allocations_never_hand_out_the_same_offset() {
        let outbox = Arc::new(sql_outbox().await);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let outbox = Arc::clone(&outbox);
            handles.push(tokio::spawn(async move {
                let mut allocated = Vec::new();
                for _ in 0..5 {
                    allocated.push(outbox.next_offset("oms.events").await.expect("next offset"));
                }
                allocated
            }));
        }

        let mut seen = BTreeSet::new();
        for handle in handles {
            for offset in handle.await.expect("task join") {
                assert!(seen.insert(offset), "offset {offset} handed out twice");
            }
        }

        assert_eq!(seen.len(), 20);
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&19));
    }

    #[tokio::test]
    async fn in_memory_outbox_matches_sql_semantics() {
        let outbox = InMemoryOutbox::new();

        assert!(outbox.get("k").await.expect("get").is_none());
        outbox.put("k", &json!({"offset": 0})).await.expect("put");
        assert_eq!(outbox.get("k").await.expect("get"), Some(json!({"offset": 0})));

        assert_eq!(outbox.next_offset("t").await.expect("t 0"), 0);
        assert_eq!(outbox.next_offset("t").await.expect("t 1"), 1);
        assert_eq!(outbox.next_offset("u").await.expect("u 0"), 0);
    }
}
