//! Human-readable order numbers: `ORD-YYYYMMDD-NNNNNN`.
//!
//! The numeric suffix comes from a monotonic sequence, so uniqueness never
//! depends on counting existing orders.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;

pub fn format_order_number(date: DateTime<Utc>, sequence: u64) -> String {
    format!("ORD-{}-{:06}", date.format("%Y%m%d"), sequence)
}

#[async_trait]
pub trait OrderNumberGenerator: Send + Sync {
    async fn next_number(&self) -> Result<String>;
}

/// Process-local atomic counter.
#[derive(Debug, Clone)]
pub struct SequenceOrderNumbers {
    next: Arc<AtomicU64>,
}

impl SequenceOrderNumbers {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }
}

impl Default for SequenceOrderNumbers {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderNumberGenerator for SequenceOrderNumbers {
    async fn next_number(&self) -> Result<String> {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(format_order_number(Utc::now(), sequence))
    }
}

/// Backed by the `order_number_seq` database sequence.
#[derive(Clone)]
pub struct PostgresOrderNumbers {
    pool: PgPool,
}

impl PostgresOrderNumbers {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderNumberGenerator for PostgresOrderNumbers {
    async fn next_number(&self) -> Result<String> {
        let sequence: i64 = sqlx::query_scalar("SELECT nextval('order_number_seq')")
            .fetch_one(&self.pool)
            .await?;
        Ok(format_order_number(Utc::now(), sequence.unsigned_abs()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn format_pads_sequence() {
        let date = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(format_order_number(date, 42), "ORD-20260309-000042");
        assert_eq!(format_order_number(date, 1_234_567), "ORD-20260309-1234567");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_numbers_are_unique() {
        let numbers = SequenceOrderNumbers::new();
        let mut handles = Vec::new();
        for _ in 0..200 {
            let numbers = numbers.clone();
            handles.push(tokio::spawn(async move { numbers.next_number().await.unwrap() }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()));
        }
        assert_eq!(seen.len(), 200);
    }
}
