//! Key-value backends behind the job and step repositories

mod memory;
mod sqlite;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Minimal string store with optional per-entry expiry.
///
/// Expired entries are invisible to `get` and `keys` even before
/// `purge_expired` reclaims them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace `key`. `ttl = None` never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Live keys starting with `prefix`, in lexical order.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}
