//! Key-value storage behind the visit counter.
//!
//! The counter only needs a handful of string commands, so the seam is a small
//! trait. [`RedisStore`] talks to a real server, [`MemoryStore`] keeps values
//! in process and can simulate an unreachable store.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store command failed: {0}")]
    Command(#[from] redis::RedisError),
    #[error("value at {key:?} is not a non-negative integer: {value:?}")]
    Corrupt { key: String, value: String },
}

/// Minimal string command set over an external key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value at `key`, `None` when the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Writes `value` only when `key` is missing. Returns whether it wrote.
    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Increments the integer at `key` by one in a single store command and
    /// returns the new value. A missing key counts as 0. A value that is not
    /// a count fails with [`StoreError::Corrupt`] and is left as it is.
    async fn incr(&self, key: &str) -> StoreResult<i64>;
}

/// Whether `value` is a stored count: ascii digits only, no sign or
/// whitespace.
pub fn is_count(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
