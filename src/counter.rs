use std::{fmt, str::FromStr, sync::Arc};

use serde::Serialize;
use tracing::{debug, info};

use crate::store::{is_count, KeyValueStore, StoreError};

/// Store key holding the visit count.
pub const VISITS_KEY: &str = "visits";

#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("failed to initialize counter: {0}")]
    Initialization(#[source] StoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a visit is applied to the store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IncrementStrategy {
    /// Read the value then write the next one. Concurrent visits can read the
    /// same value and overwrite each other.
    #[default]
    ReadWrite,
    /// One store side increment. No lost updates.
    Atomic,
}

/// What startup initialization does when a count already exists.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InitPolicy {
    /// Always write 0.
    #[default]
    Reset,
    /// Write 0 only when the key is missing.
    IfAbsent,
}

/// Outcome of one recorded visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Visit {
    pub previous: u64,
    pub current: u64,
}

/// Single named counter persisted in a [`KeyValueStore`].
///
/// Nothing is cached in process: every call goes to the store.
#[derive(Clone)]
pub struct CounterService {
    store: Arc<dyn KeyValueStore>,
    strategy: IncrementStrategy,
}

impl CounterService {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
            strategy: IncrementStrategy::default(),
        }
    }

    pub fn with_strategy(self, strategy: IncrementStrategy) -> Self {
        Self { strategy, ..self }
    }

    /// Sets the counter to 0 according to `policy`.
    pub async fn initialize(&self, policy: InitPolicy) -> Result<(), CounterError> {
        match policy {
            InitPolicy::Reset => {
                self.store
                    .set(VISITS_KEY, "0")
                    .await
                    .map_err(CounterError::Initialization)?;
                info!("Counter {VISITS_KEY:?} reset to 0");
            }
            InitPolicy::IfAbsent => {
                let written = self
                    .store
                    .set_if_absent(VISITS_KEY, "0")
                    .await
                    .map_err(CounterError::Initialization)?;
                if written {
                    info!("Counter {VISITS_KEY:?} initialized to 0");
                } else {
                    info!("Counter {VISITS_KEY:?} already present, keeping it");
                }
            }
        }
        Ok(())
    }

    /// Current count without recording a visit. A missing key is 0.
    pub async fn current(&self) -> Result<u64, CounterError> {
        let value = self.store.get(VISITS_KEY).await?;
        Ok(parse_count(value.as_deref())?)
    }

    /// Records one visit and returns the count before and after it.
    ///
    /// When the read fails nothing is written.
    pub async fn increment_and_get(&self) -> Result<Visit, CounterError> {
        let visit = match self.strategy {
            IncrementStrategy::ReadWrite => {
                let previous = self.current().await?;
                let current = previous.checked_add(1).ok_or_else(|| StoreError::Corrupt {
                    key: VISITS_KEY.into(),
                    value: previous.to_string(),
                })?;
                self.store.set(VISITS_KEY, &current.to_string()).await?;
                Visit { previous, current }
            }
            IncrementStrategy::Atomic => {
                let raw = self.store.incr(VISITS_KEY).await?;
                let current = u64::try_from(raw)
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| StoreError::Corrupt {
                        key: VISITS_KEY.into(),
                        value: raw.to_string(),
                    })?;
                Visit {
                    previous: current - 1,
                    current,
                }
            }
        };
        debug!(previous = visit.previous, current = visit.current, "Visit recorded");
        Ok(visit)
    }
}

fn parse_count(value: Option<&str>) -> Result<u64, StoreError> {
    match value {
        None => Ok(0),
        Some(v) => Some(v)
            .filter(|v| is_count(v))
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| StoreError::Corrupt {
                key: VISITS_KEY.into(),
                value: v.to_owned(),
            }),
    }
}

impl FromStr for IncrementStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read-write" | "read_write" | "readwrite" => Ok(Self::ReadWrite),
            "atomic" => Ok(Self::Atomic),
            other => anyhow::bail!("unknown increment strategy {other:?}, expected read-write or atomic"),
        }
    }
}

impl FromStr for InitPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(Self::Reset),
            "if-absent" | "if_absent" => Ok(Self::IfAbsent),
            other => anyhow::bail!("unknown init policy {other:?}, expected reset or if-absent"),
        }
    }
}

impl fmt::Display for IncrementStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadWrite => "read-write",
            Self::Atomic => "atomic",
        })
    }
}

impl fmt::Display for InitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reset => "reset",
            Self::IfAbsent => "if-absent",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn counter(strategy: IncrementStrategy) -> (CounterService, MemoryStore) {
        let store = MemoryStore::new();
        (CounterService::new(store.clone()).with_strategy(strategy), store)
    }

    #[tokio::test]
    async fn missing_key_counts_as_zero() {
        for strategy in [IncrementStrategy::ReadWrite, IncrementStrategy::Atomic] {
            let (counter, store) = counter(strategy);
            let visit = counter.increment_and_get().await.unwrap();
            assert_eq!(visit, Visit { previous: 0, current: 1 });
            assert_eq!(store.peek(VISITS_KEY).as_deref(), Some("1"));
        }
    }

    #[tokio::test]
    async fn sequential_visits_add_one_each() {
        for strategy in [IncrementStrategy::ReadWrite, IncrementStrategy::Atomic] {
            let (counter, store) = counter(strategy);
            counter.initialize(InitPolicy::Reset).await.unwrap();
            for n in 0..5 {
                let visit = counter.increment_and_get().await.unwrap();
                assert_eq!(visit.previous, n);
                assert_eq!(visit.current, n + 1);
            }
            assert_eq!(store.peek(VISITS_KEY).as_deref(), Some("5"));
            assert_eq!(counter.current().await.unwrap(), 5);
        }
    }

    #[tokio::test]
    async fn reset_always_writes_zero() {
        let (counter, store) = counter(IncrementStrategy::ReadWrite);
        counter.initialize(InitPolicy::Reset).await.unwrap();
        assert_eq!(store.peek(VISITS_KEY).as_deref(), Some("0"));
        counter.increment_and_get().await.unwrap();
        counter.increment_and_get().await.unwrap();
        counter.initialize(InitPolicy::Reset).await.unwrap();
        assert_eq!(store.peek(VISITS_KEY).as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn if_absent_keeps_existing_count() {
        let (counter, store) = counter(IncrementStrategy::ReadWrite);
        counter.initialize(InitPolicy::IfAbsent).await.unwrap();
        assert_eq!(store.peek(VISITS_KEY).as_deref(), Some("0"));
        counter.increment_and_get().await.unwrap();
        counter.increment_and_get().await.unwrap();
        counter.initialize(InitPolicy::IfAbsent).await.unwrap();
        assert_eq!(store.peek(VISITS_KEY).as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn initialize_failure_is_reported() {
        let (counter, store) = counter(IncrementStrategy::ReadWrite);
        store.disconnect();
        assert!(matches!(
            counter.initialize(InitPolicy::Reset).await,
            Err(CounterError::Initialization(StoreError::Connection(_)))
        ));
    }

    #[tokio::test]
    async fn disconnected_store_leaves_count_unchanged() {
        for strategy in [IncrementStrategy::ReadWrite, IncrementStrategy::Atomic] {
            let (counter, store) = counter(strategy);
            counter.increment_and_get().await.unwrap();
            store.disconnect();
            assert!(matches!(
                counter.increment_and_get().await,
                Err(CounterError::Store(StoreError::Connection(_)))
            ));
            store.reconnect();
            assert_eq!(store.peek(VISITS_KEY).as_deref(), Some("1"));
        }
    }

    #[tokio::test]
    async fn corrupt_value_is_not_overwritten() {
        for strategy in [IncrementStrategy::ReadWrite, IncrementStrategy::Atomic] {
            for value in ["-3", "+7", " 7", "abc", "18446744073709551616"] {
                let (counter, store) = counter(strategy);
                store.set(VISITS_KEY, value).await.unwrap();
                assert!(
                    matches!(
                        counter.increment_and_get().await,
                        Err(CounterError::Store(StoreError::Corrupt { .. }))
                    ),
                    "{strategy} accepted {value:?}"
                );
                assert_eq!(store.peek(VISITS_KEY).as_deref(), Some(value));
            }
        }
    }

    #[tokio::test]
    async fn current_reads_plain_digits_only() {
        let (counter, store) = counter(IncrementStrategy::ReadWrite);
        store.set(VISITS_KEY, "42").await.unwrap();
        assert_eq!(counter.current().await.unwrap(), 42);
        store.set(VISITS_KEY, "+7").await.unwrap();
        assert!(counter.current().await.is_err());
    }

    #[tokio::test]
    async fn atomic_visits_do_not_lose_updates() {
        let (counter, store) = counter(IncrementStrategy::Atomic);
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move { counter.increment_and_get().await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.peek(VISITS_KEY).as_deref(), Some("50"));
    }

    #[test]
    fn parses_strategy_and_policy_names() {
        assert_eq!("atomic".parse::<IncrementStrategy>().unwrap(), IncrementStrategy::Atomic);
        assert_eq!(
            "Read-Write".parse::<IncrementStrategy>().unwrap(),
            IncrementStrategy::ReadWrite
        );
        assert_eq!("if_absent".parse::<InitPolicy>().unwrap(), InitPolicy::IfAbsent);
        assert!("sometimes".parse::<InitPolicy>().is_err());
    }
}
