use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError, Script};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{KeyValueStore, StoreError, StoreResult};

/// Redis backed store.
///
/// Opening only parses the url. The multiplexed connection is established on
/// first use and then shared by every clone; while it cannot be established
/// each command fails with [`StoreError::Connection`] and the next command
/// tries again. Nothing retries within a single command.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: Arc<OnceCell<ConnectionManager>>,
}

impl RedisStore {
    pub fn open(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            connection: Default::default(),
        })
    }

    /// Establishes the connection now instead of on the first command.
    pub async fn connect(&self) -> StoreResult<()> {
        self.connection().await?;
        info!("Connected to redis at {}", self.client.get_connection_info().addr);
        Ok(())
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| {
                debug!("Opening redis connection");
                ConnectionManager::new_with_backoff(self.client.clone(), 2, 100, 0)
            })
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(manager.clone())
    }
}

// INCR alone would happily move "-3" to "-2".
const GUARDED_INCR: &str = r#"
local value = redis.call('GET', KEYS[1])
if value and not string.match(value, '^%d+$') then
    return redis.error_reply('CORRUPT ' .. value)
end
return redis.call('INCR', KEYS[1])
"#;

fn command_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command(e)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut con = self.connection().await?;
        con.get(key).await.map_err(command_error)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut con = self.connection().await?;
        con.set(key, value).await.map_err(command_error)
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut con = self.connection().await?;
        con.set_nx(key, value).await.map_err(command_error)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut con = self.connection().await?;
        let script = Script::new(GUARDED_INCR);
        script
            .key(key)
            .invoke_async(&mut con)
            .await
            .map_err(|e| match e.code() {
                Some("CORRUPT") => StoreError::Corrupt {
                    key: key.to_owned(),
                    value: e.detail().unwrap_or_default().to_owned(),
                },
                _ => command_error(e),
            })
    }
}
