use super::{Coordinator, CoordinatorLogger, LogSink, direct_children};
use crate::error::{MetaError, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::Mutex;

/// Redis-based coordination client. Node paths are used verbatim as keys.
pub struct RedisCoordinator {
    conn: Mutex<redis::aio::MultiplexedConnection>,
    log: LogSink,
}

impl RedisCoordinator {
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| MetaError::Config(format!("Failed to connect to Redis: {}", e)))?;

        let mut conn = tokio::time::timeout(
            request_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| MetaError::Coordination(format!("Redis connect to {} timed out", url)))??;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| MetaError::Coordination(format!("Redis ping failed: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            log: LogSink::default(),
        })
    }
}

fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl Coordinator for RedisCoordinator {
    async fn create(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let created: bool = conn.set_nx(path, data).await?;
        if !created {
            return Err(MetaError::NodeExists(path.to_string()));
        }

        self.log.emit(&format!("redis create node {}", path));
        Ok(())
    }

    async fn update(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let _: () = conn.set(path, data).await?;

        self.log.emit(&format!("redis update node {}", path));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let removed: i64 = conn.del(path).await?;
        if removed == 0 {
            return Err(MetaError::NodeNotFound(path.to_string()));
        }

        self.log.emit(&format!("redis delete node {}", path));
        Ok(())
    }

    async fn load_data(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.lock().await;
        let value: Option<Vec<u8>> = conn.get(path).await?;
        Ok(value)
    }

    async fn list_file(&self, dir: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.lock().await;
        let pattern = format!("{}/*", escape_glob(dir.trim_end_matches('/')));
        let keys: Vec<String> = conn.keys(pattern).await?;

        Ok(direct_children(dir, keys.iter().map(String::as_str)))
    }

    async fn close(&self) -> Result<()> {
        self.log.emit("redis client closed");
        Ok(())
    }

    fn set_logger(&self, logger: CoordinatorLogger) {
        self.log.set(logger);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("/sw/demo/proxy"), "/sw/demo/proxy");
        assert_eq!(escape_glob("/sw/a*b?[c]"), "/sw/a\\*b\\?\\[c\\]");
    }
}
