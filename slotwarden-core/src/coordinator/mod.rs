//! Coordination service clients.
//!
//! The store only needs a narrow hierarchical key/value surface with an
//! atomic create-if-absent. Backends (etcd, Redis, in-memory) implement
//! [`Coordinator`]; session handling and retries stay inside each backend.

pub mod etcd;
pub mod factory;
pub mod memory;
pub mod redis;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

pub use factory::CoordinatorBuilder;

/// Sink for the client's own diagnostic messages.
pub type CoordinatorLogger = Arc<dyn Fn(&str) + Send + Sync>;

/// Hierarchical node operations used by the store.
///
/// Nodes are persistent: no backend attaches an etcd lease or a Redis
/// expiry, so a lock node left by a crashed owner stays until someone
/// deletes it (`slotwarden-admin remove-lock --force`). The configured
/// request timeout bounds connecting and each call, not node lifetime.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Create a node. Fails with `NodeExists` if the path is taken.
    async fn create(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Overwrite a node, creating it if absent.
    async fn update(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Remove a node. Fails with `NodeNotFound` if absent.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Read a node; `None` if it does not exist.
    async fn load_data(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Full paths of the direct children of `dir`, sorted.
    async fn list_file(&self, dir: &str) -> Result<Vec<String>>;

    async fn close(&self) -> Result<()>;

    fn set_logger(&self, logger: CoordinatorLogger);
}

/// Logger slot shared by the backends.
#[derive(Default)]
pub(crate) struct LogSink {
    logger: RwLock<Option<CoordinatorLogger>>,
}

impl LogSink {
    pub(crate) fn set(&self, logger: CoordinatorLogger) {
        if let Ok(mut slot) = self.logger.write() {
            *slot = Some(logger);
        }
    }

    pub(crate) fn emit(&self, message: &str) {
        let logger = match self.logger.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        if let Some(logger) = logger {
            logger(message);
        }
    }
}

/// Reduce a set of descendant keys to the direct children of `dir`.
pub(crate) fn direct_children<'a>(
    dir: &str,
    keys: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let base = dir.trim_end_matches('/');
    let prefix = format!("{}/", base);

    let children: BTreeSet<String> = keys
        .into_iter()
        .filter_map(|key| key.strip_prefix(prefix.as_str()))
        .filter_map(|rest| rest.split('/').next())
        .filter(|name| !name.is_empty())
        .map(|name| format!("{}{}", prefix, name))
        .collect();

    children.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_children_collapses_nested_keys() {
        let keys = [
            "/sw/demo/proxy/proxy-0002",
            "/sw/demo/proxy/proxy-0001",
            "/sw/demo/proxy/nested/deeper",
            "/sw/demo/proxy-sibling",
            "/sw/demo/group/group-0001",
        ];

        assert_eq!(
            direct_children("/sw/demo/proxy", keys),
            vec![
                "/sw/demo/proxy/nested".to_string(),
                "/sw/demo/proxy/proxy-0001".to_string(),
                "/sw/demo/proxy/proxy-0002".to_string(),
            ]
        );
        assert_eq!(direct_children("/sw/demo/proxy/", keys).len(), 3);
        assert!(direct_children("/sw/other", keys).is_empty());
    }

    #[test]
    fn test_log_sink_forwards_after_set() {
        let sink = LogSink::default();
        sink.emit("dropped");

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let captured = seen.clone();
        sink.set(Arc::new(move |message: &str| {
            captured.lock().unwrap().push(message.to_string());
        }));
        sink.emit("create /a");

        assert_eq!(*seen.lock().unwrap(), vec!["create /a".to_string()]);
    }
}
