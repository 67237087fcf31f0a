use super::{Coordinator, CoordinatorLogger, LogSink, direct_children};
use crate::error::{MetaError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

type Tree = BTreeMap<String, Vec<u8>>;

/// In-process coordination backend.
///
/// Every client obtained through [`MemoryCoordinator::session`] shares the
/// same tree, so create-if-absent is linearizable across them just like
/// separate processes talking to one service.
pub struct MemoryCoordinator {
    tree: Arc<StdMutex<Tree>>,
    closed: AtomicBool,
    log: LogSink,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::with_tree(Arc::new(StdMutex::new(Tree::new())))
    }

    fn with_tree(tree: Arc<StdMutex<Tree>>) -> Self {
        Self {
            tree,
            closed: AtomicBool::new(false),
            log: LogSink::default(),
        }
    }

    /// Another independent client attached to the same tree.
    pub fn session(&self) -> Self {
        Self::with_tree(self.tree.clone())
    }

    fn tree(&self) -> Result<MutexGuard<'_, Tree>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MetaError::Coordination("client closed".to_string()));
        }
        self.tree
            .lock()
            .map_err(|_| MetaError::Coordination("memory tree poisoned".to_string()))
    }
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn create(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut tree = self.tree()?;
        if tree.contains_key(path) {
            return Err(MetaError::NodeExists(path.to_string()));
        }
        tree.insert(path.to_string(), data.to_vec());
        self.log.emit(&format!("create node {}", path));
        Ok(())
    }

    async fn update(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut tree = self.tree()?;
        tree.insert(path.to_string(), data.to_vec());
        self.log.emit(&format!("update node {}", path));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut tree = self.tree()?;
        if tree.remove(path).is_none() {
            return Err(MetaError::NodeNotFound(path.to_string()));
        }
        self.log.emit(&format!("delete node {}", path));
        Ok(())
    }

    async fn load_data(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let tree = self.tree()?;
        Ok(tree.get(path).cloned())
    }

    async fn list_file(&self, dir: &str) -> Result<Vec<String>> {
        let tree = self.tree()?;
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(direct_children(
            dir,
            tree.range(prefix.clone()..)
                .map(|(key, _)| key.as_str())
                .take_while(|key| key.starts_with(prefix.as_str())),
        ))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.log.emit("memory client closed");
        }
        Ok(())
    }

    fn set_logger(&self, logger: CoordinatorLogger) {
        self.log.set(logger);
    }
}
