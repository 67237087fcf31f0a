//! Lock-gated topology store.
//!
//! A store becomes the single writer of a cluster's topology by creating
//! the cluster's `topom` node; the coordination service's create-if-absent
//! decides who wins. Every slot/proxy/group operation is refused unless the
//! lock is held by this instance.

use crate::coordinator::{Coordinator, CoordinatorBuilder};
use crate::error::{MetaError, Result};
use crate::models::{Entity, Group, Proxy, SlotMapping, Topom};
use crate::paths::{DEFAULT_ROOT, TopologyPaths};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub struct MetaStore {
    root: String,
    state: Mutex<StoreState>,
}

struct StoreState {
    client: Option<Box<dyn Coordinator>>,
    paths: Option<TopologyPaths>,
    locked: bool,
    closed: bool,
}

impl StoreState {
    fn client(&self) -> Result<&dyn Coordinator> {
        if self.closed {
            return Err(MetaError::Closed);
        }
        self.client.as_deref().ok_or(MetaError::Closed)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(MetaError::Closed);
        }
        Ok(())
    }

    /// Client and paths of the held lock.
    fn protected(&self) -> Result<(&dyn Coordinator, &TopologyPaths)> {
        let client = self.client()?;
        if !self.locked {
            return Err(MetaError::NotProtected);
        }
        let paths = self.paths.as_ref().ok_or(MetaError::NotProtected)?;
        Ok((client, paths))
    }
}

impl MetaStore {
    pub fn new(client: Box<dyn Coordinator>) -> Self {
        Self::with_root(client, DEFAULT_ROOT)
    }

    pub fn with_root(client: Box<dyn Coordinator>, root: impl Into<String>) -> Self {
        client.set_logger(Arc::new(|message: &str| {
            tracing::info!(target: "slotwarden::coordinator", "{}", message);
        }));

        Self {
            root: root.into(),
            state: Mutex::new(StoreState {
                client: Some(client),
                paths: None,
                locked: false,
                closed: false,
            }),
        }
    }

    pub async fn connect(builder: &CoordinatorBuilder) -> Result<Self> {
        let client = builder.build().await?;
        Ok(Self::with_root(client, builder.resolve_root()))
    }

    async fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().await
    }

    pub async fn is_protected(&self) -> bool {
        self.state().await.locked
    }

    pub async fn is_closed(&self) -> bool {
        self.state().await.closed
    }

    /// Cluster prefix of the last acquisition attempt; empty before any.
    pub async fn prefix(&self) -> String {
        self.state()
            .await
            .paths
            .as_ref()
            .map(|paths| paths.prefix().to_string())
            .unwrap_or_default()
    }

    /// Shut the store down for good.
    ///
    /// A lock still held is released first on a best-effort basis; failure
    /// to remove it is logged and does not fail the close.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state().await;
        if state.closed {
            return Ok(());
        }

        if let Some(client) = state.client.take() {
            if state.locked {
                if let Some(paths) = state.paths.as_ref() {
                    let lock_path = paths.lock_path();
                    match client.delete(&lock_path).await {
                        Ok(()) => tracing::info!("Released lock {} on close", lock_path),
                        Err(error) => {
                            tracing::warn!("Failed to release lock {} on close: {}", lock_path, error)
                        }
                    }
                }
            }
            if let Err(error) = client.close().await {
                tracing::warn!("Failed to close coordination client: {}", error);
            }
        }

        state.locked = false;
        state.closed = true;
        Ok(())
    }

    pub async fn acquire(&self, name: &str, topom: &Topom) -> Result<()> {
        let mut state = self.state().await;
        state.ensure_open()?;
        if state.locked {
            return Err(MetaError::AlreadyProtected);
        }

        let paths = TopologyPaths::new(&self.root, name)?;
        let lock_path = paths.lock_path();
        let payload = topom.encode()?;
        state.paths = Some(paths);

        state.client()?.create(&lock_path, &payload).await?;
        state.locked = true;

        tracing::info!("Acquired lock {} with token {}", lock_path, topom.token);
        Ok(())
    }

    pub async fn release(&self) -> Result<()> {
        let mut state = self.state().await;
        let (client, paths) = state.protected()?;

        let lock_path = paths.lock_path();
        let deleted = client.delete(&lock_path).await;
        match deleted {
            Ok(()) => {}
            Err(error @ MetaError::NodeNotFound(_)) => {
                // The lock is gone either way; stop acting as its owner.
                state.locked = false;
                tracing::warn!("Lock {} vanished before release", lock_path);
                return Err(error);
            }
            Err(error) => return Err(error),
        }
        state.locked = false;

        tracing::info!("Released lock {}", lock_path);
        Ok(())
    }

    /// Current holder of a cluster's lock, if any. Needs no protection.
    pub async fn load_leader(&self, name: &str) -> Result<Option<Topom>> {
        let state = self.state().await;
        let client = state.client()?;
        let paths = TopologyPaths::new(&self.root, name)?;

        match client.load_data(&paths.lock_path()).await? {
            Some(bytes) => Ok(Some(Topom::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// `None` when the slot has never been assigned.
    pub async fn load_slot_mapping(&self, slot_id: u32) -> Result<Option<SlotMapping>> {
        let state = self.state().await;
        let (client, paths) = state.protected()?;

        match client.load_data(&paths.slot_path(slot_id)).await? {
            Some(bytes) => Ok(Some(SlotMapping::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn save_slot_mapping(&self, slot_id: u32, slot: &SlotMapping) -> Result<()> {
        let state = self.state().await;
        let (client, paths) = state.protected()?;

        client.update(&paths.slot_path(slot_id), &slot.encode()?).await
    }

    pub async fn list_slot_mappings(&self) -> Result<Vec<SlotMapping>> {
        let state = self.state().await;
        let (client, paths) = state.protected()?;

        load_children(client, &paths.slot_base()).await
    }

    pub async fn list_proxy(&self) -> Result<Vec<Proxy>> {
        let state = self.state().await;
        let (client, paths) = state.protected()?;

        load_children(client, &paths.proxy_base()).await
    }

    pub async fn create_proxy(&self, proxy_id: u32, proxy: &Proxy) -> Result<()> {
        let state = self.state().await;
        let (client, paths) = state.protected()?;

        client.create(&paths.proxy_path(proxy_id), &proxy.encode()?).await
    }

    pub async fn remove_proxy(&self, proxy_id: u32) -> Result<()> {
        let state = self.state().await;
        let (client, paths) = state.protected()?;

        client.delete(&paths.proxy_path(proxy_id)).await
    }

    pub async fn list_group(&self) -> Result<Vec<Group>> {
        let state = self.state().await;
        let (client, paths) = state.protected()?;

        load_children(client, &paths.group_base()).await
    }

    pub async fn create_group(&self, group_id: u32, group: &Group) -> Result<()> {
        let state = self.state().await;
        let (client, paths) = state.protected()?;

        client.create(&paths.group_path(group_id), &group.encode()?).await
    }

    pub async fn update_group(&self, group_id: u32, group: &Group) -> Result<()> {
        let state = self.state().await;
        let (client, paths) = state.protected()?;

        client.update(&paths.group_path(group_id), &group.encode()?).await
    }

    pub async fn remove_group(&self, group_id: u32) -> Result<()> {
        let state = self.state().await;
        let (client, paths) = state.protected()?;

        client.delete(&paths.group_path(group_id)).await
    }
}

/// Load and decode every child of `dir`, stopping at the first failure.
async fn load_children<T: Entity>(client: &dyn Coordinator, dir: &str) -> Result<Vec<T>> {
    let files = client.list_file(dir).await?;

    let mut entities = Vec::with_capacity(files.len());
    for file in files {
        let bytes = client
            .load_data(&file)
            .await?
            .ok_or_else(|| MetaError::NodeNotFound(file.clone()))?;
        entities.push(T::decode(&bytes)?);
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::memory::MemoryCoordinator;

    fn leader(admin_addr: &str) -> Topom {
        Topom::new("demo", admin_addr)
    }

    fn proxy(id: u32, addr: &str) -> Proxy {
        Proxy {
            id,
            token: format!("proxy-token-{}", id),
            start_time: "2026-01-01T00:00:00+00:00".to_string(),
            admin_addr: format!("{}:11080", addr),
            proto_type: "tcp4".to_string(),
            proxy_addr: format!("{}:19000", addr),
            product_name: "demo".to_string(),
            pid: 4242,
            hostname: addr.to_string(),
        }
    }

    fn group(id: u32, servers: &[&str]) -> Group {
        Group {
            id,
            servers: servers.iter().map(|s| s.to_string()).collect(),
            promoting: false,
        }
    }

    async fn protected_store() -> (MetaStore, MemoryCoordinator) {
        let backend = MemoryCoordinator::new();
        let store = MetaStore::new(Box::new(backend.session()));
        store.acquire("demo", &leader("127.0.0.1:18080")).await.unwrap();
        (store, backend)
    }

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let backend = MemoryCoordinator::new();
        let store = MetaStore::new(Box::new(backend.session()));
        assert_eq!(store.prefix().await, "");

        let topom = leader("127.0.0.1:18080");
        store.acquire("demo", &topom).await.unwrap();
        assert!(store.is_protected().await);
        assert_eq!(store.prefix().await, "/slotwarden/demo");

        let stored = backend.load_data("/slotwarden/demo/topom").await.unwrap().unwrap();
        assert_eq!(Topom::decode(&stored).unwrap(), topom);
        assert_eq!(store.load_leader("demo").await.unwrap(), Some(topom.clone()));

        store.release().await.unwrap();
        assert!(!store.is_protected().await);
        assert_eq!(store.prefix().await, "/slotwarden/demo");
        assert_eq!(backend.load_data("/slotwarden/demo/topom").await.unwrap(), None);

        assert!(matches!(store.release().await, Err(MetaError::NotProtected)));

        store.acquire("demo", &topom).await.unwrap();
        assert!(store.is_protected().await);
    }

    #[tokio::test]
    async fn test_acquire_twice_is_rejected() {
        let (store, _backend) = protected_store().await;

        let err = store.acquire("demo", &leader("127.0.0.1:18081")).await.unwrap_err();
        assert!(matches!(err, MetaError::AlreadyProtected));
        assert!(store.is_protected().await);

        let err = store.acquire("other", &leader("127.0.0.1:18081")).await.unwrap_err();
        assert!(matches!(err, MetaError::AlreadyProtected));
        assert_eq!(store.prefix().await, "/slotwarden/demo");
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive_across_instances() {
        let backend = MemoryCoordinator::new();
        let first = MetaStore::new(Box::new(backend.session()));
        let second = MetaStore::new(Box::new(backend.session()));

        let winner = leader("10.0.0.1:18080");
        first.acquire("demo", &winner).await.unwrap();

        let err = second.acquire("demo", &leader("10.0.0.2:18080")).await.unwrap_err();
        assert!(matches!(err, MetaError::NodeExists(ref path) if path == "/slotwarden/demo/topom"));
        assert!(err.is_coordination_failure());
        assert!(!second.is_protected().await);
        assert_eq!(second.load_leader("demo").await.unwrap(), Some(winner));

        first.release().await.unwrap();
        second.acquire("demo", &leader("10.0.0.2:18080")).await.unwrap();
        assert!(second.is_protected().await);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_has_single_winner() {
        let backend = MemoryCoordinator::new();
        let stores: Vec<Arc<MetaStore>> = (0..8)
            .map(|_| Arc::new(MetaStore::new(Box::new(backend.session()))))
            .collect();

        let mut handles = Vec::new();
        for (i, store) in stores.iter().enumerate() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .acquire("demo", &leader(&format!("10.0.0.{}:18080", i)))
                    .await
            }));
        }

        let mut won = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => won += 1,
                Err(err) => assert!(matches!(err, MetaError::NodeExists(_))),
            }
        }
        assert_eq!(won, 1);
    }

    #[tokio::test]
    async fn test_distinct_clusters_do_not_contend() {
        let backend = MemoryCoordinator::new();
        let first = MetaStore::new(Box::new(backend.session()));
        let second = MetaStore::new(Box::new(backend.session()));

        first.acquire("alpha", &leader("10.0.0.1:18080")).await.unwrap();
        second.acquire("beta", &leader("10.0.0.2:18080")).await.unwrap();

        first.create_group(1, &group(1, &["10.0.1.1:6379"])).await.unwrap();
        assert!(second.list_group().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_crud_requires_protection() {
        let store = MetaStore::new(Box::new(MemoryCoordinator::new()));

        assert!(matches!(store.load_slot_mapping(7).await, Err(MetaError::NotProtected)));
        assert!(matches!(
            store.save_slot_mapping(7, &SlotMapping::new(7, 1)).await,
            Err(MetaError::NotProtected)
        ));
        assert!(matches!(store.list_slot_mappings().await, Err(MetaError::NotProtected)));
        assert!(matches!(store.list_proxy().await, Err(MetaError::NotProtected)));
        assert!(matches!(
            store.create_proxy(1, &proxy(1, "10.0.0.1")).await,
            Err(MetaError::NotProtected)
        ));
        assert!(matches!(store.remove_proxy(1).await, Err(MetaError::NotProtected)));
        assert!(matches!(store.list_group().await, Err(MetaError::NotProtected)));
        assert!(matches!(
            store.create_group(1, &group(1, &[])).await,
            Err(MetaError::NotProtected)
        ));
        assert!(matches!(
            store.update_group(1, &group(1, &[])).await,
            Err(MetaError::NotProtected)
        ));
        assert!(matches!(store.remove_group(1).await, Err(MetaError::NotProtected)));

        assert_eq!(store.load_leader("demo").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_crud_refused_after_release() {
        let (store, _backend) = protected_store().await;
        store.release().await.unwrap();

        assert!(matches!(store.list_group().await, Err(MetaError::NotProtected)));
        assert!(matches!(
            store.save_slot_mapping(1, &SlotMapping::new(1, 1)).await,
            Err(MetaError::NotProtected)
        ));
    }

    #[tokio::test]
    async fn test_unassigned_slot_loads_as_none() {
        let (store, _backend) = protected_store().await;
        assert_eq!(store.load_slot_mapping(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_slot_mapping_save_then_load() {
        let (store, backend) = protected_store().await;

        let mut slot = SlotMapping::new(7, 2);
        store.save_slot_mapping(7, &slot).await.unwrap();
        assert_eq!(store.load_slot_mapping(7).await.unwrap(), Some(slot.clone()));

        slot.group_id = 3;
        store.save_slot_mapping(7, &slot).await.unwrap();
        assert_eq!(store.load_slot_mapping(7).await.unwrap(), Some(slot.clone()));
        assert!(
            backend
                .load_data("/slotwarden/demo/slots/slot-0007")
                .await
                .unwrap()
                .is_some()
        );

        store.save_slot_mapping(1, &SlotMapping::new(1, 1)).await.unwrap();
        let all = store.list_slot_mappings().await.unwrap();
        assert_eq!(all, vec![SlotMapping::new(1, 1), slot]);
    }

    #[tokio::test]
    async fn test_duplicate_proxy_keeps_first() {
        let (store, backend) = protected_store().await;
        let first = proxy(1, "10.0.0.1");
        store.create_proxy(1, &first).await.unwrap();

        let err = store.create_proxy(1, &proxy(1, "10.0.0.9")).await.unwrap_err();
        assert!(matches!(err, MetaError::NodeExists(ref path) if path == "/slotwarden/demo/proxy/proxy-0001"));

        let stored = backend
            .load_data("/slotwarden/demo/proxy/proxy-0001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, first.encode().unwrap());
        assert_eq!(store.list_proxy().await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn test_remove_missing_proxy_fails() {
        let (store, _backend) = protected_store().await;
        let kept = proxy(2, "10.0.0.2");
        store.create_proxy(2, &kept).await.unwrap();

        let err = store.remove_proxy(5).await.unwrap_err();
        assert!(matches!(err, MetaError::NodeNotFound(_)));
        assert!(err.is_coordination_failure());
        assert_eq!(store.list_proxy().await.unwrap(), vec![kept]);

        store.remove_proxy(2).await.unwrap();
        assert!(store.list_proxy().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_update_replaces_content() {
        let (store, _backend) = protected_store().await;
        let g = group(3, &["10.0.1.1:6379"]);
        let g2 = group(3, &["10.0.1.1:6379", "10.0.1.2:6379"]);

        store.create_group(3, &g).await.unwrap();
        store.update_group(3, &g2).await.unwrap();

        assert_eq!(store.list_group().await.unwrap(), vec![g2]);

        assert!(matches!(
            store.create_group(3, &g).await,
            Err(MetaError::NodeExists(_))
        ));
        store.remove_group(3).await.unwrap();
        assert!(matches!(store.remove_group(3).await, Err(MetaError::NodeNotFound(_))));
        assert!(store.list_group().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_aborts_on_corrupt_entry() {
        let (store, backend) = protected_store().await;
        store.create_group(1, &group(1, &["10.0.1.1:6379"])).await.unwrap();
        backend
            .create("/slotwarden/demo/group/group-0002", b"{broken")
            .await
            .unwrap();

        let err = store.list_group().await.unwrap_err();
        assert!(matches!(err, MetaError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_close_is_terminal_and_idempotent() {
        let store = MetaStore::new(Box::new(MemoryCoordinator::new()));
        store.close().await.unwrap();
        assert!(store.is_closed().await);
        store.close().await.unwrap();

        let topom = leader("127.0.0.1:18080");
        assert!(matches!(store.acquire("demo", &topom).await, Err(MetaError::Closed)));
        assert!(matches!(store.release().await, Err(MetaError::Closed)));
        assert!(matches!(store.load_leader("demo").await, Err(MetaError::Closed)));
        assert!(matches!(store.load_slot_mapping(1).await, Err(MetaError::Closed)));
        assert!(matches!(store.list_proxy().await, Err(MetaError::Closed)));
        assert!(matches!(
            store.save_slot_mapping(1, &SlotMapping::new(1, 1)).await,
            Err(MetaError::Closed)
        ));
        assert!(matches!(store.list_slot_mappings().await, Err(MetaError::Closed)));
        assert!(matches!(
            store.create_proxy(1, &proxy(1, "10.0.0.1")).await,
            Err(MetaError::Closed)
        ));
        assert!(matches!(store.remove_proxy(1).await, Err(MetaError::Closed)));
        assert!(matches!(store.list_group().await, Err(MetaError::Closed)));
        assert!(matches!(
            store.create_group(1, &group(1, &[])).await,
            Err(MetaError::Closed)
        ));
        assert!(matches!(
            store.update_group(1, &group(1, &[])).await,
            Err(MetaError::Closed)
        ));
        assert!(matches!(store.remove_group(1).await, Err(MetaError::Closed)));
    }

    #[tokio::test]
    async fn test_release_after_lock_vanished_returns_to_fresh() {
        let (store, backend) = protected_store().await;
        let operator = backend.session();
        operator.delete("/slotwarden/demo/topom").await.unwrap();

        let err = store.release().await.unwrap_err();
        assert!(matches!(err, MetaError::NodeNotFound(ref path) if path == "/slotwarden/demo/topom"));
        assert!(!store.is_protected().await);
        assert!(matches!(store.release().await, Err(MetaError::NotProtected)));

        let other = MetaStore::new(Box::new(backend.session()));
        other.acquire("demo", &leader("127.0.0.1:18081")).await.unwrap();
        assert!(matches!(
            store.save_slot_mapping(1, &SlotMapping::new(1, 1)).await,
            Err(MetaError::NotProtected)
        ));
        other.release().await.unwrap();

        store.acquire("demo", &leader("127.0.0.1:18080")).await.unwrap();
        assert!(store.is_protected().await);
    }

    #[tokio::test]
    async fn test_close_releases_held_lock() {
        let (store, backend) = protected_store().await;
        store.close().await.unwrap();

        assert!(!store.is_protected().await);
        assert!(matches!(store.list_group().await, Err(MetaError::Closed)));
        assert_eq!(backend.load_data("/slotwarden/demo/topom").await.unwrap(), None);

        let next = MetaStore::new(Box::new(backend.session()));
        next.acquire("demo", &leader("127.0.0.1:18081")).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_cluster_name_leaves_state_untouched() {
        let store = MetaStore::new(Box::new(MemoryCoordinator::new()));
        let err = store.acquire("a/b", &leader("127.0.0.1:18080")).await.unwrap_err();
        assert!(matches!(err, MetaError::InvalidName(_)));
        assert!(!store.is_protected().await);
        assert_eq!(store.prefix().await, "");
    }

    #[tokio::test]
    async fn test_custom_root() {
        let backend = MemoryCoordinator::new();
        let store = MetaStore::with_root(Box::new(backend.session()), "/zk/topology");
        store.acquire("demo", &leader("127.0.0.1:18080")).await.unwrap();
        assert_eq!(store.prefix().await, "/zk/topology/demo");
        assert!(
            backend
                .load_data("/zk/topology/demo/topom")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_connect_with_memory_builder() {
        let builder = CoordinatorBuilder::new().backend("memory").root("fleet");
        let store = MetaStore::connect(&builder).await.unwrap();
        store.acquire("demo", &leader("127.0.0.1:18080")).await.unwrap();
        assert_eq!(store.prefix().await, "/fleet/demo");
        store.close().await.unwrap();
    }
}
