//! Slotwarden Core - lock-gated cluster topology store
//!
//! Keeps the topology of a sharded cluster (slot mappings, proxies, replica
//! groups) inside a coordination service and guarantees a single writer:
//! - leadership is the exclusive `topom` node, won by atomic create
//! - every topology read and write requires the lock to be held
//! - backends: etcd, Redis, in-memory

pub mod coordinator;
pub mod error;
pub mod models;
pub mod paths;
pub mod store;

pub use coordinator::etcd::EtcdCoordinator;
pub use coordinator::memory::MemoryCoordinator;
pub use coordinator::redis::RedisCoordinator;
pub use coordinator::{Coordinator, CoordinatorBuilder, CoordinatorLogger};
pub use error::{MetaError, Result};
pub use models::{Entity, Group, Proxy, SlotAction, SlotActionState, SlotMapping, Topom};
pub use paths::{DEFAULT_ROOT, TopologyPaths};
pub use store::MetaStore;
