use serde::{Deserialize, Serialize};
use slotwarden_core::{CoordinatorBuilder, MetaError, Result};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub product: ProductConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub backend: CoordinatorBackend,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    pub etcd: Option<EtcdConfig>,
    pub redis: Option<RedisConfig>,
}

/// Backends reachable from a separate process. The in-memory backend
/// starts empty on every run, so it is only offered to library users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorBackend {
    Etcd,
    Redis,
}

impl CoordinatorBackend {
    fn as_str(&self) -> &'static str {
        match self {
            CoordinatorBackend::Etcd => "etcd",
            CoordinatorBackend::Redis => "redis",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    #[serde(default = "default_product_name")]
    pub name: String,
    #[serde(default = "default_admin_addr")]
    pub admin_addr: String,
    #[serde(default = "default_max_slots")]
    pub max_slots: u32,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            name: default_product_name(),
            admin_addr: default_admin_addr(),
            max_slots: default_max_slots(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_product_name() -> String {
    "default".to_string()
}

fn default_admin_addr() -> String {
    "127.0.0.1:18080".to_string()
}

fn default_max_slots() -> u32 {
    1024
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("SLOTWARDEN").separator("__"))
            .build()
            .map_err(|e| MetaError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| MetaError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn coordinator_builder(&self) -> CoordinatorBuilder {
        let coordinator = &self.coordinator;
        let mut builder = CoordinatorBuilder::new()
            .backend(coordinator.backend.as_str())
            .request_timeout(Duration::from_secs(coordinator.request_timeout_secs));

        if let Some(root) = coordinator.root.as_ref() {
            builder = builder.root(root.clone());
        }
        if let Some(etcd) = coordinator.etcd.as_ref() {
            builder = builder.etcd_endpoints(etcd.endpoints.clone());
        }
        if let Some(redis) = coordinator.redis.as_ref() {
            builder = builder.redis_url(redis.url.clone());
        }

        builder
    }
}
