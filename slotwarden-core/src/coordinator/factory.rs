use super::{
    Coordinator, etcd::EtcdCoordinator, memory::MemoryCoordinator, redis::RedisCoordinator,
};
use crate::paths::DEFAULT_ROOT;
use crate::{MetaError, Result};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct CoordinatorBuilder {
    backend: Option<String>,
    root: Option<String>,
    etcd_endpoints: Option<Vec<String>>,
    redis_url: Option<String>,
    request_timeout: Option<Duration>,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn etcd_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.etcd_endpoints = Some(endpoints);
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Root namespace every cluster lives under.
    pub fn resolve_root(&self) -> String {
        self.root
            .as_deref()
            .map(|root| root.trim().trim_matches('/'))
            .filter(|root| !root.is_empty())
            .unwrap_or(DEFAULT_ROOT)
            .to_string()
    }

    fn resolve_backend(&self) -> Result<String> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if backend.is_empty() {
            return Err(MetaError::Config(
                "coordinator backend cannot be empty".to_string(),
            ));
        }

        Ok(backend)
    }

    fn resolve_request_timeout(&self) -> Result<Duration> {
        let timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if timeout.is_zero() {
            return Err(MetaError::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(timeout)
    }

    pub async fn build(&self) -> Result<Box<dyn Coordinator>> {
        let backend = self.resolve_backend()?;
        let request_timeout = self.resolve_request_timeout()?;

        match backend.as_str() {
            "etcd" => {
                let endpoints: Vec<String> = self
                    .etcd_endpoints
                    .clone()
                    .ok_or_else(|| {
                        MetaError::Config("etcd endpoints are required for etcd backend".to_string())
                    })?
                    .into_iter()
                    .map(|endpoint| endpoint.trim().to_string())
                    .filter(|endpoint| !endpoint.is_empty())
                    .collect();

                if endpoints.is_empty() {
                    return Err(MetaError::Config(
                        "etcd endpoints cannot be empty for etcd backend".to_string(),
                    ));
                }

                let client = EtcdCoordinator::connect(&endpoints, request_timeout).await?;
                Ok(Box::new(client))
            }
            "redis" => {
                let url = self.redis_url.as_deref().unwrap_or_default().trim();
                if url.is_empty() {
                    return Err(MetaError::Config(
                        "redis url is required for redis backend".to_string(),
                    ));
                }

                let client = RedisCoordinator::connect(url, request_timeout).await?;
                Ok(Box::new(client))
            }
            "memory" => Ok(Box::new(MemoryCoordinator::new())),
            other => Err(MetaError::Config(format!(
                "unsupported coordinator backend: {}",
                other
            ))),
        }
    }
}
