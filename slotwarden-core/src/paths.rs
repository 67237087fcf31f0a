//! Path layout of a cluster inside the coordination service.
//!
//! ```text
//! /<root>/<cluster>/topom
//! /<root>/<cluster>/slots/slot-0007
//! /<root>/<cluster>/proxy/proxy-0001
//! /<root>/<cluster>/group/group-0003
//! ```
//!
//! Every id renders as 4-digit zero-padded decimal. Operator tooling reading
//! the same service has to match this layout exactly.

use crate::error::{MetaError, Result};

pub const DEFAULT_ROOT: &str = "slotwarden";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyPaths {
    prefix: String,
}

impl TopologyPaths {
    pub fn new(root: &str, cluster: &str) -> Result<Self> {
        validate_cluster_name(cluster)?;
        let root = root.trim_matches('/');
        let prefix = if root.is_empty() {
            format!("/{}", cluster)
        } else {
            format!("/{}/{}", root, cluster)
        };
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn lock_path(&self) -> String {
        format!("{}/topom", self.prefix)
    }

    pub fn slot_base(&self) -> String {
        format!("{}/slots", self.prefix)
    }

    pub fn slot_path(&self, slot_id: u32) -> String {
        format!("{}/slot-{:04}", self.slot_base(), slot_id)
    }

    pub fn proxy_base(&self) -> String {
        format!("{}/proxy", self.prefix)
    }

    pub fn proxy_path(&self, proxy_id: u32) -> String {
        format!("{}/proxy-{:04}", self.proxy_base(), proxy_id)
    }

    pub fn group_base(&self) -> String {
        format!("{}/group", self.prefix)
    }

    pub fn group_path(&self, group_id: u32) -> String {
        format!("{}/group-{:04}", self.group_base(), group_id)
    }
}

fn validate_cluster_name(cluster: &str) -> Result<()> {
    let trimmed = cluster.trim();
    if trimmed.is_empty() || trimmed != cluster || cluster.contains('/') {
        return Err(MetaError::InvalidName(cluster.to_string()));
    }
    if cluster == "." || cluster == ".." {
        return Err(MetaError::InvalidName(cluster.to_string()));
    }
    Ok(())
}
