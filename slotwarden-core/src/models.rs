//! Topology records persisted by the metadata store.
//!
//! The store treats every record as opaque bytes; the encoding is owned by
//! the record type through [`Entity`].

use crate::error::Result;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub trait Entity: Serialize + DeserializeOwned {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Leader descriptor stored in the lock node of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topom {
    pub token: String,
    pub start_time: String,
    pub admin_addr: String,
    pub product_name: String,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub pwd: String,
    #[serde(default)]
    pub sys: String,
}

impl Topom {
    pub fn new(product_name: impl Into<String>, admin_addr: impl Into<String>) -> Self {
        let pwd = std::env::current_dir()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            token: Ulid::new().to_string(),
            start_time: Utc::now().to_rfc3339(),
            admin_addr: admin_addr.into(),
            product_name: product_name.into(),
            pid: std::process::id(),
            pwd,
            sys: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

impl Entity for Topom {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotActionState {
    #[default]
    None,
    Pending,
    Preparing,
    Prepared,
    Migrating,
    Finished,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAction {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub state: SlotActionState,
    #[serde(default)]
    pub target_id: u32,
}

/// Which group serves a slot, plus any in-flight migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMapping {
    pub id: u32,
    pub group_id: u32,
    #[serde(default)]
    pub action: SlotAction,
}

impl SlotMapping {
    pub fn new(id: u32, group_id: u32) -> Self {
        Self {
            id,
            group_id,
            action: SlotAction::default(),
        }
    }

    pub fn is_migrating(&self) -> bool {
        !matches!(
            self.action.state,
            SlotActionState::None | SlotActionState::Finished
        )
    }
}

impl Entity for SlotMapping {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub id: u32,
    pub token: String,
    pub start_time: String,
    pub admin_addr: String,
    pub proto_type: String,
    pub proxy_addr: String,
    pub product_name: String,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub hostname: String,
}

impl Entity for Proxy {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: u32,
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub promoting: bool,
}

impl Entity for Group {}
