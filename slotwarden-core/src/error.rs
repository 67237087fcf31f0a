use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetaError>;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("use of closed store")]
    Closed,

    #[error("acquire again")]
    AlreadyProtected,

    #[error("operation without lock protection")]
    NotProtected,

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("coordination error: {0}")]
    Coordination(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid cluster name: {0:?}")]
    InvalidName(String),
}

impl MetaError {
    /// Errors surfaced by the coordination service or by a payload read
    /// back from it. Callers holding the lock should treat these as a
    /// possible loss of leadership.
    pub fn is_coordination_failure(&self) -> bool {
        matches!(
            self,
            MetaError::NodeExists(_)
                | MetaError::NodeNotFound(_)
                | MetaError::Coordination(_)
                | MetaError::Serialization(_)
        )
    }
}

impl From<etcd_client::Error> for MetaError {
    fn from(err: etcd_client::Error) -> Self {
        MetaError::Coordination(err.to_string())
    }
}

impl From<redis::RedisError> for MetaError {
    fn from(err: redis::RedisError) -> Self {
        MetaError::Coordination(err.to_string())
    }
}
