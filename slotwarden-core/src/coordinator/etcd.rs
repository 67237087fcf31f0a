use super::{Coordinator, CoordinatorLogger, LogSink, direct_children};
use crate::error::{MetaError, Result};
use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, ConnectOptions, GetOptions, Txn, TxnOp};
use std::time::Duration;

/// etcd-based coordination client.
///
/// etcd has a flat keyspace; directories exist only as key prefixes, so
/// parents never need to be created explicitly.
pub struct EtcdCoordinator {
    client: Client,
    log: LogSink,
}

impl EtcdCoordinator {
    pub async fn connect(endpoints: &[String], request_timeout: Duration) -> Result<Self> {
        let options = ConnectOptions::new()
            .with_connect_timeout(request_timeout)
            .with_timeout(request_timeout);
        let client = Client::connect(endpoints, Some(options)).await?;

        Ok(Self {
            client,
            log: LogSink::default(),
        })
    }
}

#[async_trait]
impl Coordinator for EtcdCoordinator {
    async fn create(&self, path: &str, data: &[u8]) -> Result<()> {
        let txn = Txn::new()
            .when(vec![Compare::create_revision(path, CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(path, data.to_vec(), None)]);

        let mut client = self.client.clone();
        let resp = client.txn(txn).await?;
        if !resp.succeeded() {
            return Err(MetaError::NodeExists(path.to_string()));
        }

        self.log.emit(&format!("etcd create node {}", path));
        Ok(())
    }

    async fn update(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut client = self.client.clone();
        client.put(path, data.to_vec(), None).await?;

        self.log.emit(&format!("etcd update node {}", path));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut client = self.client.clone();
        let resp = client.delete(path, None).await?;
        if resp.deleted() == 0 {
            return Err(MetaError::NodeNotFound(path.to_string()));
        }

        self.log.emit(&format!("etcd delete node {}", path));
        Ok(())
    }

    async fn load_data(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut client = self.client.clone();
        let resp = client.get(path, None).await?;

        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn list_file(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut client = self.client.clone();
        let resp = client
            .get(
                prefix,
                Some(GetOptions::new().with_prefix().with_keys_only()),
            )
            .await?;

        let keys = resp
            .kvs()
            .iter()
            .map(|kv| kv.key_str())
            .collect::<std::result::Result<Vec<&str>, _>>()?;

        Ok(direct_children(dir, keys))
    }

    async fn close(&self) -> Result<()> {
        // Channels are released when the last clone of the client drops.
        self.log.emit("etcd client closed");
        Ok(())
    }

    fn set_logger(&self, logger: CoordinatorLogger) {
        self.log.set(logger);
    }
}
