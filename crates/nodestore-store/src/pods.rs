use tracing::info;

use nodestore_core::error::{Result, StoreError};
use nodestore_core::pod::Pod;

use crate::store::Store;

impl Store {
    /// Create or overwrite a pod record.
    pub async fn add_pod(&self, name: &str, desc: &str) -> Result<Pod> {
        if name.is_empty() || name.contains('/') {
            return Err(StoreError::validation(format!("invalid pod name {:?}", name)));
        }
        let pod = Pod::new(name, desc);
        self.kv
            .set(&self.keys.pod_info(name), &serde_json::to_string(&pod)?)
            .await?;
        info!(pod = %name, "Pod saved");
        Ok(pod)
    }

    pub async fn get_pod(&self, name: &str) -> Result<Pod> {
        let key = self.keys.pod_info(name);
        let raw = self.kv.get_value(&key).await?;
        serde_json::from_str(&raw).map_err(|e| StoreError::corrupt(key, e.to_string()))
    }

    /// Every pod, in name order. No pods at all is an empty list.
    pub async fn get_all_pods(&self) -> Result<Vec<Pod>> {
        let mut pods = Vec::new();
        for name in self.kv.list(&self.keys.pods_dir()).await? {
            pods.push(self.get_pod(&name).await?);
        }
        Ok(pods)
    }
}
