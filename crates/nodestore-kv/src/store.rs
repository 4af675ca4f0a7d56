use std::collections::BTreeSet;

use async_trait::async_trait;

use nodestore_core::error::{Result, StoreError};

/// What sits at a key: a value, or a directory of child names.
///
/// The backing store is flat; a key with no value of its own but with keys
/// below `key/` reads as a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvNode {
    Leaf { key: String, value: String },
    Dir { key: String, children: Vec<String> },
}

impl KvNode {
    pub fn key(&self) -> &str {
        match self {
            KvNode::Leaf { key, .. } | KvNode::Dir { key, .. } => key,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, KvNode::Dir { .. })
    }

    /// The stored value. A directory here is `Corrupt`.
    pub fn into_value(self) -> Result<String> {
        match self {
            KvNode::Leaf { value, .. } => Ok(value),
            KvNode::Dir { key, .. } => Err(StoreError::corrupt(key, "is a directory")),
        }
    }

    /// Child names of a directory. A leaf here is `Corrupt`.
    pub fn into_children(self) -> Result<Vec<String>> {
        match self {
            KvNode::Dir { children, .. } => Ok(children),
            KvNode::Leaf { key, .. } => Err(StoreError::corrupt(key, "is not a directory")),
        }
    }
}

/// Linearizable single-key get/set over a shared store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a key. `NotFound` when neither a value nor descendants exist.
    async fn get(&self, key: &str) -> Result<KvNode>;

    /// Create or overwrite a value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a single value. `NotFound` when absent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Read a value, rejecting directories.
    async fn get_value(&self, key: &str) -> Result<String> {
        self.get(key).await?.into_value()
    }

    /// List a directory. An absent directory lists as empty; a value at the
    /// key is `Corrupt`.
    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        match self.get(dir).await {
            Ok(node) => node.into_children(),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Prefix under which a directory's descendants live.
pub(crate) fn dir_prefix(key: &str) -> String {
    format!("{}/", key.trim_end_matches('/'))
}

/// Distinct next path segments of `keys` below `prefix`, sorted.
pub(crate) fn children_of<'a>(prefix: &str, keys: impl Iterator<Item = &'a str>) -> Vec<String> {
    keys.filter_map(|k| k.strip_prefix(prefix))
        .filter_map(|rest| rest.split('/').next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
