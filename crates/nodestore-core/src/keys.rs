//! Hierarchical, pod-scoped key layout.
//!
//! ```text
//! {root}/pod/{pod}/info
//! {root}/pod/{pod}/node/{node}/info
//! {root}/pod/{pod}/node/{node}/ca.pem
//! {root}/pod/{pod}/node/{node}/cert.pem
//! {root}/pod/{pod}/node/{node}/key.pem
//! {root}/lock/{name}
//! ```

/// Default key prefix.
pub const DEFAULT_ROOT: &str = "/nodestore";

/// The three pieces of TLS client material kept per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsKind {
    Ca,
    Cert,
    Key,
}

impl TlsKind {
    pub const ALL: [TlsKind; 3] = [TlsKind::Ca, TlsKind::Cert, TlsKind::Key];

    /// File name used both as the KV leaf name and on local disk.
    pub fn file_name(self) -> &'static str {
        match self {
            TlsKind::Ca => "ca.pem",
            TlsKind::Cert => "cert.pem",
            TlsKind::Key => "key.pem",
        }
    }
}

/// Builds every key nodestore reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    root: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl KeySpace {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Directory holding one subdirectory per pod.
    pub fn pods_dir(&self) -> String {
        format!("{}/pod", self.root)
    }

    pub fn pod_info(&self, pod: &str) -> String {
        format!("{}/pod/{}/info", self.root, pod)
    }

    /// Directory holding one subdirectory per node of `pod`.
    pub fn pod_nodes(&self, pod: &str) -> String {
        format!("{}/pod/{}/node", self.root, pod)
    }

    pub fn node_info(&self, pod: &str, node: &str) -> String {
        format!("{}/pod/{}/node/{}/info", self.root, pod, node)
    }

    pub fn node_tls(&self, pod: &str, node: &str, kind: TlsKind) -> String {
        format!(
            "{}/pod/{}/node/{}/{}",
            self.root,
            pod,
            node,
            kind.file_name()
        )
    }

    pub fn lock(&self, name: &str) -> String {
        format!("{}/lock/{}", self.root, name)
    }
}

/// Lock name serializing CPU updates of one node.
pub fn node_lock_name(pod: &str, node: &str) -> String {
    format!("{}_{}", pod, node)
}

/// Last path segment of a key.
pub fn tail(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_keys() {
        let keys = KeySpace::default();
        assert_eq!(
            keys.node_info("default", "n1"),
            "/nodestore/pod/default/node/n1/info"
        );
        assert_eq!(
            keys.node_tls("default", "n1", TlsKind::Key),
            "/nodestore/pod/default/node/n1/key.pem"
        );
        assert_eq!(keys.pod_nodes("default"), "/nodestore/pod/default/node");
    }

    #[test]
    fn test_root_trailing_slash_trimmed() {
        let keys = KeySpace::new("/eru/");
        assert_eq!(keys.root(), "/eru");
        assert_eq!(keys.pod_info("p"), "/eru/pod/p/info");
        assert_eq!(keys.lock("p_n"), "/eru/lock/p_n");
    }

    #[test]
    fn test_tls_file_names() {
        let names: Vec<&str> = TlsKind::ALL.iter().map(|k| k.file_name()).collect();
        assert_eq!(names, vec!["ca.pem", "cert.pem", "key.pem"]);
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("/nodestore/pod/default/node/n1"), "n1");
        assert_eq!(tail("/nodestore/pod/default/"), "default");
        assert_eq!(tail("solo"), "solo");
    }

    #[test]
    fn test_node_lock_name() {
        assert_eq!(node_lock_name("default", "n1"), "default_n1");
    }
}
