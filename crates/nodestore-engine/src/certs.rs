use std::fs::Permissions;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use tracing::{debug, warn};

use nodestore_core::error::{Result, StoreError};
use nodestore_core::keys::{KeySpace, TlsKind};
use nodestore_kv::KvStore;

/// Mode for materialized PEM files: read-only, never executable.
const MATERIAL_MODE: u32 = 0o444;

/// Local TLS material for one engine host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub dir: PathBuf,
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            ca: dir.join(TlsKind::Ca.file_name()),
            cert: dir.join(TlsKind::Cert.file_name()),
            key: dir.join(TlsKind::Key.file_name()),
        }
    }

    /// True only when all three files exist. A directory left half-written
    /// by an interrupted sync reads as absent.
    pub async fn all_present(&self) -> bool {
        for path in [&self.ca, &self.cert, &self.key] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return false;
            }
        }
        true
    }

    /// Parse the PEM files and build a client config from them, so broken
    /// material is reported before any connection attempt.
    pub fn validate(&self) -> Result<()> {
        let ca_certs = read_certs(&self.ca)?;
        let mut root_store = rustls::RootCertStore::empty();
        for cert in ca_certs {
            root_store.add(cert).map_err(|e| invalid(&self.ca, e))?;
        }

        let certs = read_certs(&self.cert)?;
        let key_pem = std::fs::read(&self.key)?;
        let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
            .map_err(|e| invalid(&self.key, e))?
            .ok_or_else(|| invalid(&self.key, "no private key found"))?;

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| invalid(&self.dir, e))?
            .with_root_certificates(root_store)
            .with_client_auth_cert(certs, key)
            .map_err(|e| invalid(&self.cert, e))?;
        Ok(())
    }
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = std::fs::read(path)?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut pem.as_slice())
        .filter_map(|r| r.ok())
        .collect();
    if certs.is_empty() {
        return Err(invalid(path, "no certificates found"));
    }
    Ok(certs)
}

fn invalid(path: &Path, reason: impl std::fmt::Display) -> StoreError {
    StoreError::validation(format!("invalid TLS material {}: {}", path.display(), reason))
}

/// Copy a node's CA, certificate and key from the KV store into `dest`.
///
/// Files are replaced atomically one at a time, but the set is not: a
/// failure part way leaves the earlier files in place and is reported as
/// `PartialMaterial`. Callers check [`TlsPaths::all_present`] before
/// trusting a directory.
pub async fn materialize(
    kv: &dyn KvStore,
    keys: &KeySpace,
    pod: &str,
    node: &str,
    dest: &Path,
) -> Result<TlsPaths> {
    let mut written = 0;
    let result = async {
        tokio::fs::create_dir_all(dest).await?;
        for kind in TlsKind::ALL {
            let pem = kv.get_value(&keys.node_tls(pod, node, kind)).await?;
            write_readonly(&dest.join(kind.file_name()), &pem).await?;
            written += 1;
        }
        Ok::<(), StoreError>(())
    }
    .await;

    match result {
        Ok(()) => {
            debug!(
                pod = %pod,
                node = %node,
                dir = %dest.display(),
                "Materialized ca.pem, cert.pem, key.pem from store"
            );
            Ok(TlsPaths::in_dir(dest))
        }
        Err(source) => Err(StoreError::PartialMaterial {
            dir: dest.to_path_buf(),
            written,
            source: Box::new(source),
        }),
    }
}

/// Write `contents` to `path` with read-only permissions, replacing any
/// existing file through a temp file and rename.
async fn write_readonly(path: &Path, contents: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = async {
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::set_permissions(&tmp, Permissions::from_mode(MATERIAL_MODE)).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok::<(), StoreError>(())
    }
    .await;

    if result.is_err() {
        discard_temp(&tmp).await;
    }
    result
}

/// Best-effort temp cleanup; failures are logged, never returned.
async fn discard_temp(tmp: &Path) {
    match tokio::fs::remove_file(tmp).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %tmp.display(), error = %e, "Failed to remove temp file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodestore_kv::MemoryStore;
    use rcgen::{CertificateParams, KeyPair};

    struct Material {
        ca: String,
        cert: String,
        key: String,
    }

    fn generate_material() -> Material {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(vec!["nodestore-ca".to_string()]).unwrap();
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let client_key = KeyPair::generate().unwrap();
        let client_params = CertificateParams::new(vec!["client".to_string()]).unwrap();
        let client_cert = client_params
            .signed_by(&client_key, &ca_cert, &ca_key)
            .unwrap();

        Material {
            ca: ca_cert.pem(),
            cert: client_cert.pem(),
            key: client_key.serialize_pem(),
        }
    }

    async fn seed(kv: &MemoryStore, keys: &KeySpace, material: &Material, kinds: &[TlsKind]) {
        for kind in kinds {
            let value = match kind {
                TlsKind::Ca => &material.ca,
                TlsKind::Cert => &material.cert,
                TlsKind::Key => &material.key,
            };
            kv.set(&keys.node_tls("default", "n1", *kind), value)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_materialize_writes_three_readonly_files() {
        let kv = MemoryStore::new();
        let keys = KeySpace::default();
        let material = generate_material();
        seed(&kv, &keys, &material, &TlsKind::ALL).await;

        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("certs").join("10.0.0.5");
        let paths = materialize(&kv, &keys, "default", "n1", &dest).await.unwrap();

        assert!(paths.all_present().await);
        assert_eq!(std::fs::read_to_string(&paths.ca).unwrap(), material.ca);
        for path in [&paths.ca, &paths.cert, &paths.key] {
            let mode = std::fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o444);
        }
        paths.validate().unwrap();
    }

    #[tokio::test]
    async fn test_materialize_replaces_existing_readonly_files() {
        let kv = MemoryStore::new();
        let keys = KeySpace::default();
        let material = generate_material();
        seed(&kv, &keys, &material, &TlsKind::ALL).await;

        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("10.0.0.5");
        materialize(&kv, &keys, "default", "n1", &dest).await.unwrap();
        kv.set(&keys.node_tls("default", "n1", TlsKind::Ca), "rotated")
            .await
            .unwrap();
        let paths = materialize(&kv, &keys, "default", "n1", &dest).await.unwrap();

        assert_eq!(std::fs::read_to_string(&paths.ca).unwrap(), "rotated");
        let leftovers: Vec<_> = std::fs::read_dir(&dest)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_reports_partial_material() {
        let kv = MemoryStore::new();
        let keys = KeySpace::default();
        let material = generate_material();
        seed(&kv, &keys, &material, &[TlsKind::Ca]).await;

        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("10.0.0.5");
        let err = materialize(&kv, &keys, "default", "n1", &dest)
            .await
            .unwrap_err();

        match err {
            StoreError::PartialMaterial {
                written, source, ..
            } => {
                assert_eq!(written, 1);
                assert!(source.is_not_found());
            }
            other => panic!("expected PartialMaterial, got {other:?}"),
        }
        let paths = TlsPaths::in_dir(&dest);
        assert!(paths.ca.exists());
        assert!(!paths.all_present().await);
    }

    #[tokio::test]
    async fn test_all_present_false_for_missing_dir() {
        let paths = TlsPaths::in_dir(Path::new("/nonexistent/nodestore/certs/h"));
        assert!(!paths.all_present().await);
    }

    #[test]
    fn test_validate_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TlsPaths::in_dir(dir.path());
        std::fs::write(&paths.ca, "not a pem").unwrap();
        std::fs::write(&paths.cert, "not a pem").unwrap();
        std::fs::write(&paths.key, "not a pem").unwrap();
        let err = paths.validate().unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_tls_paths_layout() {
        let paths = TlsPaths::in_dir(Path::new("/etc/nodestore/certs/10.0.0.5"));
        assert!(paths.ca.ends_with("ca.pem"));
        assert!(paths.cert.ends_with("cert.pem"));
        assert!(paths.key.ends_with("key.pem"));
    }
}
