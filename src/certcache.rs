//! Leaf certificate cache (C2).
//!
//! Sits in front of [`crate::ca::CertificateAuthority`]: a hostname is
//! minted once, written to `<cache_dir>/<hostname>.{crt,key}`, and every
//! later CONNECT for the same hostname reads the cached pair back
//! instead of minting again. Two workers racing on a cold hostname may
//! both mint and both write - last write wins and both PEM pairs are
//! individually valid, so the race is benign (spec.md §4.2 edge case).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::ca::CertificateAuthority;
use crate::error::CertError;

/// A cached leaf certificate, PEM encoded, read from or about to be
/// written to disk.
#[derive(Debug, Clone)]
pub struct CachedCert {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Per-hostname mint lock plus an on-disk cache directory.
///
/// The `DashMap<String, Arc<Mutex<()>>>` gives every hostname its own
/// lock so concurrent CONNECTs for *different* hosts never block each
/// other, while concurrent CONNECTs for the *same* host serialize
/// instead of both paying the mint cost.
pub struct CertCache {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
    ca: Arc<CertificateAuthority>,
}

impl CertCache {
    pub fn new(dir: impl Into<PathBuf>, ca: Arc<CertificateAuthority>) -> Result<Self, CertError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: DashMap::new(),
            ca,
        })
    }

    fn paths(&self, hostname: &str) -> (PathBuf, PathBuf) {
        (
            self.dir.join(format!("{hostname}.crt")),
            self.dir.join(format!("{hostname}.key")),
        )
    }

    /// Return the cached leaf cert for `hostname`, minting and caching
    /// one if this is the first time it has been seen.
    pub async fn get_or_mint(&self, hostname: &str) -> Result<CachedCert, CertError> {
        let lock = self
            .locks
            .entry(hostname.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let (cert_path, key_path) = self.paths(hostname);
        if let Some(cached) = Self::read(&cert_path, &key_path)? {
            return Ok(cached);
        }

        let issued = self.ca.mint(hostname)?;
        std::fs::write(&cert_path, &issued.cert_pem)?;
        std::fs::write(&key_path, &issued.key_pem)?;
        Ok(CachedCert {
            cert_pem: issued.cert_pem,
            key_pem: issued.key_pem,
        })
    }

    fn read(cert_path: &Path, key_path: &Path) -> Result<Option<CachedCert>, CertError> {
        if !cert_path.exists() || !key_path.exists() {
            return Ok(None);
        }
        Ok(Some(CachedCert {
            cert_pem: std::fs::read_to_string(cert_path)?,
            key_pem: std::fs::read_to_string(key_path)?,
        }))
    }

    /// Drop every cached leaf cert on disk. Called on graceful shutdown
    /// per spec.md §4.8 so a restart re-mints against the (possibly
    /// rotated) CA rather than serving stale leaves.
    pub fn purge(&self) -> std::io::Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|e| e == "crt" || e == "key") {
                let _ = std::fs::remove_file(entry.path());
            }
        }
        Ok(())
    }
}
