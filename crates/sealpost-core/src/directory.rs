//! Certificate directory collaborators.
//!
//! The store asks a directory for a certificate only on a cache miss.
//! `LocalDirectory` serves `<root>/<identity>.crt` from disk; `RemoteDirectory`
//! downloads `<base_url>/<identity>.crt` into a cache directory.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::crypto::Certificate;
use crate::error::{MailError, Result};
use crate::identity::Identity;

pub const CERTIFICATE_EXTENSION: &str = "crt";

/// Maps an identity to a local certificate file.
pub trait CertificateDirectory: Send + Sync {
    fn fetch_certificate(&self, identity: &Identity) -> Result<PathBuf>;
}

fn certificate_file_name(identity: &Identity) -> String {
    format!("{identity}.{CERTIFICATE_EXTENSION}")
}

fn not_found(identity: &Identity, reason: impl ToString) -> MailError {
    MailError::CertificateNotFound {
        identity: identity.clone(),
        reason: reason.to_string(),
    }
}

// ── Local ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl CertificateDirectory for LocalDirectory {
    fn fetch_certificate(&self, identity: &Identity) -> Result<PathBuf> {
        let path = self.root.join(certificate_file_name(identity));
        if !path.is_file() {
            return Err(not_found(
                identity,
                format!("{} does not exist", path.display()),
            ));
        }
        debug!(%identity, path = %path.display(), "certificate found in local directory");
        Ok(path)
    }
}

// ── Remote ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RemoteDirectory {
    base_url: String,
    cache_dir: PathBuf,
}

impl RemoteDirectory {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn url_for(&self, identity: &Identity) -> String {
        format!("{}/{}", self.base_url, certificate_file_name(identity))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn download(&self, url: &str) -> std::result::Result<Vec<u8>, String> {
        let mut body = Vec::new();
        if let Some(src) = url.strip_prefix("file://") {
            let mut file = fs::File::open(src).map_err(|e| format!("open {src}: {e}"))?;
            file.read_to_end(&mut body)
                .map_err(|e| format!("read {src}: {e}"))?;
        } else {
            let mut resp =
                reqwest::blocking::get(url).map_err(|e| format!("download failed: {e}"))?;
            if !resp.status().is_success() {
                return Err(format!("download status {}", resp.status()));
            }
            resp.read_to_end(&mut body)
                .map_err(|e| format!("download failed: {e}"))?;
        }
        Ok(body)
    }

    fn store(&self, identity: &Identity, body: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)?;
        let path = self.cache_dir.join(certificate_file_name(identity));
        let mut staging = NamedTempFile::new_in(&self.cache_dir)?;
        staging.write_all(body)?;
        staging.as_file().sync_all()?;
        staging.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }
}

impl CertificateDirectory for RemoteDirectory {
    fn fetch_certificate(&self, identity: &Identity) -> Result<PathBuf> {
        let url = self.url_for(identity);
        debug!(%identity, %url, "fetching certificate");

        let body = self
            .download(&url)
            .map_err(|reason| not_found(identity, reason))?;
        Certificate::parse(&body)
            .map_err(|e| not_found(identity, format!("{url} is not a certificate: {e}")))?;

        let path = self.store(identity, &body)?;
        info!(%identity, path = %path.display(), "certificate downloaded");
        Ok(path)
    }
}
