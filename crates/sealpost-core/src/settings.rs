//! `config.json`.
//!
//! ```json
//! {
//!   "address": "alice@example.org",
//!   "private_key": "private_key.json",
//!   "trust_anchor": "root-ca.crt",
//!   "index_file": "index.db",
//!   "directory": { "kind": "local", "root": "certs" }
//! }
//! ```
//!
//! Every path may be relative; it is taken relative to the directory holding
//! the config file. Omitted paths default to the names above.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::directory::{CertificateDirectory, LocalDirectory, RemoteDirectory};
use crate::error::{MailError, Result};

pub const DEFAULT_INDEX_FILE: &str = "index.db";
pub const DEFAULT_PRIVATE_KEY: &str = "private_key.json";
pub const DEFAULT_TRUST_ANCHOR: &str = "root-ca.crt";
pub const DEFAULT_CERT_DIR: &str = "certs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DirectorySettings {
    Local {
        root: PathBuf,
    },
    Remote {
        base_url: String,
        #[serde(default = "default_cert_dir")]
        cache_dir: PathBuf,
    },
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self::Local {
            root: default_cert_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSettings {
    /// Our own address, written into the `from:` header.
    pub address: String,
    #[serde(default = "default_private_key")]
    pub private_key: PathBuf,
    #[serde(default = "default_trust_anchor")]
    pub trust_anchor: PathBuf,
    #[serde(default = "default_index_file")]
    pub index_file: PathBuf,
    #[serde(default)]
    pub directory: DirectorySettings,
}

fn default_private_key() -> PathBuf {
    PathBuf::from(DEFAULT_PRIVATE_KEY)
}

fn default_trust_anchor() -> PathBuf {
    PathBuf::from(DEFAULT_TRUST_ANCHOR)
}

fn default_index_file() -> PathBuf {
    PathBuf::from(DEFAULT_INDEX_FILE)
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CERT_DIR)
}

impl MailSettings {
    /// Settings for `address` with every path at its default.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            private_key: default_private_key(),
            trust_anchor: default_trust_anchor(),
            index_file: default_index_file(),
            directory: DirectorySettings::default(),
        }
    }

    /// Read `path` and resolve relative paths against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .map_err(|e| MailError::Config(format!("cannot read {}: {e}", path.display())))?;
        let settings: Self = serde_json::from_slice(&raw)
            .map_err(|e| MailError::Config(format!("invalid {}: {e}", path.display())))?;
        if settings.address.trim().is_empty() {
            return Err(MailError::Config(format!(
                "{}: address must not be empty",
                path.display()
            )));
        }
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(settings.resolved_against(base))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Make every relative path absolute under `base`.
    pub fn resolved_against(mut self, base: &Path) -> Self {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.private_key);
        join(&mut self.trust_anchor);
        join(&mut self.index_file);
        match &mut self.directory {
            DirectorySettings::Local { root } => join(root),
            DirectorySettings::Remote { cache_dir, .. } => join(cache_dir),
        }
        self
    }

    pub fn build_directory(&self) -> Arc<dyn CertificateDirectory> {
        match &self.directory {
            DirectorySettings::Local { root } => Arc::new(LocalDirectory::new(root.clone())),
            DirectorySettings::Remote {
                base_url,
                cache_dir,
            } => Arc::new(RemoteDirectory::new(base_url.clone(), cache_dir.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_resolve_next_to_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"address":"alice@example.org"}"#).unwrap();

        let settings = MailSettings::load(&path).unwrap();
        assert_eq!(settings.private_key, dir.path().join(DEFAULT_PRIVATE_KEY));
        assert_eq!(settings.trust_anchor, dir.path().join(DEFAULT_TRUST_ANCHOR));
        assert_eq!(settings.index_file, dir.path().join(DEFAULT_INDEX_FILE));
        assert_eq!(
            settings.directory,
            DirectorySettings::Local {
                root: dir.path().join(DEFAULT_CERT_DIR)
            }
        );
    }

    #[test]
    fn remote_directory_and_absolute_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "address": "alice@example.org",
                "index_file": "/var/lib/sealpost/index.db",
                "directory": {"kind": "remote", "base_url": "https://certs.example.org"}
            }"#,
        )
        .unwrap();

        let settings = MailSettings::load(&path).unwrap();
        assert_eq!(settings.index_file, PathBuf::from("/var/lib/sealpost/index.db"));
        assert_eq!(
            settings.directory,
            DirectorySettings::Remote {
                base_url: "https://certs.example.org".into(),
                cache_dir: dir.path().join(DEFAULT_CERT_DIR),
            }
        );
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let settings = MailSettings::new("bob@example.org");
        settings.save(&path).unwrap();
        assert_eq!(
            MailSettings::load(&path).unwrap(),
            settings.resolved_against(dir.path())
        );
    }

    #[test]
    fn bad_config_is_a_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert!(matches!(MailSettings::load(&path), Err(MailError::Config(_))));

        fs::write(&path, r#"{"address":"","directory":{"kind":"ldap"}}"#).unwrap();
        assert!(matches!(MailSettings::load(&path), Err(MailError::Config(_))));

        fs::write(&path, r#"{"address":" "}"#).unwrap();
        assert!(matches!(MailSettings::load(&path), Err(MailError::Config(_))));
    }
}
