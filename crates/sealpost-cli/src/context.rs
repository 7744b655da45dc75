use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use sealpost_core::paths;
use sealpost_core::{Account, Certificate, CertificateStore, MailSettings, NativeProvider, PrivateKeys};
use tracing::debug;

/// Settings and the certificate cache; every command needs these.
pub struct Context {
    pub settings: MailSettings,
    pub store: CertificateStore,
    pub provider: NativeProvider,
}

/// Key material for `send` and `receive`. `list` never loads it.
pub struct Credentials {
    pub account: Account,
    pub trust_anchor: Certificate,
}

impl Context {
    pub fn load(config: Option<&Path>) -> Result<Self> {
        let config_path = match config {
            Some(path) => path.to_path_buf(),
            None => paths::config_path()?,
        };
        debug!(path = %config_path.display(), "loading settings");
        let settings = MailSettings::load(&config_path)
            .with_context(|| format!("loading settings from {}", config_path.display()))?;

        let store = CertificateStore::open(settings.index_file.clone(), settings.build_directory())
            .with_context(|| format!("loading certificate index {}", settings.index_file.display()))?;

        Ok(Self {
            settings,
            store,
            provider: NativeProvider::new(),
        })
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let settings = &self.settings;
        let keys = PrivateKeys::load(&settings.private_key)
            .with_context(|| format!("loading private key {}", settings.private_key.display()))?;
        let account = Account::new(settings.address.clone(), keys)
            .with_context(|| format!("invalid account address {:?}", settings.address))?;
        let trust_anchor = Certificate::load(&settings.trust_anchor)
            .with_context(|| format!("loading trust anchor {}", settings.trust_anchor.display()))?;
        Ok(Credentials {
            account,
            trust_anchor,
        })
    }

    pub fn index_path(&self) -> PathBuf {
        self.store.index_path().to_path_buf()
    }

    pub fn persist(&self) -> Result<()> {
        self.store
            .persist()
            .with_context(|| format!("writing certificate index {}", self.index_path().display()))
    }
}
