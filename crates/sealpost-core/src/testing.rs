//! Test fixtures: a throwaway certificate authority and enrolled accounts.
//!
//! Only compiled for tests or with the `test-utils` feature. The product never
//! issues certificates.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::certificate::{Certificate, CERTIFICATE_VERSION};
use crate::crypto::keys::{Account, PrivateKeys, PublicKeys};
use crate::error::Result;
use crate::identity::Identity;

pub const ANCHOR_SUBJECT: &str = "root-ca";

/// A self-signed CA written to `<dir>/root-ca.crt`.
pub struct TestPki {
    dir: PathBuf,
    root_key: SigningKey,
    anchor: Certificate,
    anchor_path: PathBuf,
}

/// A leaf issued by `TestPki`, with its files on disk.
#[derive(Debug)]
pub struct Enrolled {
    pub address: String,
    pub identity: Identity,
    pub certificate: Certificate,
    pub keys: PrivateKeys,
    pub certificate_path: PathBuf,
    pub key_path: PathBuf,
}

impl Enrolled {
    /// Fresh `Account` over a copy of the enrolled keys.
    pub fn account(&self) -> Result<Account> {
        Account::new(self.address.clone(), PrivateKeys::load(&self.key_path)?)
    }
}

impl TestPki {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let root_key = SigningKey::generate(&mut OsRng);
        let root_public = PublicKeys {
            signing: root_key.verifying_key(),
            encryption: PrivateKeys::generate().public_keys().encryption,
        };

        let now = Utc::now();
        let mut anchor = Certificate {
            version: CERTIFICATE_VERSION,
            serial: random_serial(),
            subject: ANCHOR_SUBJECT.into(),
            email: format!("{ANCHOR_SUBJECT}@localhost"),
            issuer: ANCHOR_SUBJECT.into(),
            signing_key: root_public.signing_b64(),
            encryption_key: root_public.encryption_b64(),
            not_before: now - Duration::days(7),
            not_after: now + Duration::days(365),
            is_ca: true,
            signature: String::new(),
        };
        sign_with(&root_key, &mut anchor)?;

        let anchor_path = dir.join(format!("{ANCHOR_SUBJECT}.crt"));
        fs::write(&anchor_path, anchor.to_json()?)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            root_key,
            anchor,
            anchor_path,
        })
    }

    pub fn anchor(&self) -> &Certificate {
        &self.anchor
    }

    pub fn anchor_path(&self) -> &Path {
        &self.anchor_path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Issue a certificate valid for a year.
    pub fn enroll(&self, address: &str) -> Result<Enrolled> {
        self.enroll_with_validity(address, Duration::days(365))
    }

    /// Issue a certificate that expires `valid_for` from now. A negative
    /// duration produces an already expired certificate.
    pub fn enroll_with_validity(&self, address: &str, valid_for: Duration) -> Result<Enrolled> {
        let identity = Identity::from_address(address)?;
        let keys = PrivateKeys::generate();
        let public = keys.public_keys();
        let now = Utc::now();

        let mut certificate = Certificate {
            version: CERTIFICATE_VERSION,
            serial: random_serial(),
            subject: identity.to_string(),
            email: address.to_string(),
            issuer: self.anchor.subject.clone(),
            signing_key: public.signing_b64(),
            encryption_key: public.encryption_b64(),
            not_before: now - Duration::days(7),
            not_after: now + valid_for,
            is_ca: false,
            signature: String::new(),
        };
        self.sign(&mut certificate)?;

        let certificate_path = self.dir.join(format!("{identity}.crt"));
        let key_path = self.dir.join(format!("{identity}.key.json"));
        fs::write(&certificate_path, certificate.to_json()?)?;
        keys.save(&key_path)?;

        Ok(Enrolled {
            address: address.to_string(),
            identity,
            certificate,
            keys,
            certificate_path,
            key_path,
        })
    }

    /// Re-sign `certificate` with the CA key after a test edits its fields.
    pub fn sign(&self, certificate: &mut Certificate) -> Result<()> {
        sign_with(&self.root_key, certificate)
    }
}

fn sign_with(key: &SigningKey, certificate: &mut Certificate) -> Result<()> {
    let payload = certificate.to_be_signed()?;
    certificate.signature = URL_SAFE_NO_PAD.encode(key.sign(&payload).to_bytes());
    Ok(())
}

fn random_serial() -> String {
    let mut serial = [0u8; 8];
    OsRng.fill_bytes(&mut serial);
    hex::encode(serial)
}
