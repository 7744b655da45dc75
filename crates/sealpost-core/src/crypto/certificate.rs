//! Certificates.
//!
//! A `Certificate` binds a subject identity and email address to an Ed25519
//! signing key and an X25519 encryption key. The issuer signs the canonical
//! JSON of every field except `signature`:
//!
//!   signature = Ed25519_issuer(canonical_json(version, serial, subject, email,
//!               issuer, signing_key, encryption_key, not_before, not_after, is_ca))
//!
//! A trust anchor is a self-signed CA certificate (`issuer == subject`,
//! `is_ca`). Chain checks live in the provider; this module only knows how to
//! read a certificate and reproduce the bytes it was signed over.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::PublicKey as X25519Public;

use crate::crypto::keys::PublicKeys;
use crate::error::{MailError, Result};
use crate::identity::Identity;

pub const CERTIFICATE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub version: u8,
    pub serial: String,
    pub subject: String,
    pub email: String,
    pub issuer: String,
    /// Base64url Ed25519 public key
    pub signing_key: String,
    /// Base64url X25519 public key
    pub encryption_key: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
    /// Base64url Ed25519 signature by the issuer over `to_be_signed()`
    pub signature: String,
}

impl Certificate {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Canonical bytes covered by `signature`. `json!` objects are sorted by
    /// key, so the output does not depend on struct field order.
    pub fn to_be_signed(&self) -> Result<Vec<u8>> {
        let payload = serde_json::json!({
            "email": self.email,
            "encryption_key": self.encryption_key,
            "is_ca": self.is_ca,
            "issuer": self.issuer,
            "not_after": self.not_after.to_rfc3339(),
            "not_before": self.not_before.to_rfc3339(),
            "serial": self.serial,
            "signature_scheme": "ed25519",
            "signing_key": self.signing_key,
            "subject": self.subject,
            "version": self.version,
        });
        Ok(serde_json::to_vec(&payload)?)
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        URL_SAFE_NO_PAD
            .decode(&self.signature)
            .map_err(|e| MailError::crypto("certificate signature", e))
    }

    pub fn public_keys(&self) -> Result<PublicKeys> {
        let signing = decode_key(&self.signing_key, "certificate signing key")?;
        let encryption = decode_key(&self.encryption_key, "certificate encryption key")?;
        let signing = VerifyingKey::from_bytes(&signing)
            .map_err(|e| MailError::crypto("certificate signing key", e))?;
        Ok(PublicKeys {
            signing,
            encryption: X25519Public::from(encryption),
        })
    }

    pub fn subject_identity(&self) -> Result<Identity> {
        Identity::new(self.subject.clone())
    }

    pub fn is_self_signed(&self) -> bool {
        self.issuer == self.subject
    }

    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// SHA-256 over the signed payload, first 20 bytes, hex in groups of 4.
    pub fn fingerprint(&self) -> Result<String> {
        let digest = Sha256::digest(self.to_be_signed()?);
        let hex = hex::encode(&digest[..20]);
        Ok(hex
            .as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

fn decode_key(encoded: &str, what: &str) -> Result<[u8; 32]> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| MailError::crypto(what, e))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| MailError::crypto(what, format!("expected 32 bytes, got {}", bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::PrivateKeys;

    fn sample() -> Certificate {
        let keys = PrivateKeys::generate().public_keys();
        let now = Utc::now();
        Certificate {
            version: CERTIFICATE_VERSION,
            serial: "01".into(),
            subject: "bob".into(),
            email: "bob@example.org".into(),
            issuer: "root".into(),
            signing_key: keys.signing_b64(),
            encryption_key: keys.encryption_b64(),
            not_before: now,
            not_after: now + chrono::Duration::days(1),
            is_ca: false,
            signature: String::new(),
        }
    }

    #[test]
    fn to_be_signed_ignores_signature() {
        let mut cert = sample();
        let before = cert.to_be_signed().unwrap();
        cert.signature = "c2ln".into();
        assert_eq!(before, cert.to_be_signed().unwrap());
        cert.email = "mallory@example.org".into();
        assert_ne!(before, cert.to_be_signed().unwrap());
    }

    #[test]
    fn public_keys_decode() {
        let cert = sample();
        let keys = cert.public_keys().unwrap();
        assert_eq!(keys.signing_b64(), cert.signing_key);
        assert_eq!(keys.encryption_b64(), cert.encryption_key);
    }

    #[test]
    fn garbage_key_is_a_crypto_failure() {
        let mut cert = sample();
        cert.encryption_key = "not-a-key".into();
        assert!(matches!(
            cert.public_keys(),
            Err(MailError::CryptoOperationFailed(_))
        ));
    }

    #[test]
    fn json_roundtrip_and_fingerprint() {
        let cert = sample();
        let parsed = Certificate::parse(cert.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(parsed, cert);
        let fp = cert.fingerprint().unwrap();
        assert_eq!(fp.split(' ').count(), 10);
    }
}
