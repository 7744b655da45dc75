//! Key material.
//!
//! - `SessionKey` : 32 random bytes per message, zeroized on drop.
//! - `PrivateKeys`: the account's Ed25519 signing secret and X25519
//!   decryption secret, stored as a JSON key file.
//! - `PublicKeys` : the public halves, as carried in a certificate.
//! - `Account`    : the local sender/receiver: address + private keys.

use std::fmt;
use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{MailError, Result};
use crate::identity::Identity;

const KEY_FILE_VERSION: u8 = 1;

// ── Session key ───────────────────────────────────────────────────────────────

#[derive(ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    pub const LEN: usize = 32;

    /// Fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut key = [0u8; Self::LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; Self::LEN] = bytes.try_into().map_err(|_| {
            MailError::crypto(
                "session key",
                format!("expected {} bytes, got {}", Self::LEN, bytes.len()),
            )
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

// ── Public keys ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeys {
    pub signing: VerifyingKey,
    pub encryption: X25519Public,
}

impl PublicKeys {
    pub fn signing_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.signing.to_bytes())
    }

    pub fn encryption_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.encryption.as_bytes())
    }
}

// ── Private keys ──────────────────────────────────────────────────────────────

/// On-disk form of `PrivateKeys`.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyFile {
    version: u8,
    signing_key: String,
    encryption_key: String,
}

/// Secret halves are zeroized on drop by their own types.
pub struct PrivateKeys {
    signing: SigningKey,
    encryption: StaticSecret,
}

impl PrivateKeys {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            encryption: StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = Zeroizing::new(fs::read_to_string(path)?);
        let file: KeyFile = serde_json::from_str(&raw)?;
        if file.version != KEY_FILE_VERSION {
            return Err(MailError::Config(format!(
                "unsupported key file version {} in {}",
                file.version,
                path.display()
            )));
        }
        let signing = decode_secret(&file.signing_key, "signing key")?;
        let encryption = decode_secret(&file.encryption_key, "encryption key")?;
        Ok(Self {
            signing: SigningKey::from_bytes(&signing),
            encryption: StaticSecret::from(*encryption),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = KeyFile {
            version: KEY_FILE_VERSION,
            signing_key: URL_SAFE_NO_PAD.encode(self.signing.to_bytes()),
            encryption_key: URL_SAFE_NO_PAD.encode(self.encryption.to_bytes()),
        };
        let json = Zeroizing::new(serde_json::to_string_pretty(&file)?);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json.as_bytes())?;
        restrict_permissions(path);
        Ok(())
    }

    pub fn public_keys(&self) -> PublicKeys {
        PublicKeys {
            signing: self.signing.verifying_key(),
            encryption: X25519Public::from(&self.encryption),
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub fn encryption_secret(&self) -> &StaticSecret {
        &self.encryption
    }
}

impl fmt::Debug for PrivateKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeys")
            .field("public", &self.public_keys())
            .finish_non_exhaustive()
    }
}

fn decode_secret(encoded: &str, what: &str) -> Result<Zeroizing<[u8; 32]>> {
    let bytes = Zeroizing::new(
        URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| MailError::Config(format!("{what}: {e}")))?,
    );
    let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        MailError::Config(format!("{what} must be 32 bytes, got {}", bytes.len()))
    })?;
    Ok(Zeroizing::new(secret))
}

fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            tracing::warn!(path = %path.display(), error = %e, "could not restrict key file permissions");
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

// ── Account ───────────────────────────────────────────────────────────────────

/// The local principal: the address written into envelope headers and the
/// keys used to sign outgoing and open incoming mail.
#[derive(Debug)]
pub struct Account {
    address: String,
    identity: Identity,
    keys: PrivateKeys,
}

impl Account {
    pub fn new(address: impl Into<String>, keys: PrivateKeys) -> Result<Self> {
        let address = address.into();
        let identity = Identity::from_address(&address)?;
        Ok(Self {
            address,
            identity,
            keys,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn keys(&self) -> &PrivateKeys {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn session_keys_are_unique() {
        let a = SessionKey::generate();
        let b = SessionKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn session_key_length_is_checked() {
        assert!(SessionKey::from_bytes(&[0u8; 31]).is_err());
        assert!(SessionKey::from_bytes(&[0u8; 32]).is_ok());
    }

    #[test]
    fn key_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys").join("private_key.json");
        let keys = PrivateKeys::generate();
        keys.save(&path).unwrap();

        let loaded = PrivateKeys::load(&path).unwrap();
        assert_eq!(loaded.public_keys(), keys.public_keys());
    }

    #[test]
    fn key_file_rejects_bad_material() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("private_key.json");
        fs::write(
            &path,
            r#"{"version":1,"signing_key":"AAAA","encryption_key":"AAAA"}"#,
        )
        .unwrap();
        assert!(matches!(PrivateKeys::load(&path), Err(MailError::Config(_))));
    }

    #[test]
    fn account_identity_comes_from_address() {
        let account = Account::new("alice@example.org", PrivateKeys::generate()).unwrap();
        assert_eq!(account.identity().as_str(), "alice");
        assert_eq!(account.address(), "alice@example.org");
    }
}
