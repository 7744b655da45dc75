//! `CryptoProvider` backed directly by RustCrypto / dalek crates.
//!
//! - symmetric:  XChaCha20-Poly1305, AAD `sealpost-body-v1`
//! - asymmetric: X25519 ephemeral-static ECDH → HKDF-SHA256 → XChaCha20-Poly1305
//!   wire format: [ ephemeral public (32) | nonce (24) | ciphertext + tag ]
//! - signature:  Ed25519, strict verification
//! - chain:      leaf signed by a self-signed CA anchor, both inside validity

use chrono::Utc;
use ed25519_dalek::{Signature, Signer, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use tracing::warn;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};
use zeroize::Zeroizing;

use crate::crypto::aead;
use crate::crypto::certificate::{Certificate, CERTIFICATE_VERSION};
use crate::crypto::keys::{PrivateKeys, SessionKey};
use crate::crypto::provider::CryptoProvider;
use crate::error::{MailError, Result};

const BODY_AAD: &[u8] = b"sealpost-body-v1";
const KEY_WRAP_INFO: &[u8] = b"sealpost-key-wrap-v1";
const X25519_LEN: usize = 32;

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProvider;

impl NativeProvider {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for NativeProvider {
    fn verify_certificate_chain(
        &self,
        certificate: &Certificate,
        trust_anchor: &Certificate,
    ) -> Result<bool> {
        let now = Utc::now();
        let anchor_keys = trust_anchor.public_keys()?;

        if !trust_anchor.is_ca || !trust_anchor.is_self_signed() {
            return reject(certificate, "trust anchor is not a self-signed CA");
        }
        if !signature_valid(&anchor_keys.signing, trust_anchor)? {
            return reject(certificate, "trust anchor self-signature invalid");
        }
        if !trust_anchor.is_current(now) {
            return reject(certificate, "trust anchor outside validity window");
        }

        // Key material must decode even when the rest of the chain fails.
        certificate.public_keys()?;

        if certificate.version != CERTIFICATE_VERSION {
            return reject(certificate, "unsupported certificate version");
        }
        if certificate.is_ca {
            return reject(certificate, "leaf certificate claims CA");
        }
        if certificate.issuer != trust_anchor.subject {
            return reject(certificate, "issuer does not match trust anchor");
        }
        if !signature_valid(&anchor_keys.signing, certificate)? {
            return reject(certificate, "issuer signature invalid");
        }
        if !certificate.is_current(now) {
            return reject(certificate, "certificate outside validity window");
        }
        Ok(true)
    }

    fn encrypt_symmetric(&self, plaintext: &[u8], key: &SessionKey) -> Result<Vec<u8>> {
        aead::seal(key.as_bytes(), plaintext, BODY_AAD)
    }

    fn decrypt_symmetric(
        &self,
        ciphertext: &[u8],
        key: &SessionKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        aead::open(key.as_bytes(), ciphertext, BODY_AAD)
    }

    fn encrypt_asymmetric(&self, plaintext: &[u8], public_key: &X25519Public) -> Result<Vec<u8>> {
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = X25519Public::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(public_key);
        if !shared.was_contributory() {
            return Err(MailError::crypto("key wrap", "non-contributory public key"));
        }

        let wrap_key = derive_wrap_key(shared.as_bytes(), &ephemeral_public, public_key)?;
        let sealed = aead::seal(&wrap_key, plaintext, ephemeral_public.as_bytes())?;

        let mut out = Vec::with_capacity(X25519_LEN + sealed.len());
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt_asymmetric(
        &self,
        ciphertext: &[u8],
        private_keys: &PrivateKeys,
    ) -> Result<Zeroizing<Vec<u8>>> {
        if ciphertext.len() < X25519_LEN {
            return Err(MailError::crypto("key unwrap", "wrapped key too short"));
        }
        let (ephemeral_bytes, sealed) = ciphertext.split_at(X25519_LEN);
        let mut ephemeral = [0u8; X25519_LEN];
        ephemeral.copy_from_slice(ephemeral_bytes);
        let ephemeral_public = X25519Public::from(ephemeral);

        let secret = private_keys.encryption_secret();
        let shared = secret.diffie_hellman(&ephemeral_public);
        if !shared.was_contributory() {
            return Err(MailError::crypto("key unwrap", "non-contributory ephemeral key"));
        }

        let own_public = X25519Public::from(secret);
        let wrap_key = derive_wrap_key(shared.as_bytes(), &ephemeral_public, &own_public)?;
        aead::open(&wrap_key, sealed, ephemeral_public.as_bytes())
    }

    fn sign(&self, digest_input: &[u8], private_keys: &PrivateKeys) -> Result<Vec<u8>> {
        Ok(private_keys
            .signing_key()
            .sign(digest_input)
            .to_bytes()
            .to_vec())
    }

    fn verify(
        &self,
        digest_input: &[u8],
        signature: &[u8],
        public_key: &VerifyingKey,
    ) -> Result<bool> {
        let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
            return Ok(false);
        };
        let signature = Signature::from_bytes(&bytes);
        Ok(public_key.verify_strict(digest_input, &signature).is_ok())
    }
}

/// HKDF-SHA256 over the ECDH output; both public keys are bound into `info`.
fn derive_wrap_key(
    shared: &[u8; 32],
    ephemeral: &X25519Public,
    recipient: &X25519Public,
) -> Result<Zeroizing<[u8; 32]>> {
    let mut info = Vec::with_capacity(KEY_WRAP_INFO.len() + 2 * X25519_LEN);
    info.extend_from_slice(KEY_WRAP_INFO);
    info.extend_from_slice(ephemeral.as_bytes());
    info.extend_from_slice(recipient.as_bytes());

    let mut key = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(None, shared)
        .expand(&info, &mut key[..])
        .map_err(|e| MailError::crypto("key derivation", e))?;
    Ok(key)
}

fn signature_valid(issuer: &VerifyingKey, certificate: &Certificate) -> Result<bool> {
    let Ok(bytes) = certificate.signature_bytes() else {
        return Ok(false);
    };
    let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
        return Ok(false);
    };
    let payload = certificate.to_be_signed()?;
    Ok(issuer
        .verify_strict(&payload, &Signature::from_bytes(&bytes))
        .is_ok())
}

fn reject(certificate: &Certificate, reason: &str) -> Result<bool> {
    warn!(
        subject = %certificate.subject,
        serial = %certificate.serial,
        reason,
        "certificate chain rejected"
    );
    Ok(false)
}
