//! Outbound pipeline.
//!
//! ```text
//! GenerateKey → EncryptBody → ResolveRecipientCertificate → ValidateCertificate
//!   → WrapSessionKey → AssembleSignedRegion → Sign → Finalize
//! ```
//!
//! Any failing stage aborts the send; no partial envelope is returned.

use std::fmt;

use tracing::{debug, info, warn};

use crate::crypto::{Account, Certificate, CryptoProvider, SessionKey};
use crate::envelope::{self, Envelope, SignedRegion};
use crate::error::Result;
use crate::identity::Identity;
use crate::store::CertificateStore;
use crate::trust;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStage {
    GenerateKey,
    EncryptBody,
    ResolveRecipientCertificate,
    ValidateCertificate,
    WrapSessionKey,
    AssembleSignedRegion,
    Sign,
    Finalize,
}

impl fmt::Display for SendStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GenerateKey => "generate-key",
            Self::EncryptBody => "encrypt-body",
            Self::ResolveRecipientCertificate => "resolve-recipient-certificate",
            Self::ValidateCertificate => "validate-certificate",
            Self::WrapSessionKey => "wrap-session-key",
            Self::AssembleSignedRegion => "assemble-signed-region",
            Self::Sign => "sign",
            Self::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

fn run<T>(stage: SendStage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    debug!(%stage, "send stage");
    f().map_err(|e| {
        warn!(%stage, error = %e, "send failed");
        e
    })
}

pub struct SendPipeline<'a> {
    crypto: &'a dyn CryptoProvider,
    store: &'a CertificateStore,
    trust_anchor: &'a Certificate,
    account: &'a Account,
}

impl<'a> SendPipeline<'a> {
    pub fn new(
        crypto: &'a dyn CryptoProvider,
        store: &'a CertificateStore,
        trust_anchor: &'a Certificate,
        account: &'a Account,
    ) -> Self {
        Self {
            crypto,
            store,
            trust_anchor,
            account,
        }
    }

    /// Seal `body` for `recipient_address` and return the encoded envelope.
    pub fn send(&self, recipient_address: &str, body: &[u8]) -> Result<Vec<u8>> {
        let recipient = Identity::from_address(recipient_address)?;

        let session_key = run(SendStage::GenerateKey, || Ok(SessionKey::generate()))?;

        let encrypted_body = run(SendStage::EncryptBody, || {
            self.crypto.encrypt_symmetric(body, &session_key)
        })?;

        let certificate = run(SendStage::ResolveRecipientCertificate, || {
            trust::load_certificate(self.store, &recipient)
        })?;

        run(SendStage::ValidateCertificate, || {
            trust::validate(
                self.crypto,
                &certificate,
                self.trust_anchor,
                &recipient,
                recipient_address,
            )
        })?;

        let encrypted_session_key = run(SendStage::WrapSessionKey, || {
            let keys = certificate.public_keys()?;
            self.crypto
                .encrypt_asymmetric(session_key.as_bytes(), &keys.encryption)
        })?;
        drop(session_key);

        let region = run(SendStage::AssembleSignedRegion, || {
            Ok(SignedRegion::assemble(encrypted_session_key, encrypted_body))
        })?;

        let signature = run(SendStage::Sign, || {
            self.crypto.sign(region.as_bytes(), self.account.keys())
        })?;

        let wire = run(SendStage::Finalize, || {
            let envelope = Envelope::new(
                self.account.address(),
                recipient_address,
                region,
                signature,
            )?;
            Ok(envelope::encode(&envelope))
        })?;

        info!(
            from = self.account.address(),
            to = recipient_address,
            bytes = wire.len(),
            "envelope sealed"
        );
        Ok(wire)
    }
}
