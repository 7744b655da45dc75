//! Inbound pipeline.
//!
//! ```text
//! Decode → IdentifySender → ResolveSenderCertificate → ValidateCertificate
//!   → VerifySignature → UnwrapSessionKey → DecryptBody → Deliver
//! ```
//!
//! Nothing in the payload is decrypted until the sender's certificate chains
//! to the trust anchor and the signature over the signed region verifies.

use std::fmt;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{Account, Certificate, CryptoProvider, SessionKey};
use crate::envelope;
use crate::error::{MailError, Result};
use crate::identity::Identity;
use crate::store::CertificateStore;
use crate::trust;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStage {
    Decode,
    IdentifySender,
    ResolveSenderCertificate,
    ValidateCertificate,
    VerifySignature,
    UnwrapSessionKey,
    DecryptBody,
    Deliver,
}

impl fmt::Display for ReceiveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Decode => "decode",
            Self::IdentifySender => "identify-sender",
            Self::ResolveSenderCertificate => "resolve-sender-certificate",
            Self::ValidateCertificate => "validate-certificate",
            Self::VerifySignature => "verify-signature",
            Self::UnwrapSessionKey => "unwrap-session-key",
            Self::DecryptBody => "decrypt-body",
            Self::Deliver => "deliver",
        };
        f.write_str(name)
    }
}

fn run<T>(stage: ReceiveStage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    debug!(%stage, "receive stage");
    f().map_err(|e| {
        warn!(%stage, error = %e, "receive failed");
        e
    })
}

/// A verified, decrypted message.
pub struct ReceivedMessage {
    pub sender: Identity,
    /// Header addresses as received.
    pub from: String,
    pub to: String,
    /// Email bound into the sender's validated certificate.
    pub certificate_email: String,
    pub body: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("sender", &self.sender)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("certificate_email", &self.certificate_email)
            .field("body_len", &self.body.len())
            .finish()
    }
}

pub struct ReceivePipeline<'a> {
    crypto: &'a dyn CryptoProvider,
    store: &'a CertificateStore,
    trust_anchor: &'a Certificate,
    account: &'a Account,
}

impl<'a> ReceivePipeline<'a> {
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

    pub fn receive(&self, raw: &[u8]) -> Result<ReceivedMessage> {
        let envelope = run(ReceiveStage::Decode, || envelope::decode(raw))?;

        let sender = run(ReceiveStage::IdentifySender, || envelope.sender_identity())?;
        if envelope.recipient_identity().ok().as_ref() != Some(self.account.identity()) {
            warn!(
                to = envelope.recipient(),
                account = self.account.address(),
                "envelope is not addressed to this account"
            );
        }

        let certificate = run(ReceiveStage::ResolveSenderCertificate, || {
            trust::load_certificate(self.store, &sender)
        })?;

        run(ReceiveStage::ValidateCertificate, || {
            trust::validate(
                self.crypto,
                &certificate,
                self.trust_anchor,
                &sender,
                envelope.sender(),
            )
        })?;

        run(ReceiveStage::VerifySignature, || {
            let keys = certificate.public_keys()?;
            let region = envelope.signed_region().as_bytes();
            if self
                .crypto
                .verify(region, envelope.signature(), &keys.signing)?
            {
                Ok(())
            } else {
                Err(MailError::SignatureInvalid)
            }
        })?;

        let session_key = run(ReceiveStage::UnwrapSessionKey, || {
            let raw_key = self
                .crypto
                .decrypt_asymmetric(envelope.encrypted_session_key(), self.account.keys())?;
            SessionKey::from_bytes(&raw_key)
        })?;

        let body = run(ReceiveStage::DecryptBody, || {
            self.crypto
                .decrypt_symmetric(envelope.encrypted_body(), &session_key)
        })?;
        drop(session_key);

        run(ReceiveStage::Deliver, || {
            info!(
                from = envelope.sender(),
                %sender,
                email = %certificate.email,
                bytes = body.len(),
                "message verified and decrypted"
            );
            Ok(())
        })?;

        Ok(ReceivedMessage {
            sender,
            from: envelope.sender().to_string(),
            to: envelope.recipient().to_string(),
            certificate_email: certificate.email,
            body,
        })
    }
}
