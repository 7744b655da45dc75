use thiserror::Error;

use crate::identity::Identity;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Crypto operation failed: {0}")]
    CryptoOperationFailed(String),

    #[error("Certificate for {0} is not trusted")]
    UntrustedCertificate(Identity),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("No certificate found for {identity}: {reason}")]
    CertificateNotFound { identity: Identity, reason: String },

    #[error("Invalid identity {0:?}")]
    InvalidIdentity(String),

    #[error("Malformed certificate index at line {line}: {reason}")]
    MalformedIndex { line: usize, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl MailError {
    pub(crate) fn crypto(context: &str, detail: impl std::fmt::Display) -> Self {
        Self::CryptoOperationFailed(format!("{context}: {detail}"))
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope(reason.into())
    }
}

pub type Result<T, E = MailError> = std::result::Result<T, E>;
