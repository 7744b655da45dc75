//! Certificate resolution + validation shared by both pipelines.

use tracing::debug;

use crate::crypto::{Certificate, CryptoProvider};
use crate::error::{MailError, Result};
use crate::identity::Identity;
use crate::store::CertificateStore;

/// Resolve `identity` through the store and load the certificate file.
pub(crate) fn load_certificate(store: &CertificateStore, identity: &Identity) -> Result<Certificate> {
    let path = store.resolve(identity)?;
    Certificate::load(&path).map_err(|e| MailError::CertificateNotFound {
        identity: identity.clone(),
        reason: format!("cannot load {}: {e}", path.display()),
    })
}

/// Accept `certificate` for `address` only if it chains to `trust_anchor` and
/// names the same principal: the subject equals the address's identity, and
/// for a full `local@domain` address the certificate email equals it (ASCII
/// case-insensitive). A bare identity is bound by the subject alone.
pub(crate) fn validate(
    crypto: &dyn CryptoProvider,
    certificate: &Certificate,
    trust_anchor: &Certificate,
    identity: &Identity,
    address: &str,
) -> Result<()> {
    if !crypto.verify_certificate_chain(certificate, trust_anchor)? {
        return Err(MailError::UntrustedCertificate(identity.clone()));
    }
    if certificate.subject_identity().ok().as_ref() != Some(identity) {
        debug!(%identity, subject = %certificate.subject, "certificate subject mismatch");
        return Err(MailError::UntrustedCertificate(identity.clone()));
    }
    let address = address.trim();
    if address.contains('@') && !certificate.email.trim().eq_ignore_ascii_case(address) {
        debug!(%identity, email = %certificate.email, address, "certificate email mismatch");
        return Err(MailError::UntrustedCertificate(identity.clone()));
    }
    Ok(())
}
