use ed25519_dalek::VerifyingKey;
use x25519_dalek::PublicKey as X25519Public;
use zeroize::Zeroizing;

use crate::crypto::certificate::Certificate;
use crate::crypto::keys::{PrivateKeys, SessionKey};
use crate::error::Result;

/// The cryptographic capabilities the send and receive pipelines rely on.
///
/// Every method either returns a well-formed result or
/// `MailError::CryptoOperationFailed` carrying the underlying diagnostic.
/// `verify_certificate_chain` and `verify` report policy outcomes as `bool`;
/// the pipelines turn `false` into `UntrustedCertificate` / `SignatureInvalid`.
///
/// Calls may block. Implementations apply their own timeout policy.
pub trait CryptoProvider: Send + Sync {
    fn verify_certificate_chain(
        &self,
        certificate: &Certificate,
        trust_anchor: &Certificate,
    ) -> Result<bool>;

    fn encrypt_symmetric(&self, plaintext: &[u8], key: &SessionKey) -> Result<Vec<u8>>;

    fn decrypt_symmetric(&self, ciphertext: &[u8], key: &SessionKey)
        -> Result<Zeroizing<Vec<u8>>>;

    fn encrypt_asymmetric(&self, plaintext: &[u8], public_key: &X25519Public) -> Result<Vec<u8>>;

    fn decrypt_asymmetric(
        &self,
        ciphertext: &[u8],
        private_keys: &PrivateKeys,
    ) -> Result<Zeroizing<Vec<u8>>>;

    fn sign(&self, digest_input: &[u8], private_keys: &PrivateKeys) -> Result<Vec<u8>>;

    fn verify(
        &self,
        digest_input: &[u8],
        signature: &[u8],
        public_key: &VerifyingKey,
    ) -> Result<bool>;
}
