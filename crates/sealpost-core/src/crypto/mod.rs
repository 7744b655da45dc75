//! Cryptography for sealpost.
//!
//! The pipelines only ever talk to the `CryptoProvider` trait. `NativeProvider`
//! implements it with audited RustCrypto / dalek crates; nothing here spawns
//! external tools.
//!
//! - `provider`   : the four-capability contract
//! - `native`     : Ed25519 / X25519 / XChaCha20-Poly1305 implementation
//! - `certificate`: signed certificate documents
//! - `keys`       : session keys, private key files, the local account
//! - `aead`       : XChaCha20-Poly1305 helpers

pub mod aead;
pub mod certificate;
pub mod keys;
pub mod native;
pub mod provider;

pub use certificate::Certificate;
pub use keys::{Account, PrivateKeys, PublicKeys, SessionKey};
pub use native::NativeProvider;
pub use provider::CryptoProvider;
