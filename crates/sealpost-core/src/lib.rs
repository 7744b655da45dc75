//! sealpost-core: certificate-based secure mail exchange
//!
//! A sender encrypts a message body under a fresh session key, wraps the key
//! for the recipient's certificate, signs the result and emits a single
//! textual envelope. The receiver validates the sender's certificate and the
//! signature before anything is decrypted.
//!
//! # Module layout
//! - `identity` : `Identity` (local part of a mail address)
//! - `crypto`   : `CryptoProvider` seam, native provider, certificates, keys
//! - `envelope` : envelope wire codec and signed-region layout
//! - `store`    : `CertificateStore`: identity → certificate cache + index file
//! - `directory`: certificate directory collaborators (local / remote)
//! - `send`     : outbound pipeline
//! - `receive`  : inbound pipeline
//! - `settings` : JSON configuration
//! - `testing`  : throwaway CA for tests (`test-utils` feature)
//! - `paths`    : platform data directory
//! - `error`    : unified error type

pub mod crypto;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod paths;
pub mod receive;
pub mod send;
pub mod settings;
pub mod store;
mod trust;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use crypto::{Account, Certificate, CryptoProvider, NativeProvider, PrivateKeys, SessionKey};
pub use directory::{CertificateDirectory, LocalDirectory, RemoteDirectory};
pub use envelope::{Envelope, SignedRegion};
pub use error::{MailError, Result};
pub use identity::Identity;
pub use receive::{ReceivePipeline, ReceivedMessage};
pub use send::SendPipeline;
pub use settings::{DirectorySettings, MailSettings};
pub use store::{CertificateRecord, CertificateStore, Listing};
