//! Certificate issuance through an [RFC-8555][RFC-8555] certificate authority.
//!
//! [`CertificateAuthority`] is the seam between the [`issuer::LetsEncrypt`] orchestrator and the
//! protocol: [`client::AcmeClient`] implements it on top of `instant-acme`. The orchestrator owns
//! the persisted [account][account::LetsEncryptUser] and writes issued bundles through a
//! [`storage::CertificateStore`].
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555

use crate::challenge::Dns01Solver;
use crate::error::Error;

pub mod account;
pub mod client;
pub mod issuer;
pub mod storage;

pub use account::LetsEncryptUser;
pub use client::{answer_challenges, AcmeClient, PendingChallenge};
pub use issuer::LetsEncrypt;
pub use storage::CertificateStore;

/// An issued certificate chain and the private key it was issued for, both PEM encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    pub private_key: String,
    pub certificate: String,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("private_key", &"<REDACTED>")
            .field("certificate", &self.certificate)
            .finish()
    }
}

/// An ACME certificate authority.
#[async_trait::async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Register a new account for `email`, agreeing to the terms of service. Returns the
    /// serialized account credentials, including the account's PKCS#8 private key under
    /// `key_pkcs8`.
    async fn register(&self, email: &str) -> Result<String, Error>;

    /// Obtain a certificate for `domain` with the account described by `registration`, answering
    /// its DNS-01 challenges with `solver`. Every presented challenge is cleaned up before
    /// returning, whatever the outcome.
    async fn obtain(
        &self,
        registration: &str,
        domain: &str,
        solver: &dyn Dns01Solver,
    ) -> Result<CertificateBundle, Error>;
}
