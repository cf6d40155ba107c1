//! The certificate orchestrator.
use crate::acme::{CertificateAuthority, CertificateStore, LetsEncryptUser};
use crate::challenge::DNSProvider;
use crate::dns::{select_server, SharedDNSServer};
use crate::error::Error;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

type IssuanceKey = (String, String);

/// Issues certificates for an account and writes them to a [`CertificateStore`].
///
/// Issuance for a given (backend, domain) pair is serialized: a second request waits for the
/// first one's whole present, validate and clean up sequence to finish.
pub struct LetsEncrypt {
    authority: Arc<dyn CertificateAuthority>,
    user: LetsEncryptUser,
    store: CertificateStore,
    locks: Mutex<HashMap<IssuanceKey, Arc<Mutex<()>>>>,
}

impl LetsEncrypt {
    pub fn new(
        authority: Arc<dyn CertificateAuthority>,
        user: LetsEncryptUser,
        store: CertificateStore,
    ) -> Self {
        Self {
            authority,
            user,
            store,
            locks: Mutex::default(),
        }
    }

    #[must_use]
    pub fn user(&self) -> &LetsEncryptUser {
        &self.user
    }

    /// Obtain a certificate for `domain`, answering its DNS-01 challenge through `provider`, and
    /// write it to the store. Returns the directory the key and certificate were written to.
    ///
    /// # Errors
    ///
    /// Returns the first error met while validating the domain name, obtaining the certificate
    /// or writing it. Nothing is written unless issuance succeeded.
    pub async fn ask_certificate(
        &self,
        domain: &str,
        provider: &DNSProvider,
    ) -> Result<PathBuf, Error> {
        self.store.domain_dir(domain)?;

        let backend = provider.backend_name();
        let lock = self.lock_for(backend, domain).await;
        let result = {
            let _guard = lock.lock().await;
            tracing::info!(%backend, "asking certificate for \"{domain}\"");
            match self
                .authority
                .obtain(&self.user.registration, domain, provider)
                .await
            {
                Ok(bundle) => self.store.save(domain, &bundle).await,
                Err(err) => Err(err),
            }
        };
        self.release_lock(backend, domain, lock).await;
        result
    }

    /// [Ask a certificate][Self::ask_certificate] for `domain` through the first of `servers`
    /// authoritative for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAuthoritativeBackend`] if no server covers `domain`, and otherwise the
    /// errors of [`Self::ask_certificate`].
    pub async fn ask_certificate_from(
        &self,
        domain: &str,
        servers: &[SharedDNSServer],
    ) -> Result<PathBuf, Error> {
        let server = select_server(servers, domain)
            .await
            .ok_or_else(|| Error::NoAuthoritativeBackend(domain.to_string()))?;
        self.ask_certificate(domain, &DNSProvider::new(server.clone()))
            .await
    }

    async fn lock_for(&self, backend: &str, domain: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((backend.to_string(), domain.to_string()))
            .or_default()
            .clone()
    }

    /// Drop the lock entry of (`backend`, `domain`) once no other request holds or waits on it.
    async fn release_lock(&self, backend: &str, domain: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&(backend.to_string(), domain.to_string()));
        }
    }
}
