//! The [DNS-01] challenge provider.
//!
//! [`DNSProvider`] answers challenges by publishing `TXT` records on a [`DNSServer`] backend.
//! It implements [`Dns01Solver`], the contract the [ACME client][crate::acme] drives while
//! validating an order.
//!
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4

use crate::dns::SharedDNSServer;
use crate::error::Error;

pub mod record;

pub use record::ChallengeRecord;

/// Publishes and withdraws the proof for a DNS-01 challenge.
#[async_trait::async_trait]
pub trait Dns01Solver: Send + Sync {
    /// Make the challenge record for `domain` visible. `token` isn't needed to derive the
    /// record, `key_auth` is.
    async fn present(&self, domain: &str, token: &str, key_auth: &str) -> Result<(), Error>;

    /// Remove the challenge record previously presented for `domain`.
    async fn clean_up(&self, domain: &str, token: &str, key_auth: &str) -> Result<(), Error>;
}

/// A [`Dns01Solver`] backed by one DNS backend.
#[derive(Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct DNSProvider {
    server: SharedDNSServer,
}

impl DNSProvider {
    #[must_use]
    pub fn new(server: SharedDNSServer) -> Self {
        Self { server }
    }

    /// Name of the backend records are written to.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        &self.server.get_config().name
    }
}

#[async_trait::async_trait]
impl Dns01Solver for DNSProvider {
    async fn present(&self, domain: &str, _token: &str, key_auth: &str) -> Result<(), Error> {
        let record = ChallengeRecord::new(domain, key_auth)?;
        tracing::info!(
            backend = %self.backend_name(),
            record = %record.fqdn,
            "presenting DNS-01 challenge for \"{domain}\""
        );
        self.server
            .add_txt_record(domain, &record.fqdn, &record.quoted_value())
            .await
    }

    async fn clean_up(&self, domain: &str, _token: &str, key_auth: &str) -> Result<(), Error> {
        // Fall back to the literal name when the record can't be recomputed.
        let fqdn = match ChallengeRecord::new(domain, key_auth) {
            Ok(record) if !record.fqdn.is_empty() => record.fqdn,
            Ok(_) | Err(_) => format!("_acme-challenge.{domain}."),
        };
        tracing::info!(
            backend = %self.backend_name(),
            record = %fqdn,
            "cleaning up DNS-01 challenge for \"{domain}\""
        );
        self.server.clean_txt_record(domain, &fqdn).await
    }
}
