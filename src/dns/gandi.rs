//! A Gandi [LiveDNS API][api] implementation of the [`DNSServer`] trait.
//!
//! LiveDNS addresses records relative to the domain they belong to, so challenge record names are
//! made relative to the covering zone before being written.
//!
//! [api]: https://api.gandi.net/docs/livedns/
use crate::config::DNSServerConfig;
use crate::dns::{endpoint, ready, DNSServer, Zone, TXT};
use crate::error::Error;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

/// The lowest TTL LiveDNS accepts for a record set.
pub const GANDI_MIN_TTL: u32 = 300;

/// A domain hosted on Gandi LiveDNS.
#[derive(Debug, Clone)]
pub struct Gandi {
    config: DNSServerConfig,
    client: Client,
    base: Url,
}

#[derive(Deserialize, Debug)]
struct LiveDNSDomain {
    fqdn: String,
}

#[derive(Serialize, Debug)]
struct RecordSetUpdate<'a> {
    rrset_ttl: u32,
    rrset_values: [&'a str; 1],
}

impl Gandi {
    /// Create a LiveDNS client authenticating with the configured personal access token, and
    /// block until the API answers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnreachable`] if `GET /domains` never succeeds within the readiness
    /// budget, [`Error::InvalidConfig`] for an unusable URL or token.
    pub async fn connect(config: DNSServerConfig) -> Result<Self, Error> {
        let base = config.base_url()?;
        let mut token = HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(
            |_| {
                Error::InvalidConfig(format!(
                    "DNS backend \"{}\" api_key is not a valid header value",
                    config.name
                ))
            },
        )?;
        token.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token);

        let client = Client::builder()
            .timeout(config.api_timeout)
            .default_headers(headers)
            .build()?;
        let gandi = Self {
            config,
            client,
            base,
        };

        let domains_url = endpoint(&gandi.base, &["domains"]);
        ready::wait_until_up(&gandi.config, &gandi.client, &domains_url).await?;
        tracing::info!(backend = %gandi.config.name, "LiveDNS API is up");
        Ok(gandi)
    }

    fn record_url(&self, zone: &Zone, name: &str) -> Url {
        let relative = relative_name(name, &zone.name);
        endpoint(
            &self.base,
            &["domains", &zone.id, "records", &relative, TXT],
        )
    }

    fn write_failed(
        &self,
        domain: &str,
        name: &str,
        operation: &'static str,
        reason: String,
    ) -> Error {
        Error::BackendWriteFailed {
            backend: self.config.name.clone(),
            domain: domain.to_string(),
            name: name.to_string(),
            operation,
            reason,
        }
    }
}

/// `name` relative to `zone`: `@` for the apex, the leading labels for names inside the zone, or
/// `name` itself (without trailing dot) when the zone isn't one of its suffixes.
fn relative_name(name: &str, zone: &str) -> String {
    let name = name.strip_suffix('.').unwrap_or(name);
    let zone = zone.strip_suffix('.').unwrap_or(zone);
    if name.eq_ignore_ascii_case(zone) {
        return "@".to_string();
    }
    match name.len().checked_sub(zone.len() + 1) {
        Some(split)
            if name.is_char_boundary(split)
                && name[split..].starts_with('.')
                && name[split + 1..].eq_ignore_ascii_case(zone) =>
        {
            name[..split].to_string()
        }
        _ => name.to_string(),
    }
}

#[async_trait::async_trait]
impl DNSServer for Gandi {
    fn get_config(&self) -> &DNSServerConfig {
        &self.config
    }

    async fn list_zones(&self) -> Result<Vec<Zone>, Error> {
        let unavailable = |reason: String| Error::ZoneListUnavailable {
            backend: self.config.name.clone(),
            reason,
        };

        let resp = self
            .client
            .get(endpoint(&self.base, &["domains"]))
            .send()
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(unavailable(format!("HTTP {status} - {body}")));
        }

        let domains: Vec<LiveDNSDomain> = resp
            .json()
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        Ok(domains
            .into_iter()
            .map(|domain| Zone::new(format!("{}.", domain.fqdn), domain.fqdn))
            .collect())
    }

    async fn add_txt_record(&self, domain: &str, name: &str, value: &str) -> Result<(), Error> {
        let zone = self.zone_for_domain(domain).await?;
        tracing::info!(
            backend = %self.config.name,
            zone = %zone.name,
            "adding TXT record \"{name}\" for \"{domain}\""
        );
        let resp = self
            .client
            .put(self.record_url(&zone, name))
            .json(&RecordSetUpdate {
                rrset_ttl: GANDI_MIN_TTL,
                rrset_values: [value],
            })
            .send()
            .await
            .map_err(|err| self.write_failed(domain, name, "add", err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.write_failed(domain, name, "add", format!("HTTP {status} - {body}")));
        }
        Ok(())
    }

    async fn clean_txt_record(&self, domain: &str, name: &str) -> Result<(), Error> {
        let zone = self.zone_for_domain(domain).await?;
        tracing::info!(
            backend = %self.config.name,
            zone = %zone.name,
            "removing TXT record \"{name}\" for \"{domain}\""
        );
        let resp = self
            .client
            .delete(self.record_url(&zone, name))
            .send()
            .await
            .map_err(|err| self.write_failed(domain, name, "clean", err.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(backend = %self.config.name, "TXT record \"{name}\" already gone");
            return Ok(());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.write_failed(
                domain,
                name,
                "clean",
                format!("HTTP {status} - {body}"),
            ));
        }
        Ok(())
    }
}
