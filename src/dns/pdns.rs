//! A [PowerDNS HTTP API][api] implementation of the [`DNSServer`] trait.
//!
//! Challenge records are written with a single `PATCH` of the covering zone, using the
//! `REPLACE` change type so that an existing `TXT` record set of the same name is overwritten,
//! and removed with the `DELETE` change type. PowerDNS accepts deleting a record set that doesn't
//! exist, which makes cleaning up idempotent.
//!
//! [api]: https://doc.powerdns.com/authoritative/http-api/zone.html
use crate::config::DNSServerConfig;
use crate::dns::{endpoint, ready, DNSServer, Zone, CHALLENGE_TTL, TXT};
use crate::error::Error;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

const API_KEY_HEADER: &str = "x-api-key";

/// A PowerDNS authoritative server, reached through its HTTP API.
#[derive(Debug, Clone)]
pub struct PowerDNS {
    config: DNSServerConfig,
    client: Client,
    base: Url,
}

#[derive(Deserialize, Debug)]
struct PowerDNSZone {
    id: String,
    name: String,
}

#[derive(Serialize, Debug)]
struct ZonePatch<'a> {
    rrsets: [RecordSet<'a>; 1],
}

#[derive(Serialize, Debug)]
struct RecordSet<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    changetype: &'static str,
    records: Vec<RecordContent<'a>>,
}

#[derive(Serialize, Debug)]
struct RecordContent<'a> {
    content: &'a str,
    disabled: bool,
}

impl PowerDNS {
    /// Create a PowerDNS client authenticating with the configured API key, and block until the
    /// API accepts requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnreachable`] if `GET /api/v1/servers` never succeeds within the
    /// readiness budget, [`Error::InvalidConfig`] for an unusable URL or API key.
    pub async fn connect(config: DNSServerConfig) -> Result<Self, Error> {
        let base = config.base_url()?;
        let mut api_key = HeaderValue::from_str(&config.api_key).map_err(|_| {
            Error::InvalidConfig(format!(
                "DNS backend \"{}\" api_key is not a valid header value",
                config.name
            ))
        })?;
        api_key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(API_KEY_HEADER), api_key);

        let client = Client::builder()
            .timeout(config.api_timeout)
            .default_headers(headers)
            .build()?;
        let pdns = Self {
            config,
            client,
            base,
        };

        let servers_url = pdns.endpoint(&["api", "v1", "servers"]);
        ready::wait_until_up(&pdns.config, &pdns.client, &servers_url).await?;
        tracing::info!(backend = %pdns.config.name, "PowerDNS API is up");
        Ok(pdns)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        endpoint(&self.base, segments)
    }

    fn zones_endpoint(&self) -> Url {
        self.endpoint(&["api", "v1", "servers", &self.config.server_id, "zones"])
    }

    async fn patch_zone(
        &self,
        domain: &str,
        operation: &'static str,
        zone: &Zone,
        record_set: RecordSet<'_>,
    ) -> Result<(), Error> {
        let name = record_set.name.to_string();
        let write_failed = |reason: String| Error::BackendWriteFailed {
            backend: self.config.name.clone(),
            domain: domain.to_string(),
            name: name.clone(),
            operation,
            reason,
        };

        let url = self.endpoint(&[
            "api",
            "v1",
            "servers",
            &self.config.server_id,
            "zones",
            &zone.id,
        ]);
        let resp = self
            .client
            .patch(url)
            .json(&ZonePatch {
                rrsets: [record_set],
            })
            .send()
            .await
            .map_err(|err| write_failed(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(write_failed(format!("HTTP {status} - {body}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DNSServer for PowerDNS {
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
            .get(self.zones_endpoint())
            .send()
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(unavailable(format!("HTTP {status} - {body}")));
        }

        let zones: Vec<PowerDNSZone> = resp
            .json()
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        Ok(zones
            .into_iter()
            .map(|zone| Zone::new(zone.name, zone.id))
            .collect())
    }

    async fn add_txt_record(&self, domain: &str, name: &str, value: &str) -> Result<(), Error> {
        let zone = self.zone_for_domain(domain).await?;
        tracing::info!(
            backend = %self.config.name,
            zone = %zone.name,
            "adding TXT record \"{name}\" for \"{domain}\""
        );
        let record_set = RecordSet {
            name,
            kind: TXT,
            ttl: Some(CHALLENGE_TTL),
            changetype: "REPLACE",
            records: vec![RecordContent {
                content: value,
                disabled: false,
            }],
        };
        self.patch_zone(domain, "add", &zone, record_set).await
    }

    async fn clean_txt_record(&self, domain: &str, name: &str) -> Result<(), Error> {
        let zone = self.zone_for_domain(domain).await?;
        tracing::info!(
            backend = %self.config.name,
            zone = %zone.name,
            "removing TXT record \"{name}\" for \"{domain}\""
        );
        let record_set = RecordSet {
            name,
            kind: TXT,
            ttl: None,
            changetype: "DELETE",
            records: vec![],
        };
        self.patch_zone(domain, "clean", &zone, record_set).await
    }
}
