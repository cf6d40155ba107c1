//! DNS backends capable of publishing [RFC-8555][RFC-8555] [DNS-01] challenge records.
//!
//! Every backend implements [`DNSServer`]: it lists the zones it manages, and adds or removes
//! `TXT` record sets inside the zone [resolved][zone::find_zone] for the domain being
//! validated. Two backends are provided:
//!
//! * [`pdns::PowerDNS`] talks to the [PowerDNS HTTP API].
//! * [`gandi::Gandi`] talks to Gandi's [LiveDNS API].
//!
//! Backends are built from a [`DNSServerConfig`] by [`connect`], which blocks until the backend
//! answers (see [`ready`]).
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//! [PowerDNS HTTP API]: https://doc.powerdns.com/authoritative/http-api/
//! [LiveDNS API]: https://api.gandi.net/docs/livedns/

use crate::config::{DNSServerConfig, DNSServerType};
use crate::error::Error;
use reqwest::Url;
use std::sync::Arc;

pub mod gandi;
pub mod pdns;
pub mod ready;
pub mod zone;

pub use gandi::Gandi;
pub use pdns::PowerDNS;
pub use zone::{find_zone, Zone};

/// `SharedDNSServer` is a [`DNSServer`] shared between the dispatcher and the challenge providers
/// built on top of it.
pub type SharedDNSServer = Arc<dyn DNSServer>;

/// TTL, in seconds, of challenge record sets on backends that accept short TTLs.
pub const CHALLENGE_TTL: u32 = 60;

pub(crate) const TXT: &str = "TXT";

/// The capability every DNS backend provides to the [challenge provider][crate::challenge].
#[async_trait::async_trait]
pub trait DNSServer: Send + Sync {
    /// The immutable configuration this backend was built from.
    fn get_config(&self) -> &DNSServerConfig;

    /// List the zones this backend manages, in the order the backend reports them.
    async fn list_zones(&self) -> Result<Vec<Zone>, Error>;

    /// Publish `value` as the only `TXT` record of `name`, inside the zone covering `domain`.
    /// Any existing `TXT` record set for `name` is replaced.
    async fn add_txt_record(&self, domain: &str, name: &str, value: &str) -> Result<(), Error>;

    /// Remove the `TXT` record set of `name` from the zone covering `domain`. Removing a record
    /// set that doesn't exist succeeds.
    async fn clean_txt_record(&self, domain: &str, name: &str) -> Result<(), Error>;

    /// The zone covering `domain`, looked up from a fresh zone listing.
    async fn zone_for_domain(&self, domain: &str) -> Result<Zone, Error> {
        let zones = self.list_zones().await?;
        find_zone(domain, &zones)
            .cloned()
            .ok_or_else(|| Error::ZoneNotFound {
                backend: self.get_config().name.clone(),
                domain: domain.to_string(),
            })
    }

    /// Whether one of this backend's zones covers `domain`.
    async fn is_authoritative_for_domain(&self, domain: &str) -> bool {
        match self.zone_for_domain(domain).await {
            Ok(zone) => {
                tracing::debug!(
                    backend = %self.get_config().name,
                    zone = %zone.name,
                    "\"{domain}\" is covered"
                );
                true
            }
            Err(err) => {
                tracing::debug!(backend = %self.get_config().name, "\"{domain}\" not covered: {err}");
                false
            }
        }
    }
}

/// Build the backend described by `config`, returning once its API has been confirmed reachable.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for an unusable URL, [`Error::HTTPClient`] if the HTTP client
/// can't be built, and [`Error::BackendUnreachable`] if the readiness wait is exhausted.
pub async fn connect(config: DNSServerConfig) -> Result<SharedDNSServer, Error> {
    tracing::info!(backend = %config.name, kind = %config.kind, "connecting to DNS backend");
    let server: SharedDNSServer = match config.kind {
        DNSServerType::PowerDNS => Arc::new(PowerDNS::connect(config).await?),
        DNSServerType::Gandi => Arc::new(Gandi::connect(config).await?),
    };
    Ok(server)
}

/// `base` with `segments` appended as percent-encoded path segments.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    // NB: DNSServerConfig::base_url() rejects cannot-be-a-base URLs, so this can't fail.
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// The first of `servers` that is authoritative for `domain`.
pub async fn select_server<'a>(
    servers: &'a [SharedDNSServer],
    domain: &str,
) -> Option<&'a SharedDNSServer> {
    for server in servers {
        if server.is_authoritative_for_domain(domain).await {
            return Some(server);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticZones {
        config: DNSServerConfig,
        zones: Option<Vec<Zone>>,
    }

    impl StaticZones {
        fn new(name: &str, zones: Option<&[&str]>) -> SharedDNSServer {
            Arc::new(Self {
                config: DNSServerConfig::new(
                    name,
                    DNSServerType::PowerDNS,
                    "http://127.0.0.1:8081",
                    "apikey",
                ),
                zones: zones.map(|names| names.iter().map(|n| Zone::new(*n, *n)).collect()),
            })
        }
    }

    #[async_trait::async_trait]
    impl DNSServer for StaticZones {
        fn get_config(&self) -> &DNSServerConfig {
            &self.config
        }

        async fn list_zones(&self) -> Result<Vec<Zone>, Error> {
            self.zones.clone().ok_or_else(|| Error::ZoneListUnavailable {
                backend: self.config.name.clone(),
                reason: "HTTP 500".to_string(),
            })
        }

        async fn add_txt_record(&self, _: &str, _: &str, _: &str) -> Result<(), Error> {
            Ok(())
        }

        async fn clean_txt_record(&self, _: &str, _: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn test_endpoint_appends_segments() {
        let base = Url::parse("http://127.0.0.1:8081/").unwrap();
        assert_eq!(
            endpoint(&base, &["api", "v1", "servers", "localhost", "zones", "example.com."])
                .as_str(),
            "http://127.0.0.1:8081/api/v1/servers/localhost/zones/example.com."
        );

        let base = Url::parse("https://api.gandi.net/v5/livedns").unwrap();
        assert_eq!(
            endpoint(&base, &["domains", "example.com", "records", "_acme-challenge", "TXT"])
                .as_str(),
            "https://api.gandi.net/v5/livedns/domains/example.com/records/_acme-challenge/TXT"
        );
    }

    #[tokio::test]
    async fn test_zone_for_domain() {
        let server = StaticZones::new("a", Some(&["other.org.", "blah.pangolin.re."]));
        let zone = server.zone_for_domain("blah.pangolin.re").await.unwrap();
        assert_eq!(zone.name, "blah.pangolin.re.");

        assert!(matches!(
            server.zone_for_domain("example.com").await,
            Err(Error::ZoneNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let server = StaticZones::new("broken", None);
        assert!(matches!(
            server.zone_for_domain("example.com").await,
            Err(Error::ZoneListUnavailable { .. })
        ));
        assert!(!server.is_authoritative_for_domain("example.com").await);
    }

    #[tokio::test]
    async fn test_select_server_takes_first_authoritative() {
        let servers = vec![
            StaticZones::new("broken", None),
            StaticZones::new("org", Some(&["example.org."])),
            StaticZones::new("com", Some(&["example.com."])),
            StaticZones::new("com-too", Some(&["example.com."])),
        ];
        let selected = select_server(&servers, "www.example.com").await.unwrap();
        assert_eq!(selected.get_config().name, "com");

        assert!(select_server(&servers, "example.net").await.is_none());
    }
}
