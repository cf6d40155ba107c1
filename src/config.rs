use crate::error::Error;
use reqwest::Url;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub type Shared = Arc<Config>;

const GANDI_LIVEDNS_URL: &str = "https://api.gandi.net/v5/livedns";
const DEFAULT_PDNS_SERVER_ID: &str = "localhost";

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Contact address registered with the ACME account.
    pub mail: String,
    /// Directory holding `privKey.pem`, `pubKey.pem` and `registration.json`.
    pub account_path: PathBuf,
    /// Root directory for issued certificates, one subdirectory per domain.
    pub certificate_dir_path: PathBuf,
    #[serde(default)]
    pub acme_directory: AcmeDirectory,
    #[serde(default)]
    pub key_type: KeyType,
    /// Pause between publishing the TXT records and asking the CA to validate them.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_propagation_delay")]
    pub propagation_delay: Duration,
    #[serde(default)]
    pub domains: Vec<String>,
    pub dns_servers: Vec<DNSServerConfig>,
}

/// The ACME directory to issue against. Defaults to the Let's Encrypt staging environment;
/// production must always be asked for explicitly.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AcmeDirectory {
    #[default]
    Staging,
    Production,
    #[serde(untagged)]
    Custom(String),
}

impl AcmeDirectory {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            AcmeDirectory::Staging => instant_acme::LetsEncrypt::Staging.url(),
            AcmeDirectory::Production => instant_acme::LetsEncrypt::Production.url(),
            AcmeDirectory::Custom(url) => url,
        }
    }

    /// A custom directory must be an absolute `http(s)` URL.
    fn validate(&self) -> Result<(), Error> {
        let AcmeDirectory::Custom(raw) = self else {
            return Ok(());
        };
        let url = Url::parse(raw)
            .map_err(|err| Error::InvalidConfig(format!("acme_directory {raw:?}: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidConfig(format!(
                "acme_directory {raw:?} must be an http or https URL"
            )));
        }
        Ok(())
    }
}

/// Key algorithm for issued certificates.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum KeyType {
    EcdsaP256,
    #[default]
    EcdsaP384,
}

impl KeyType {
    #[must_use]
    pub fn algorithm(self) -> &'static rcgen::SignatureAlgorithm {
        match self {
            KeyType::EcdsaP256 => &rcgen::PKCS_ECDSA_P256_SHA256,
            KeyType::EcdsaP384 => &rcgen::PKCS_ECDSA_P384_SHA384,
        }
    }
}

/// The supported DNS backends. `type` is matched against the names below when a
/// [`DNSServerConfig`] is loaded.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DNSServerType {
    #[serde(rename = "pdns", alias = "powerdns")]
    PowerDNS,
    #[serde(rename = "gandi", alias = "gandy")]
    Gandi,
}

impl fmt::Display for DNSServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DNSServerType::PowerDNS => f.write_str("pdns"),
            DNSServerType::Gandi => f.write_str("gandi"),
        }
    }
}

/// Identifies one DNS backend instance. Immutable once loaded.
#[serde_as]
#[derive(Deserialize, Clone, PartialEq, Eq)]
pub struct DNSServerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DNSServerType,
    #[serde(default)]
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_server_id")]
    pub server_id: String,
    #[serde(default)]
    pub readiness: Readiness,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_api_timeout")]
    pub api_timeout: Duration,
}

impl fmt::Debug for DNSServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DNSServerConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("api_key", &"<REDACTED>")
            .field("server_id", &self.server_id)
            .field("readiness", &self.readiness)
            .field("api_timeout", &self.api_timeout)
            .finish()
    }
}

impl DNSServerConfig {
    /// A config with default readiness and timeout settings.
    pub fn new(
        name: impl Into<String>,
        kind: DNSServerType,
        url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            url: url.into(),
            api_key: api_key.into(),
            server_id: default_server_id(),
            readiness: Readiness::default(),
            api_timeout: default_api_timeout(),
        }
    }

    /// The parsed management API base URL. Gandi falls back to the public LiveDNS endpoint when
    /// no URL is configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the URL doesn't parse or can't carry a path.
    pub fn base_url(&self) -> Result<Url, Error> {
        let raw = match (self.kind, self.url.is_empty()) {
            (DNSServerType::Gandi, true) => GANDI_LIVEDNS_URL,
            (DNSServerType::PowerDNS, true) => {
                return Err(Error::InvalidConfig(format!(
                    "DNS backend \"{}\" needs a url",
                    self.name
                )))
            }
            _ => &self.url,
        };
        let url = Url::parse(raw).map_err(|err| {
            Error::InvalidConfig(format!("DNS backend \"{}\" url {raw}: {err}", self.name))
        })?;
        if url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "DNS backend \"{}\" url {raw} can't be used as a base URL",
                self.name
            )));
        }
        Ok(url)
    }
}

/// Bounds for the wait performed while connecting to a DNS backend.
#[serde_as]
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct Readiness {
    pub attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub backoff: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_backoff: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

fn default_server_id() -> String {
    DEFAULT_PDNS_SERVER_ID.to_string()
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_propagation_delay() -> Duration {
    Duration::from_secs(5)
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.validate()?;
        Ok(conf)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.mail.trim().is_empty() {
            return Err(Error::InvalidConfig("mail must not be empty".to_string()));
        }
        if self.dns_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one DNS backend must be configured".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for server in &self.dns_servers {
            if !names.insert(server.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate DNS backend name \"{}\"",
                    server.name
                )));
            }
            server.base_url()?;
        }
        self.acme_directory.validate()
    }
}
