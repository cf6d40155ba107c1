//! Zone Crab
//!
//! Obtains X509 certificates from an [RFC-8555][RFC-8555] certificate authority by answering
//! [DNS-01] challenges through the management API of the DNS provider hosting each domain.
//!
//! Supported providers are [PowerDNS] and [Gandi LiveDNS]. The provider used for a domain is the
//! first configured one managing a zone that covers it.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//! [PowerDNS]: https://doc.powerdns.com/authoritative/http-api/
//! [Gandi LiveDNS]: https://api.gandi.net/docs/livedns/
//!
#![warn(clippy::pedantic)]

pub mod acme;
pub mod challenge;
pub mod config;
pub mod dns;
pub mod error;

pub use acme::{AcmeClient, CertificateAuthority, CertificateBundle, LetsEncrypt, LetsEncryptUser};
pub use challenge::{DNSProvider, Dns01Solver};
pub use config::{Config, Shared};
pub use dns::{connect as connect_dns, DNSServer, SharedDNSServer};
