//! Error types.

/// Error enumerates the possible zonecrab error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a DNS backend's management API never answered during the bounded
    /// [readiness wait][crate::dns::ready]. Fatal: no issuance is attempted against a backend
    /// that was never confirmed reachable.
    #[error("DNS backend \"{backend}\" at {url} unreachable after {attempts} attempts: {last_error}")]
    BackendUnreachable {
        backend: String,
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// Returned when a backend fails to list the zones it manages.
    #[error("DNS backend \"{backend}\" could not list zones: {reason}")]
    ZoneListUnavailable { backend: String, reason: String },

    /// Returned when none of the zones a backend manages covers the domain.
    #[error("DNS backend \"{backend}\" has no zone covering \"{domain}\"")]
    ZoneNotFound { backend: String, domain: String },

    /// Returned when a backend rejects (or never receives) a TXT record mutation.
    #[error(
        "DNS backend \"{backend}\" failed to {operation} TXT record \"{name}\" for \"{domain}\": {reason}"
    )]
    BackendWriteFailed {
        backend: String,
        domain: String,
        name: String,
        operation: &'static str,
        reason: String,
    },

    /// Returned when the [DNS-01] record name can't be derived from the domain being validated.
    ///
    /// [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
    #[error("can't compute DNS-01 challenge record for \"{domain}\": {reason}")]
    ChallengeComputationFailed { domain: String, reason: String },

    /// Returned when none of the configured backends is authoritative for a domain.
    #[error("no configured DNS backend is authoritative for \"{0}\"")]
    NoAuthoritativeBackend(String),

    /// Returned when the ACME server or the ACME client library fails an operation.
    #[error("ACME {operation} failed for \"{domain}\": {reason}")]
    Acme {
        domain: String,
        operation: &'static str,
        reason: String,
    },

    /// Returned when the persisted ACME account can't be created, loaded or validated.
    #[error("ACME account error: {0}")]
    Account(String),

    /// Returned when a domain can't safely be used as a certificate directory name.
    #[error("invalid domain \"{0}\"")]
    InvalidDomain(String),

    /// Returned when an issued bundle is missing its private key or certificate.
    #[error("refusing to write empty {part} for \"{domain}\"")]
    EmptyCertificate { domain: String, part: &'static str },

    /// Returned when the [`Config`][crate::config::Config] fails validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Returned when key material can't be generated, parsed or serialized.
    #[error("invalid key material")]
    InvalidKey(#[from] rcgen::Error),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON from disk (the [config][crate::config::Config::try_from_file]
    /// or the persisted ACME registration) fails due to invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when an HTTP client for a DNS backend can't be built.
    #[error("HTTP client error")]
    HTTPClient(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_carry_diagnostic_context() {
        let err = Error::BackendWriteFailed {
            backend: "pdns-main".to_string(),
            domain: "example.com".to_string(),
            name: "_acme-challenge.example.com.".to_string(),
            operation: "add",
            reason: "HTTP 422".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pdns-main"));
        assert!(msg.contains("example.com"));
        assert!(msg.contains("add"));
        assert!(msg.contains("HTTP 422"));

        let err = Error::BackendUnreachable {
            backend: "pdns-main".to_string(),
            url: "http://127.0.0.1:8081".to_string(),
            attempts: 3,
            last_error: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("after 3 attempts"));
    }
}
