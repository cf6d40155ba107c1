use crate::error::Error;
use base64::engine::general_purpose;
use base64::{alphabet, engine, Engine};
use lazy_static::lazy_static;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use trust_dns_proto::rr::Name;

const CHALLENGE_LABEL: &str = "_acme-challenge";

lazy_static! {
    pub(crate) static ref BASE64_ENGINE: engine::GeneralPurpose =
        engine::GeneralPurpose::new(&alphabet::URL_SAFE, general_purpose::NO_PAD);
}

/// The `TXT` record that answers a DNS-01 challenge for `domain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    pub domain: String,
    /// Fully qualified record name, `_acme-challenge.<domain>.`.
    pub fqdn: String,
    /// `base64url(sha256(key_auth))`, unpadded.
    pub value: String,
}

impl ChallengeRecord {
    /// Derive the challenge record for `domain` from the key authorization. A leading `*.` is
    /// dropped so wildcard and plain names share one record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChallengeComputationFailed`] if `domain` is empty or isn't a valid DNS
    /// name.
    pub fn new(domain: &str, key_auth: &str) -> Result<Self, Error> {
        Ok(Self {
            domain: domain.to_string(),
            fqdn: challenge_fqdn(domain)?,
            value: challenge_value(key_auth),
        })
    }

    /// The value as published: wrapped in double quotes.
    #[must_use]
    pub fn quoted_value(&self) -> String {
        format!("\"{}\"", self.value)
    }
}

/// `_acme-challenge.<domain>.`, validated as a DNS name.
///
/// # Errors
///
/// Returns [`Error::ChallengeComputationFailed`] for empty or malformed domains.
pub fn challenge_fqdn(domain: &str) -> Result<String, Error> {
    let failed = |reason: String| Error::ChallengeComputationFailed {
        domain: domain.to_string(),
        reason,
    };

    let base = domain.strip_prefix("*.").unwrap_or(domain);
    let base = base.strip_suffix('.').unwrap_or(base);
    if base.is_empty() {
        return Err(failed("empty domain".to_string()));
    }

    let origin = Name::from_str(&format!("{base}.")).map_err(|err| failed(err.to_string()))?;
    let fqdn = Name::from_ascii(CHALLENGE_LABEL)
        .and_then(|label| label.append_domain(&origin))
        .map_err(|err| failed(err.to_string()))?;
    Ok(fqdn.to_string())
}

#[must_use]
pub fn challenge_value(key_auth: &str) -> String {
    BASE64_ENGINE.encode(Sha256::digest(key_auth.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_of_empty_key_auth() {
        assert_eq!(
            challenge_value(""),
            "47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU"
        );
    }

    #[test]
    fn test_value_is_unpadded_sha256() {
        let value = challenge_value("token.thumbprint");
        assert!(!value.contains('='));
        assert_eq!(BASE64_ENGINE.decode(&value).unwrap().len(), 32);
    }

    #[test]
    fn test_fqdn() {
        for domain in ["example.com", "example.com.", "*.example.com"] {
            assert_eq!(
                challenge_fqdn(domain).unwrap(),
                "_acme-challenge.example.com."
            );
        }
        assert_eq!(
            challenge_fqdn("www.sub.example.com").unwrap(),
            "_acme-challenge.www.sub.example.com."
        );
    }

    #[test]
    fn test_fqdn_rejects_empty_domain() {
        for domain in ["", ".", "*."] {
            assert!(matches!(
                challenge_fqdn(domain),
                Err(Error::ChallengeComputationFailed { .. })
            ));
        }
    }

    #[test]
    fn test_wildcard_record() {
        let record = ChallengeRecord::new("*.example.com", "token.thumbprint").unwrap();
        assert_eq!(record.domain, "*.example.com");
        assert_eq!(record.fqdn, "_acme-challenge.example.com.");
        assert_eq!(record.quoted_value(), format!("\"{}\"", record.value));
    }
}
