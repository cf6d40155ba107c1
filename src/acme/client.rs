//! A [`CertificateAuthority`] driving an ACME server with `instant-acme`.
use crate::acme::{CertificateAuthority, CertificateBundle};
use crate::challenge::Dns01Solver;
use crate::config::{Config, KeyType};
use crate::error::Error;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus,
};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// How long the CA gets to validate presented challenges.
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(120);
const VALIDATION_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// How long the CA gets to issue the certificate once the order is finalized.
const ISSUANCE_TIMEOUT: Duration = Duration::from_secs(60);
const ISSUANCE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct AcmeClient {
    directory_url: String,
    key_type: KeyType,
    propagation_delay: Duration,
}

/// A DNS-01 challenge the CA is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    /// Identifier being validated, as the CA reports it.
    pub domain: String,
    pub token: String,
    pub key_auth: String,
    /// Challenge URL, used to mark it ready.
    pub url: String,
}

/// Present every challenge through `solver`, wait `propagation_delay`, then run `validate`.
/// Presenting stops at the first failure and `validate` is skipped. Whatever the outcome,
/// every challenge that was presented is cleaned up afterwards; clean-up failures are logged
/// and never change the result.
///
/// # Errors
///
/// Returns the first `present` error, or else the error of `validate`.
pub async fn answer_challenges<F>(
    solver: &dyn Dns01Solver,
    challenges: &[PendingChallenge],
    propagation_delay: Duration,
    validate: F,
) -> Result<(), Error>
where
    F: Future<Output = Result<(), Error>>,
{
    let mut presented = 0;
    let mut result = Ok(());
    for challenge in challenges {
        if let Err(err) = solver
            .present(&challenge.domain, &challenge.token, &challenge.key_auth)
            .await
        {
            result = Err(err);
            break;
        }
        presented += 1;
    }

    if result.is_ok() {
        if presented > 0 && !propagation_delay.is_zero() {
            tracing::debug!("waiting {propagation_delay:?} for propagation");
            sleep(propagation_delay).await;
        }
        result = validate.await;
    }

    for challenge in &challenges[..presented] {
        if let Err(err) = solver
            .clean_up(&challenge.domain, &challenge.token, &challenge.key_auth)
            .await
        {
            tracing::warn!(domain = %challenge.domain, "failed to clean up DNS-01 challenge: {err}");
        }
    }
    result
}

impl AcmeClient {
    #[must_use]
    pub fn new(
        directory_url: impl Into<String>,
        key_type: KeyType,
        propagation_delay: Duration,
    ) -> Self {
        Self {
            directory_url: directory_url.into(),
            key_type,
            propagation_delay,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.acme_directory.url(),
            config.key_type,
            config.propagation_delay,
        )
    }

    #[must_use]
    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    /// The DNS-01 challenge of every authorization of `order` that isn't valid yet.
    async fn pending_challenges(
        order: &mut Order,
        domain: &str,
    ) -> Result<Vec<PendingChallenge>, Error> {
        let mut pending = Vec::new();
        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(acme_error(domain, "fetch authorization"))?;
            let identifier = match &authz.identifier().identifier {
                Identifier::Dns(identifier) => identifier.clone(),
                _ => continue,
            };
            tracing::debug!(domain = %identifier, status = ?authz.status, "processing authorization");
            if authz.status == AuthorizationStatus::Valid {
                continue;
            }

            let challenge = authz
                .challenge(ChallengeType::Dns01)
                .ok_or_else(|| Error::Acme {
                    domain: identifier.clone(),
                    operation: "select challenge",
                    reason: "no DNS-01 challenge offered".to_string(),
                })?;
            pending.push(PendingChallenge {
                domain: identifier,
                token: challenge.token.clone(),
                key_auth: challenge.key_authorization().as_str().to_string(),
                url: challenge.url.clone(),
            });
        }
        Ok(pending)
    }

    /// Tell the CA the `pending` challenges can be checked, then wait for it to validate the
    /// order.
    async fn mark_ready_and_wait(
        order: &mut Order,
        domain: &str,
        pending: &[PendingChallenge],
    ) -> Result<(), Error> {
        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(acme_error(domain, "fetch authorization"))?;
            if let Some(mut challenge) = authz.challenge(ChallengeType::Dns01) {
                if pending.iter().any(|p| p.url == challenge.url) {
                    challenge
                        .set_ready()
                        .await
                        .map_err(acme_error(domain, "set challenge ready"))?;
                }
            }
        }

        let deadline = Instant::now() + VALIDATION_TIMEOUT;
        loop {
            let state = order
                .refresh()
                .await
                .map_err(acme_error(domain, "refresh order"))?;
            match state.status {
                OrderStatus::Ready | OrderStatus::Valid => return Ok(()),
                OrderStatus::Invalid => {
                    return Err(Error::Acme {
                        domain: domain.to_string(),
                        operation: "validate",
                        reason: "order became invalid".to_string(),
                    })
                }
                OrderStatus::Pending | OrderStatus::Processing => {
                    if Instant::now() > deadline {
                        return Err(Error::Acme {
                            domain: domain.to_string(),
                            operation: "validate",
                            reason: format!("not validated within {VALIDATION_TIMEOUT:?}"),
                        });
                    }
                    tracing::trace!(domain, status = ?state.status, "order not ready yet");
                    sleep(VALIDATION_POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn finalize(&self, order: &mut Order, domain: &str) -> Result<CertificateBundle, Error> {
        let key_pair = rcgen::KeyPair::generate_for(self.key_type.algorithm())?;
        let params = rcgen::CertificateParams::new(vec![domain.to_string()])?;
        let csr = params.serialize_request(&key_pair)?.der().to_vec();
        order
            .finalize_csr(&csr)
            .await
            .map_err(acme_error(domain, "finalize"))?;

        let deadline = Instant::now() + ISSUANCE_TIMEOUT;
        let certificate = loop {
            let state = order
                .refresh()
                .await
                .map_err(acme_error(domain, "refresh order"))?;
            match state.status {
                OrderStatus::Valid => {
                    let chain = order
                        .certificate()
                        .await
                        .map_err(acme_error(domain, "download certificate"))?;
                    break chain.ok_or_else(|| Error::Acme {
                        domain: domain.to_string(),
                        operation: "download certificate",
                        reason: "no certificate in response".to_string(),
                    })?;
                }
                OrderStatus::Invalid => {
                    return Err(Error::Acme {
                        domain: domain.to_string(),
                        operation: "finalize",
                        reason: "order became invalid".to_string(),
                    })
                }
                _ => {
                    if Instant::now() > deadline {
                        return Err(Error::Acme {
                            domain: domain.to_string(),
                            operation: "finalize",
                            reason: format!("no certificate within {ISSUANCE_TIMEOUT:?}"),
                        });
                    }
                    sleep(ISSUANCE_POLL_INTERVAL).await;
                }
            }
        };

        Ok(CertificateBundle {
            private_key: key_pair.serialize_pem(),
            certificate,
        })
    }
}

#[async_trait::async_trait]
impl CertificateAuthority for AcmeClient {
    async fn register(&self, email: &str) -> Result<String, Error> {
        tracing::info!(directory = %self.directory_url, "registering ACME account for {email}");
        let contact = format!("mailto:{email}");
        let (_, credentials) = Account::builder()
            .map_err(|err| Error::Account(err.to_string()))?
            .create(
                &NewAccount {
                    contact: &[&contact],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                self.directory_url.clone(),
                None,
            )
            .await
            .map_err(|err| Error::Account(format!("registration failed: {err}")))?;
        Ok(serde_json::to_string_pretty(&credentials)?)
    }

    async fn obtain(
        &self,
        registration: &str,
        domain: &str,
        solver: &dyn Dns01Solver,
    ) -> Result<CertificateBundle, Error> {
        let credentials: AccountCredentials = serde_json::from_str(registration)?;
        let account = Account::builder()
            .map_err(acme_error(domain, "load account"))?
            .from_credentials(credentials)
            .await
            .map_err(acme_error(domain, "load account"))?;

        tracing::info!(domain, "ordering certificate");
        let identifiers = [Identifier::Dns(domain.to_string())];
        let mut order = account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(acme_error(domain, "new order"))?;

        let pending = Self::pending_challenges(&mut order, domain).await?;
        answer_challenges(
            solver,
            &pending,
            self.propagation_delay,
            Self::mark_ready_and_wait(&mut order, domain, &pending),
        )
        .await?;

        let bundle = self.finalize(&mut order, domain).await?;
        tracing::info!(domain, "certificate issued");
        Ok(bundle)
    }
}

fn acme_error<'a, E: Display>(
    domain: &'a str,
    operation: &'static str,
) -> impl FnOnce(E) -> Error + 'a {
    move |err| Error::Acme {
        domain: domain.to_string(),
        operation,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcmeDirectory;
    use std::sync::Mutex;

    /// Records every call and fails the ones it is told to.
    #[derive(Default)]
    struct Scripted {
        calls: Mutex<Vec<String>>,
        fail_present_of: Option<&'static str>,
        fail_clean_up: bool,
    }

    impl Scripted {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn rejected(domain: &str, operation: &'static str) -> Error {
            Error::BackendWriteFailed {
                backend: "scripted".to_string(),
                domain: domain.to_string(),
                name: format!("_acme-challenge.{domain}."),
                operation,
                reason: "HTTP 500 Internal Server Error - ".to_string(),
            }
        }
    }

    #[async_trait::async_trait]
    impl Dns01Solver for Scripted {
        async fn present(&self, domain: &str, _token: &str, _key_auth: &str) -> Result<(), Error> {
            self.calls.lock().unwrap().push(format!("present {domain}"));
            if self.fail_present_of == Some(domain) {
                return Err(Self::rejected(domain, "add"));
            }
            Ok(())
        }

        async fn clean_up(&self, domain: &str, _token: &str, _key_auth: &str) -> Result<(), Error> {
            self.calls.lock().unwrap().push(format!("clean_up {domain}"));
            if self.fail_clean_up {
                return Err(Self::rejected(domain, "clean"));
            }
            Ok(())
        }
    }

    fn challenges(domains: &[&str]) -> Vec<PendingChallenge> {
        domains
            .iter()
            .map(|domain| PendingChallenge {
                domain: (*domain).to_string(),
                token: "token".to_string(),
                key_auth: "token.thumbprint".to_string(),
                url: format!("https://ca.test/chall/{domain}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_every_presented_challenge_is_cleaned_up() {
        let solver = Scripted::default();
        let validated = Mutex::new(false);
        answer_challenges(
            &solver,
            &challenges(&["example.com", "www.example.com"]),
            Duration::ZERO,
            async {
                *validated.lock().unwrap() = true;
                Ok(())
            },
        )
        .await
        .unwrap();

        assert!(*validated.lock().unwrap());
        assert_eq!(
            solver.calls(),
            [
                "present example.com",
                "present www.example.com",
                "clean_up example.com",
                "clean_up www.example.com",
            ]
        );
    }

    #[tokio::test]
    async fn test_second_present_failing_still_cleans_the_first() {
        let solver = Scripted {
            fail_present_of: Some("www.example.com"),
            ..Scripted::default()
        };
        let validated = Mutex::new(false);
        let result = answer_challenges(
            &solver,
            &challenges(&["example.com", "www.example.com", "api.example.com"]),
            Duration::ZERO,
            async {
                *validated.lock().unwrap() = true;
                Ok(())
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::BackendWriteFailed { operation: "add", ref domain, .. }) if domain == "www.example.com"
        ));
        assert!(!*validated.lock().unwrap());
        assert_eq!(
            solver.calls(),
            [
                "present example.com",
                "present www.example.com",
                "clean_up example.com",
            ]
        );
    }

    #[tokio::test]
    async fn test_clean_up_failure_keeps_the_result() {
        let solver = Scripted {
            fail_clean_up: true,
            ..Scripted::default()
        };
        answer_challenges(
            &solver,
            &challenges(&["example.com", "www.example.com"]),
            Duration::ZERO,
            async { Ok(()) },
        )
        .await
        .unwrap();
        assert_eq!(
            solver.calls(),
            [
                "present example.com",
                "present www.example.com",
                "clean_up example.com",
                "clean_up www.example.com",
            ]
        );
    }

    #[tokio::test]
    async fn test_validation_failure_is_returned_after_clean_up() {
        let solver = Scripted::default();
        let result = answer_challenges(
            &solver,
            &challenges(&["example.com"]),
            Duration::ZERO,
            async { Err(acme_error("example.com", "validate")("order became invalid")) },
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::Acme { operation: "validate", .. })
        ));
        assert_eq!(solver.calls(), ["present example.com", "clean_up example.com"]);
    }

    #[test]
    fn test_acme_error_names_domain_and_operation() {
        let err = acme_error("example.com", "finalize")("badCSR");
        assert_eq!(
            err.to_string(),
            "ACME finalize failed for \"example.com\": badCSR"
        );
    }

    #[test]
    fn test_directory_urls() {
        let client = AcmeClient::new(
            AcmeDirectory::default().url(),
            KeyType::default(),
            Duration::ZERO,
        );
        assert_eq!(
            client.directory_url(),
            instant_acme::LetsEncrypt::Staging.url()
        );

        let client = AcmeClient::new(
            AcmeDirectory::Custom("https://localhost:14000/dir".to_string()).url(),
            KeyType::EcdsaP256,
            Duration::ZERO,
        );
        assert_eq!(client.directory_url(), "https://localhost:14000/dir");
    }
}
