//! Bounded wait for a DNS backend's management API to accept requests.
//!
//! Backends are polled with exponential backoff, starting at [`Readiness::backoff`] and doubling
//! up to [`Readiness::max_backoff`], for at most [`Readiness::attempts`] attempts.

use crate::config::{DNSServerConfig, Readiness};
use crate::error::Error;
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::time::sleep;

/// `GET` the `health` URL until it answers 2xx, or fail with [`Error::BackendUnreachable`] once
/// the readiness budget of `config` is spent.
pub(crate) async fn wait_until_up(
    config: &DNSServerConfig,
    client: &Client,
    health: &Url,
) -> Result<(), Error> {
    let Readiness {
        attempts,
        backoff,
        max_backoff,
    } = config.readiness;
    let attempts = attempts.max(1);
    let mut delay = backoff;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match client.get(health.clone()).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(backend = %config.name, attempt, "DNS backend is up");
                return Ok(());
            }
            Ok(resp) => last_error = format!("HTTP {}", resp.status()),
            Err(err) => last_error = err.to_string(),
        }
        if attempt < attempts {
            tracing::debug!(
                backend = %config.name,
                attempt,
                "DNS backend not ready ({last_error}), retrying in {delay:?}"
            );
            sleep(delay).await;
            delay = next_delay(delay, max_backoff);
        }
    }

    Err(Error::BackendUnreachable {
        backend: config.name.clone(),
        url: health.to_string(),
        attempts,
        last_error,
    })
}

fn next_delay(delay: Duration, max_backoff: Duration) -> Duration {
    delay.saturating_mul(2).min(max_backoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let cap = Duration::from_secs(8);
        let mut delay = Duration::from_millis(500);
        let mut seen = vec![];
        for _ in 0..6 {
            seen.push(delay);
            delay = next_delay(delay, cap);
        }
        assert_eq!(
            seen,
            [500, 1000, 2000, 4000, 8000, 8000]
                .into_iter()
                .map(Duration::from_millis)
                .collect::<Vec<_>>()
        );
    }
}
