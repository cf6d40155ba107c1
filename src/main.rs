use anyhow::{anyhow, bail, Context, Result};
use is_terminal::IsTerminal;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zonecrab::acme::CertificateStore;
use zonecrab::{AcmeClient, Config, LetsEncrypt, LetsEncryptUser, Shared, SharedDNSServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut args = std::env::args();
    let program_name = args.next().unwrap_or("zonecrab".to_string());
    let config_file = args.next();
    let domains: Vec<String> = args.collect();

    let config = config_init(&program_name, config_file, domains)?;
    if config.domains.is_empty() {
        bail!("no domains to issue certificates for");
    }

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
            Ok(())
        },
        res = run(config) => res,
    }
}

async fn run(config: Shared) -> Result<()> {
    let mut servers: Vec<SharedDNSServer> = Vec::with_capacity(config.dns_servers.len());
    for server_config in &config.dns_servers {
        let name = server_config.name.clone();
        let server = zonecrab::connect_dns(server_config.clone())
            .await
            .with_context(|| format!("DNS backend \"{name}\""))?;
        servers.push(server);
    }

    let client = Arc::new(AcmeClient::from_config(&config));
    tracing::info!(directory = %client.directory_url(), "using ACME directory");
    let user = LetsEncryptUser::init(&config.mail, &config.account_path, client.as_ref())
        .await
        .context("ACME account")?;
    let issuer = LetsEncrypt::new(
        client,
        user,
        CertificateStore::new(&config.certificate_dir_path),
    );

    let mut failures = 0;
    for domain in &config.domains {
        match issuer.ask_certificate_from(domain, &servers).await {
            Ok(path) => tracing::info!(domain, path = %path.display(), "certificate ready"),
            Err(err) => {
                failures += 1;
                tracing::error!(domain, "issuance failed: {err}");
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!(
            "{failures} of {} certificates could not be issued",
            config.domains.len()
        ));
    }
    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zonecrab=info".into()),
        )
        .init();
}

fn config_init(
    program_name: &str,
    config_file: Option<String>,
    domains: Vec<String>,
) -> Result<Shared> {
    match config_file {
        None => Err(anyhow!(
            "usage: {program_name} /path/to/config.json [domain ...]"
        )),
        Some(config_file) => {
            let mut config = Config::try_from_file(&config_file)
                .with_context(|| format!("loading {config_file}"))?;
            tracing::debug!("loaded config from {config_file}");
            if !domains.is_empty() {
                config.domains = domains;
            }
            Ok(Arc::new(config))
        }
    }
}
