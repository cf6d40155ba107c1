//! Certificate output on disk.
//!
//! Each issued bundle lands in `<root>/<domain>/<domain>.key` and `<root>/<domain>/<domain>.crt`.
//! Files are written to a temporary sibling, synced, then renamed over the target so a reader
//! never observes a partially written key or certificate.
use crate::acme::CertificateBundle;
use crate::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Writes issued certificates below a root directory.
#[derive(Debug, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct CertificateStore {
    root: PathBuf,
}

impl CertificateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory a domain's bundle is written to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDomain`] if `domain` is empty or could escape the root directory.
    pub fn domain_dir(&self, domain: &str) -> Result<PathBuf, Error> {
        validate_domain(domain)?;
        Ok(self.root.join(domain))
    }

    /// Persist `bundle` for `domain`, returning the directory it was written to. Nothing is
    /// written unless both the key and the certificate are non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDomain`] or [`Error::EmptyCertificate`] before touching the
    /// filesystem, and [`Error::IO`] if a file can't be written.
    pub async fn save(&self, domain: &str, bundle: &CertificateBundle) -> Result<PathBuf, Error> {
        let dir = self.domain_dir(domain)?;
        if bundle.private_key.trim().is_empty() {
            return Err(Error::EmptyCertificate {
                domain: domain.to_string(),
                part: "private key",
            });
        }
        if bundle.certificate.trim().is_empty() {
            return Err(Error::EmptyCertificate {
                domain: domain.to_string(),
                part: "certificate",
            });
        }

        fs::create_dir_all(&dir).await?;
        write_atomic(
            &dir.join(format!("{domain}.key")),
            bundle.private_key.as_bytes(),
            true,
        )
        .await?;
        write_atomic(
            &dir.join(format!("{domain}.crt")),
            bundle.certificate.as_bytes(),
            false,
        )
        .await?;
        tracing::info!(domain, path = %dir.display(), "certificate saved");
        Ok(dir)
    }
}

fn validate_domain(domain: &str) -> Result<(), Error> {
    if domain.is_empty()
        || domain.contains('/')
        || domain.contains('\\')
        || domain.contains("..")
        || domain.contains('\0')
    {
        return Err(Error::InvalidDomain(domain.to_string()));
    }
    Ok(())
}

/// Replace `path` with `contents` through a synced temporary sibling. `private` files are only
/// readable by their owner on unix.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8], private: bool) -> Result<(), Error> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidDomain(path.display().to_string()))?
        .to_string_lossy();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut output_file = options.open(&tmp).await?;
    output_file.write_all(contents).await?;
    output_file.flush().await?;
    output_file.sync_all().await?;
    drop(output_file);

    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}
