//! The persisted ACME account.
//!
//! An account directory holds three files:
//!
//! * `privKey.pem`: the account private key, PKCS#8.
//! * `pubKey.pem`: the matching public key, SPKI.
//! * `registration.json`: the account credentials returned when registering.
//!
//! On first use the account is registered and all three files are written. Afterwards they're
//! loaded and cross-checked: the registration must carry the key in `privKey.pem`, and
//! `pubKey.pem` must be that key's public half.
use crate::acme::storage::write_atomic;
use crate::acme::CertificateAuthority;
use crate::challenge::record::BASE64_ENGINE;
use crate::error::Error;
use base64::Engine;
use rcgen::KeyPair;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const PRIVATE_KEY_FILE: &str = "privKey.pem";
pub const PUBLIC_KEY_FILE: &str = "pubKey.pem";
pub const REGISTRATION_FILE: &str = "registration.json";

/// The ACME account issuance runs as.
pub struct LetsEncryptUser {
    pub email: String,
    /// Serialized account credentials, as returned by [`CertificateAuthority::register`].
    pub registration: String,
    pub key_pair: KeyPair,
}

impl fmt::Debug for LetsEncryptUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LetsEncryptUser")
            .field("email", &self.email)
            .field("registration", &"<REDACTED>")
            .field("key_pair", &"<REDACTED>")
            .finish()
    }
}

impl LetsEncryptUser {
    /// Load the account persisted in `account_path`, or register one with `authority` and
    /// persist it when the directory holds no account yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Account`] if the persisted files are incomplete or inconsistent,
    /// [`Error::InvalidKey`] if a key can't be parsed, and [`Error::IO`] if the account directory
    /// can't be read or written. Registration failures are returned as is.
    pub async fn init(
        mail: &str,
        account_path: &Path,
        authority: &dyn CertificateAuthority,
    ) -> Result<Self, Error> {
        let files = AccountFiles::new(account_path);
        match files.present().await? {
            (true, true, true) => {
                let user = files.load(mail).await?;
                tracing::info!(path = %account_path.display(), "loaded ACME account");
                Ok(user)
            }
            (false, false, false) => {
                let registration = authority.register(mail).await?;
                let key_pair = KeyPair::try_from(registration_key(&registration)?.as_slice())?;
                let user = Self {
                    email: mail.to_string(),
                    registration,
                    key_pair,
                };
                files.save(&user).await?;
                tracing::info!(path = %account_path.display(), "registered new ACME account");
                Ok(user)
            }
            _ => Err(Error::Account(format!(
                "incomplete account in {}: expected {PRIVATE_KEY_FILE}, {PUBLIC_KEY_FILE} and {REGISTRATION_FILE}",
                account_path.display()
            ))),
        }
    }
}

struct AccountFiles {
    dir: PathBuf,
    private_key: PathBuf,
    public_key: PathBuf,
    registration: PathBuf,
}

impl AccountFiles {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            private_key: dir.join(PRIVATE_KEY_FILE),
            public_key: dir.join(PUBLIC_KEY_FILE),
            registration: dir.join(REGISTRATION_FILE),
        }
    }

    async fn present(&self) -> Result<(bool, bool, bool), Error> {
        Ok((
            fs::try_exists(&self.private_key).await?,
            fs::try_exists(&self.public_key).await?,
            fs::try_exists(&self.registration).await?,
        ))
    }

    async fn load(&self, mail: &str) -> Result<LetsEncryptUser, Error> {
        let key_pair = decode_private_key(&fs::read_to_string(&self.private_key).await?)?;

        let public_pem = fs::read_to_string(&self.public_key).await?;
        if normalize_pem(&public_pem) != normalize_pem(&encode_public_key(&key_pair)) {
            return Err(Error::Account(format!(
                "{} doesn't match {}",
                self.public_key.display(),
                self.private_key.display()
            )));
        }

        let registration = fs::read_to_string(&self.registration).await?;
        if registration_key(&registration)? != key_pair.serialize_der() {
            return Err(Error::Account(format!(
                "{} was registered with another key than {}",
                self.registration.display(),
                self.private_key.display()
            )));
        }

        Ok(LetsEncryptUser {
            email: mail.to_string(),
            registration,
            key_pair,
        })
    }

    async fn save(&self, user: &LetsEncryptUser) -> Result<(), Error> {
        fs::create_dir_all(&self.dir).await?;
        write_atomic(
            &self.private_key,
            encode_private_key(&user.key_pair).as_bytes(),
            true,
        )
        .await?;
        write_atomic(
            &self.public_key,
            encode_public_key(&user.key_pair).as_bytes(),
            false,
        )
        .await?;
        write_atomic(&self.registration, user.registration.as_bytes(), true).await
    }
}

/// The PKCS#8 DER account key carried by serialized credentials.
///
/// # Errors
///
/// Returns [`Error::InvalidJSON`] for malformed credentials and [`Error::Account`] if they carry
/// no usable key.
pub fn registration_key(registration: &str) -> Result<Vec<u8>, Error> {
    let credentials: serde_json::Value = serde_json::from_str(registration)?;
    let encoded = credentials
        .get("key_pkcs8")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| Error::Account("registration has no key_pkcs8".to_string()))?;
    BASE64_ENGINE
        .decode(encoded)
        .map_err(|err| Error::Account(format!("registration key_pkcs8: {err}")))
}

#[must_use]
pub fn encode_private_key(key_pair: &KeyPair) -> String {
    key_pair.serialize_pem()
}

/// # Errors
///
/// Returns [`Error::InvalidKey`] if `pem` isn't a supported PKCS#8 private key.
pub fn decode_private_key(pem: &str) -> Result<KeyPair, Error> {
    Ok(KeyPair::from_pem(pem)?)
}

/// SPKI PEM of the public half of `key_pair`. `pubKey.pem` is never parsed on its own: loading
/// re-derives it from `privKey.pem` and compares.
#[must_use]
pub fn encode_public_key(key_pair: &KeyPair) -> String {
    key_pair.public_key_pem()
}

fn normalize_pem(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
