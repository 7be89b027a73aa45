use super::errors::{Result, SyncError};
use super::repo_config::{home_expand, RepoCfg, Transport};
use git2::{CertificateCheckStatus, Cred, CredentialType, RemoteCallbacks};
use log::warn;
use std::fmt;
use std::path::{Path, PathBuf};

const DEFAULT_SSH_USER: &str = "git";

pub enum Credentials {
    None,
    Basic {
        username: String,
        password: String,
    },
    Key {
        username: String,
        path: PathBuf,
        passphrase: Option<String>,
        insecure_host_key: bool,
    },
    Password {
        username: String,
        password: String,
        insecure_host_key: bool,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::Key { username, path, insecure_host_key, .. } => f
                .debug_struct("Key")
                .field("username", username)
                .field("path", path)
                .field("insecure_host_key", insecure_host_key)
                .finish_non_exhaustive(),
            Credentials::Password { username, insecure_host_key, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("insecure_host_key", insecure_host_key)
                .finish_non_exhaustive(),
        }
    }
}

/// Picks the credential for `cfg`. A configured private key is read up front
/// so a missing or garbled key fails here rather than deep inside libgit2.
pub fn resolve(cfg: &RepoCfg) -> Result<Credentials> {
    let Some(auth) = &cfg.auth else {
        return Ok(Credentials::None);
    };

    match cfg.transport() {
        Transport::Http if !auth.username.is_empty() => Ok(Credentials::Basic {
            username: auth.username.clone(),
            password: auth.password.clone(),
        }),
        Transport::Ssh => {
            let key_path = auth
                .key_path
                .as_deref()
                .filter(|path| !path.as_os_str().is_empty())
                .map(home_expand);

            if let Some(path) = key_path {
                let username = ssh_user(&cfg.address)
                    .or(Some(auth.username.as_str()).filter(|user| !user.is_empty()))
                    .unwrap_or(DEFAULT_SSH_USER)
                    .to_string();
                check_private_key(&path)?;
                return Ok(Credentials::Key {
                    username,
                    path,
                    passphrase: auth.key_passphrase.clone().filter(|p| !p.is_empty()),
                    insecure_host_key: auth.strict_host_key_checking_disabled,
                });
            }
            if !auth.username.is_empty() {
                return Ok(Credentials::Password {
                    username: auth.username.clone(),
                    password: auth.password.clone(),
                    insecure_host_key: auth.strict_host_key_checking_disabled,
                });
            }
            Ok(Credentials::None)
        }
        _ => Ok(Credentials::None),
    }
}

/// User part of an scp-like or `ssh://` address, e.g. `git` in
/// `git@github.com:org/repo.git`.
fn ssh_user(address: &str) -> Option<&str> {
    let address = address.strip_prefix("ssh://").unwrap_or(address);
    let (user, _) = address.split_once('@')?;
    if user.is_empty() || user.contains('/') || user.contains(':') {
        return None;
    }
    Some(user)
}

fn check_private_key(path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path).map_err(|source| SyncError::KeyUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    if !contents.contains("-----BEGIN") || !contents.contains("PRIVATE KEY-----") {
        return Err(SyncError::KeyMalformed { path: path.to_path_buf() });
    }
    Ok(())
}

impl Credentials {
    pub fn username(&self) -> Option<&str> {
        match self {
            Credentials::None => None,
            Credentials::Basic { username, .. }
            | Credentials::Key { username, .. }
            | Credentials::Password { username, .. } => Some(username),
        }
    }

    pub fn skips_host_key_check(&self) -> bool {
        matches!(
            self,
            Credentials::Key { insecure_host_key: true, .. }
                | Credentials::Password { insecure_host_key: true, .. }
        )
    }

    fn to_cred(&self, allowed: CredentialType) -> std::result::Result<Cred, git2::Error> {
        match self {
            Credentials::Basic { username, password }
            | Credentials::Password { username, password, .. }
                if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) =>
            {
                Cred::userpass_plaintext(username, password)
            }
            Credentials::Key { username, path, passphrase, .. }
                if allowed.contains(CredentialType::SSH_KEY) =>
            {
                Cred::ssh_key(username, None, path, passphrase.as_deref())
            }
            _ => Err(git2::Error::from_str(
                "remote does not accept the configured credential type",
            )),
        }
    }

    /// User to send when the remote asks for a username only: the configured
    /// one, else the one in the URL, else `git`.
    fn ssh_username<'s>(&'s self, username_from_url: Option<&'s str>) -> &'s str {
        self.username().or(username_from_url).unwrap_or(DEFAULT_SSH_USER)
    }

    fn check_host_key(
        &self,
        host: &str,
    ) -> std::result::Result<CertificateCheckStatus, git2::Error> {
        if self.skips_host_key_check() {
            warn!("Accepting host key for {host} without verification");
            return Ok(CertificateCheckStatus::CertificateOk);
        }
        Ok(CertificateCheckStatus::CertificatePassthrough)
    }

    /// Callbacks for a single clone or fetch.
    pub fn remote_callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();

        if !matches!(self, Credentials::None) {
            let mut attempts = CredentialAttempts::new(self);
            callbacks.credentials(move |url, username_from_url, allowed| {
                attempts.next(url, username_from_url, allowed)
            });
        }
        callbacks.certificate_check(|_cert, host| self.check_host_key(host));

        callbacks
    }
}

/// Answers libgit2's credential requests for one clone or fetch. The
/// configured credential is handed out once; being asked again means the
/// remote rejected it.
struct CredentialAttempts<'a> {
    creds: &'a Credentials,
    offered: bool,
}

impl<'a> CredentialAttempts<'a> {
    fn new(creds: &'a Credentials) -> CredentialAttempts<'a> {
        CredentialAttempts { creds, offered: false }
    }

    fn next(
        &mut self,
        url: &str,
        username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> std::result::Result<Cred, git2::Error> {
        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(self.creds.ssh_username(username_from_url));
        }
        if self.offered {
            return Err(git2::Error::from_str(&format!("credentials for {url} were rejected")));
        }
        self.offered = true;
        self.creds.to_cred(allowed)
    }
}
