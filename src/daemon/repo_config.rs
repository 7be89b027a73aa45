use super::errors::{Result, SyncError};
use axum::http::HeaderName;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Header GitHub-style webhooks put their HMAC-SHA256 body signature in.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

fn default_base_dir() -> PathBuf { PathBuf::from(".") }

/// How clone and pull talk to the remote, derived once from the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Ssh,
    Local,
}

impl Transport {
    pub fn from_address(address: &str) -> Transport {
        if address.starts_with("https://") || address.starts_with("http://") {
            Transport::Http
        } else if address.starts_with("file://") || address.starts_with('/') {
            Transport::Local
        } else {
            Transport::Ssh
        }
    }
}

#[derive(Deserialize, Clone, Default)]
pub struct AuthCfg {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Private key for SSH transport, takes precedence over username/password
    pub key_path: Option<PathBuf>,
    pub key_passphrase: Option<String>,
    #[serde(default)]
    pub strict_host_key_checking_disabled: bool,
}

impl fmt::Debug for AuthCfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCfg")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("key_path", &self.key_path)
            .field("key_passphrase", &self.key_passphrase.as_ref().map(|_| "<redacted>"))
            .field("strict_host_key_checking_disabled", &self.strict_host_key_checking_disabled)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookKind {
    /// HMAC-SHA256 of the request body, `sha256=<hex>` in the header
    Signature,
    /// Header value must equal the secret verbatim
    Secret,
}

#[derive(Deserialize, Clone)]
pub struct WebhookCfg {
    #[serde(default)]
    pub name: String,
    pub header: String,
    pub secret: String,
    /// Resolved during validation when left out of the config file
    pub kind: Option<WebhookKind>,
    #[serde(skip)]
    header_name: Option<HeaderName>,
}

impl fmt::Debug for WebhookCfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookCfg")
            .field("name", &self.name)
            .field("header", &self.header)
            .field("secret", &"<redacted>")
            .field("kind", &self.kind)
            .finish()
    }
}

impl WebhookCfg {
    pub fn new(
        name: impl Into<String>,
        header: impl Into<String>,
        secret: impl Into<String>,
    ) -> WebhookCfg {
        WebhookCfg {
            name: name.into(),
            header: header.into(),
            secret: secret.into(),
            kind: None,
            header_name: None,
        }
    }

    /// The parsed header, set once the owning [`RepoCfg`] is validated.
    pub fn header_name(&self) -> Option<&HeaderName> {
        self.header_name.as_ref()
    }

    pub fn resolved_kind(&self) -> WebhookKind {
        match self.kind {
            Some(kind) => kind,
            None if self.header.eq_ignore_ascii_case(SIGNATURE_HEADER) => WebhookKind::Signature,
            None => WebhookKind::Secret,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecCfg {
    #[serde(default)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepoCfg {
    /// Unique alias, also the directory name under `base_dir`
    pub name: String,
    /// Remote URL, must end with `.git`
    pub address: String,
    /// Where the working copy lives, `~` is expanded at update time
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Branch to track (empty follows the remote default)
    #[serde(default)]
    pub branch: String,
    /// Shallow clone depth, 0 fetches full history. Local addresses only
    /// support 0.
    #[serde(default)]
    pub depth: u32,
    /// Auto-update interval in seconds, 0 disables the scheduler
    #[serde(default)]
    pub update_interval: u64,
    pub auth: Option<AuthCfg>,
    #[serde(default)]
    pub webhooks: Vec<WebhookCfg>,
    #[serde(default, alias = "post_pull_exec")]
    pub post_update: Vec<ExecCfg>,
    #[serde(skip)]
    transport: Option<Transport>,
}

impl RepoCfg {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        base_dir: impl Into<PathBuf>,
    ) -> RepoCfg {
        RepoCfg {
            name: name.into(),
            address: address.into(),
            base_dir: base_dir.into(),
            branch: String::new(),
            depth: 0,
            update_interval: 0,
            auth: None,
            webhooks: Vec::new(),
            post_update: Vec::new(),
            transport: None,
        }
    }

    /// Checks everything that can be checked without touching the network
    /// and caches the transport. The name is trimmed in place.
    pub fn validate(&mut self) -> Result<()> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(SyncError::NameEmpty);
        }
        if self.address.is_empty() {
            return Err(SyncError::AddressEmpty { name: self.name.clone() });
        }
        if !self.address.ends_with(".git") {
            return Err(SyncError::AddressUnsupported(self.address.clone()));
        }
        let transport = Transport::from_address(&self.address);
        if i32::try_from(self.depth).is_err() {
            return Err(SyncError::DepthOutOfRange { name: self.name.clone(), depth: self.depth });
        }
        // libgit2's local transport cannot fetch shallow
        if self.depth > 0 && transport == Transport::Local {
            return Err(SyncError::ShallowLocal { name: self.name.clone() });
        }
        self.transport = Some(transport);

        for webhook in &mut self.webhooks {
            let invalid = |reason: &str| SyncError::InvalidWebhook {
                repo: self.name.clone(),
                webhook: webhook.name.clone(),
                reason: reason.to_string(),
            };
            if webhook.header.is_empty() {
                return Err(invalid("header is empty"));
            }
            let Ok(header_name) = HeaderName::from_bytes(webhook.header.as_bytes()) else {
                return Err(invalid("header is not a valid HTTP header name"));
            };
            if webhook.secret.is_empty() {
                return Err(invalid("secret is empty"));
            }
            webhook.kind = Some(webhook.resolved_kind());
            webhook.header_name = Some(header_name);
        }
        Ok(())
    }

    pub fn transport(&self) -> Transport {
        self.transport
            .unwrap_or_else(|| Transport::from_address(&self.address))
    }

    /// `base_dir` with the home shorthand expanded.
    pub fn base_dir(&self) -> PathBuf {
        home_expand(&self.base_dir)
    }

    /// The working copy directory, `base_dir/name`.
    pub fn local_dir(&self) -> PathBuf {
        self.base_dir().join(&self.name)
    }
}

/// Expands a leading `~` to the current user's home directory. Paths are
/// returned untouched when there is no shorthand or no known home.
pub fn home_expand(path: &Path) -> PathBuf {
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    let rest = match text {
        "~" => "",
        _ => match text.strip_prefix("~/") {
            Some(rest) => rest,
            None => return path.to_path_buf(),
        },
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
