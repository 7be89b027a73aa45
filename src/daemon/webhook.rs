use super::errors::{Result, SyncError};
use super::repo_config::{WebhookCfg, WebhookKind};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("auth header not found")]
    MissingHeader,
    #[error("signed webhook requires POST, got {0}")]
    MethodNotAllowed(Method),
    #[error("malformed {header} header: {reason}")]
    MalformedSignature { header: HeaderName, reason: String },
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("auth header value mismatch")]
    SecretMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookPolicy {
    Signature { header: HeaderName },
    SharedSecret { header: HeaderName },
}

#[derive(Clone)]
pub struct Webhook {
    pub name: String,
    pub policy: WebhookPolicy,
    secret: String,
}

impl fmt::Debug for Webhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Webhook")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Webhook {
    /// Builds the runtime webhook from a config entry of an already
    /// validated [`RepoCfg`](super::repo_config::RepoCfg).
    pub fn from_config(repo: &str, cfg: &WebhookCfg) -> Result<Webhook> {
        let header = cfg.header_name().cloned().ok_or_else(|| SyncError::InvalidWebhook {
            repo: repo.to_string(),
            webhook: cfg.name.clone(),
            reason: "config was not validated".to_string(),
        })?;
        let policy = match cfg.resolved_kind() {
            WebhookKind::Signature => WebhookPolicy::Signature { header },
            WebhookKind::Secret => WebhookPolicy::SharedSecret { header },
        };
        Ok(Webhook {
            name: cfg.name.clone(),
            policy,
            secret: cfg.secret.clone(),
        })
    }

    pub fn header(&self) -> &HeaderName {
        match &self.policy {
            WebhookPolicy::Signature { header } | WebhookPolicy::SharedSecret { header } => header,
        }
    }

    fn verify(
        &self,
        method: &Method,
        value: &HeaderValue,
        body: &[u8],
    ) -> std::result::Result<(), WebhookError> {
        match &self.policy {
            WebhookPolicy::Signature { header } => {
                if *method != Method::POST {
                    return Err(WebhookError::MethodNotAllowed(method.clone()));
                }
                let malformed = |reason: &str| WebhookError::MalformedSignature {
                    header: header.clone(),
                    reason: reason.to_string(),
                };
                let value = value.to_str().map_err(|_| malformed("value is not ASCII"))?;
                let digest = value
                    .strip_prefix(SIGNATURE_PREFIX)
                    .ok_or_else(|| malformed("sha256 not found"))?
                    .trim();
                if digest.len() != 64 {
                    return Err(malformed(&format!("sha256 digest length {}", digest.len())));
                }
                let expected = hex::decode(digest).map_err(|_| malformed("digest is not hex"))?;

                let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
                    .map_err(|_| WebhookError::SignatureMismatch)?;
                mac.update(body);
                mac.verify_slice(&expected)
                    .map_err(|_| WebhookError::SignatureMismatch)
            }
            WebhookPolicy::SharedSecret { .. } => {
                if value.as_bytes() == self.secret.as_bytes() {
                    Ok(())
                } else {
                    Err(WebhookError::SecretMismatch)
                }
            }
        }
    }
}

/// Checks a request against the configured webhooks in order. The first
/// webhook whose header is present (and non-empty) must verify; later ones are
/// not consulted.
pub fn authenticate<'a>(
    webhooks: &'a [Webhook],
    method: &Method,
    headers: &HeaderMap,
    body: &[u8],
) -> std::result::Result<&'a Webhook, WebhookError> {
    for webhook in webhooks {
        let Some(value) = headers.get(webhook.header()) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        webhook.verify(method, value, body)?;
        return Ok(webhook);
    }
    Err(WebhookError::MissingHeader)
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}
