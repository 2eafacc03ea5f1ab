//! `OAuth1` request signing (RFC 5849).
//!
//! The signer builds the signature base string from the HTTP method, the
//! normalized request URL and the normalized parameter set (`oauth_*`
//! parameters merged with the query parameters of the URL), signs it with
//! `HMAC-SHA1` or `PLAINTEXT`, and renders the `Authorization: OAuth ...`
//! header value.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Deserialize;
use sha1::Sha1;

use crate::encoding::{encode, normalize_params, normalize_url, query_params};
use crate::error::AuthError;
use crate::secret::SecretString;

type HmacSha1 = Hmac<Sha1>;

/// Only `1.0` exists.
pub const OAUTH_VERSION: &str = "1.0";

/// Supported `oauth_signature_method` values.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SignatureMethod {
    #[default]
    #[serde(rename = "HMAC-SHA1")]
    HmacSha1,
    #[serde(rename = "PLAINTEXT")]
    Plaintext,
}

impl SignatureMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HmacSha1 => "HMAC-SHA1",
            Self::Plaintext => "PLAINTEXT",
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer and (optional) token credentials for `OAuth1` signing.
///
/// Deserializes from the `xauth` option shape; `access_token` and
/// `access_token_secret` are accepted as aliases of `token` and
/// `token_secret`.
#[derive(Clone, Debug, Deserialize)]
pub struct OAuth1Credentials {
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    #[serde(default, alias = "access_token")]
    pub token: Option<String>,
    #[serde(default, alias = "access_token_secret")]
    pub token_secret: Option<SecretString>,
    #[serde(default)]
    pub signature_method: SignatureMethod,
    /// Emitted as `realm="..."` in the header when set.
    #[serde(default)]
    pub realm: Option<String>,
}

impl OAuth1Credentials {
    #[must_use]
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<SecretString>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: None,
            token_secret: None,
            signature_method: SignatureMethod::default(),
            realm: None,
        }
    }

    #[must_use]
    pub fn with_token(
        mut self,
        token: impl Into<String>,
        token_secret: impl Into<SecretString>,
    ) -> Self {
        self.token = Some(token.into());
        self.token_secret = Some(token_secret.into());
        self
    }

    #[must_use]
    pub fn with_signature_method(mut self, method: SignatureMethod) -> Self {
        self.signature_method = method;
        self
    }

    /// Build the `Authorization` header value for a request.
    ///
    /// `url` is the full request URL; its query parameters take part in the
    /// signature.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if the HMAC key cannot be initialised.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        stamp: &Stamp,
    ) -> Result<String, AuthError> {
        let mut oauth_params: Vec<(&'static str, String)> = Vec::with_capacity(7);
        if let Some(token) = &self.token {
            oauth_params.push(("oauth_token", token.clone()));
        }
        oauth_params.push(("oauth_version", OAUTH_VERSION.to_owned()));
        oauth_params.push(("oauth_consumer_key", self.consumer_key.clone()));
        oauth_params.push((
            "oauth_signature_method",
            self.signature_method.as_str().to_owned(),
        ));
        oauth_params.push(("oauth_nonce", stamp.nonce.clone()));
        oauth_params.push(("oauth_timestamp", stamp.timestamp.to_string()));

        let mut signed: Vec<(String, String)> = query_params(url);
        signed.extend(oauth_params.iter().map(|(k, v)| ((*k).to_owned(), v.clone())));

        let token_secret = self.token_secret.as_ref().map(SecretString::expose);
        let signature = signature(
            self.signature_method,
            method,
            url,
            &signed,
            self.consumer_secret.expose(),
            token_secret,
        )?;
        oauth_params.push(("oauth_signature", signature));

        let mut parts = Vec::with_capacity(oauth_params.len() + 1);
        if let Some(realm) = &self.realm {
            parts.push(format!("realm=\"{}\"", encode(realm)));
        }
        parts.extend(
            oauth_params
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", encode(v))),
        );

        Ok(format!("OAuth {}", parts.join(", ")))
    }
}

/// Per-request nonce and timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stamp {
    pub nonce: String,
    pub timestamp: u64,
}

impl Stamp {
    /// Fresh random alphanumeric nonce of `nonce_length` characters and the
    /// current time in seconds since the Unix epoch.
    #[must_use]
    pub fn generate(nonce_length: usize) -> Self {
        Self {
            nonce: nonce(nonce_length),
            timestamp: unix_timestamp(),
        }
    }

    #[must_use]
    pub fn fixed(nonce: impl Into<String>, timestamp: u64) -> Self {
        Self {
            nonce: nonce.into(),
            timestamp,
        }
    }
}

/// Random string drawn from `[A-Za-z0-9]`.
#[must_use]
pub fn nonce(length: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// `UPPER(method) & encode(base url) & encode(normalized params)`.
#[must_use]
pub fn base_string(method: &str, url: &str, params: &[(String, String)]) -> String {
    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(normalize_url(url)),
        encode(&normalize_params(params))
    )
}

/// `encode(consumer_secret) & encode(token_secret)`; the token part is empty
/// when no token secret is known.
#[must_use]
pub fn signing_key(consumer_secret: &str, token_secret: Option<&str>) -> String {
    format!(
        "{}&{}",
        encode(consumer_secret),
        encode(token_secret.unwrap_or_default())
    )
}

/// Compute `oauth_signature` for an already merged parameter set.
///
/// `params` must contain every parameter that takes part in the signature
/// (oauth parameters, URL query parameters, anything else the caller wants
/// signed); the query string of `url` itself is ignored here.
///
/// # Errors
///
/// Returns [`AuthError::Signing`] if the HMAC key cannot be initialised.
pub fn signature(
    method: SignatureMethod,
    http_method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: Option<&str>,
) -> Result<String, AuthError> {
    match method {
        SignatureMethod::Plaintext => Ok(format!(
            "{consumer_secret}%26{}",
            token_secret.unwrap_or_default()
        )),
        SignatureMethod::HmacSha1 => {
            let base = base_string(http_method, url, params);
            let key = signing_key(consumer_secret, token_secret);
            tracing::trace!(base_string = %base, "computing OAuth1 HMAC-SHA1 signature");

            let mut mac = HmacSha1::new_from_slice(key.as_bytes())
                .map_err(|e| AuthError::Signing(e.to_string()))?;
            mac.update(base.as_bytes());
            Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
        }
    }
}
