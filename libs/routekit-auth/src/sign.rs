use base64::{Engine as _, engine::general_purpose};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::context::AuthContext;
use crate::error::AuthError;
use crate::oauth1::{OAuth1Credentials, Stamp};
use crate::secret::SecretString;

/// Per-call extra values (session data, signing overrides).
pub type Extras = serde_json::Map<String, Value>;

/// `Authorization` value used when a custom signer fails.
pub const CUSTOM_SIGNER_FAILURE: &str = "ERROR IN CUSTOM";

/// Default `OAuth1` nonce length.
pub const DEFAULT_NONCE_LENGTH: usize = 16;

/// What the signing engine needs to know about an outgoing request.
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    /// Absolute URL including the query string.
    pub url: &'a str,
    pub extras: &'a Extras,
    pub nonce_length: usize,
}

impl<'a> SigningRequest<'a> {
    #[must_use]
    pub fn new(method: &'a str, url: &'a str, extras: &'a Extras) -> Self {
        Self {
            method,
            url,
            extras,
            nonce_length: DEFAULT_NONCE_LENGTH,
        }
    }

    #[must_use]
    pub fn with_nonce_length(mut self, nonce_length: usize) -> Self {
        self.nonce_length = nonce_length;
        self
    }
}

/// Result of applying an [`AuthContext`] to a request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// Value for the `Authorization` header.
    pub authorization: Option<String>,
    /// Query parameter (name, raw value) to append to the request path.
    pub query: Option<(&'static str, String)>,
}

impl AuthOutcome {
    fn header(value: String) -> Self {
        Self {
            authorization: Some(value),
            query: None,
        }
    }

    fn query(name: &'static str, value: &SecretString) -> Self {
        Self {
            authorization: None,
            query: Some((name, value.expose().to_owned())),
        }
    }
}

/// Apply `ctx` to `request`.
///
/// Custom signer failures do not fail the request: a warning is logged and
/// the header is set to [`CUSTOM_SIGNER_FAILURE`].
///
/// # Errors
///
/// Returns [`AuthError::Signing`] if an `OAuth1` signature cannot be computed.
pub fn sign(ctx: &AuthContext, request: &SigningRequest<'_>) -> Result<AuthOutcome, AuthError> {
    let outcome = match ctx {
        AuthContext::None => AuthOutcome::default(),
        AuthContext::Basic { username, password } => {
            AuthOutcome::header(basic(username, password.expose()))
        }
        AuthContext::Token { username, token } => {
            AuthOutcome::header(basic(&format!("{username}/token"), token.expose()))
        }
        AuthContext::ApiKey { api_key } => AuthOutcome::query("api_key", api_key),
        AuthContext::OAuth2 { token } => AuthOutcome::query("access_token", token),
        AuthContext::Custom(signer) => match signer.sign(request) {
            Ok(value) => AuthOutcome::header(value),
            Err(e) => {
                tracing::warn!(error = %e, url = request.url, "custom signer failed, sending marker header");
                AuthOutcome::header(CUSTOM_SIGNER_FAILURE.to_owned())
            }
        },
        AuthContext::OAuth1(creds) => {
            let creds = with_extras_override(creds, request.extras);
            let stamp = Stamp::generate(request.nonce_length);
            AuthOutcome::header(creds.authorization_header(request.method, request.url, &stamp)?)
        }
    };
    Ok(outcome)
}

fn basic(user: &str, secret: &str) -> String {
    let credentials = Zeroizing::new(format!("{user}:{secret}"));
    let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
    format!("Basic {encoded}")
}

/// Extras may carry a per-call `access_token` / `access_token_secret` pair
/// (e.g. the token of the session the call is made for).
fn with_extras_override<'c>(
    creds: &'c OAuth1Credentials,
    extras: &Extras,
) -> std::borrow::Cow<'c, OAuth1Credentials> {
    let token = extras.get("access_token").and_then(Value::as_str);
    let secret = extras.get("access_token_secret").and_then(Value::as_str);
    match (token, secret) {
        (Some(token), Some(secret)) => {
            std::borrow::Cow::Owned(creds.clone().with_token(token, secret))
        }
        _ => std::borrow::Cow::Borrowed(creds),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::context::BoxError;
    use tracing_test::traced_test;

    fn request<'a>(extras: &'a Extras) -> SigningRequest<'a> {
        SigningRequest::new("get", "https://api.example.com/user?page=1", extras)
    }

    #[test]
    fn none_adds_nothing() {
        let extras = Extras::new();
        let outcome = sign(&AuthContext::None, &request(&extras)).unwrap();
        assert_eq!(outcome, AuthOutcome::default());
    }

    #[test]
    fn basic_encodes_user_and_password() {
        let extras = Extras::new();
        let ctx = AuthContext::basic("Aladdin", "open sesame");
        let outcome = sign(&ctx, &request(&extras)).unwrap();
        assert_eq!(
            outcome.authorization.as_deref(),
            Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")
        );
    }

    #[test]
    fn token_uses_slash_token_user() {
        let extras = Extras::new();
        let ctx = AuthContext::token("u", "t");
        let outcome = sign(&ctx, &request(&extras)).unwrap();
        // base64("u/token:t")
        assert_eq!(outcome.authorization.as_deref(), Some("Basic dS90b2tlbjp0"));
    }

    #[test]
    fn api_key_and_oauth2_go_to_the_query() {
        let extras = Extras::new();
        let outcome = sign(&AuthContext::api_key("k&1"), &request(&extras)).unwrap();
        assert_eq!(outcome.query, Some(("api_key", "k&1".to_owned())));
        assert!(outcome.authorization.is_none());

        let outcome = sign(&AuthContext::oauth2("t"), &request(&extras)).unwrap();
        assert_eq!(outcome.query, Some(("access_token", "t".to_owned())));
    }

    #[test]
    fn custom_signer_sees_request() {
        let extras: Extras = serde_json::from_str(r#"{"session":"s1"}"#).unwrap();
        let ctx = AuthContext::custom(|req: &SigningRequest<'_>| -> Result<String, BoxError> {
            let session = req.extras.get("session").and_then(Value::as_str).unwrap_or("-");
            Ok(format!("Custom {} {} {session}", req.method, req.url))
        });
        let outcome = sign(&ctx, &request(&extras)).unwrap();
        assert_eq!(
            outcome.authorization.as_deref(),
            Some("Custom get https://api.example.com/user?page=1 s1")
        );
    }

    #[test]
    #[traced_test]
    fn failing_custom_signer_degrades_to_marker() {
        let extras = Extras::new();
        let ctx = AuthContext::custom(|_: &SigningRequest<'_>| -> Result<String, BoxError> {
            Err("boom".into())
        });
        let outcome = sign(&ctx, &request(&extras)).unwrap();
        assert_eq!(outcome.authorization.as_deref(), Some(CUSTOM_SIGNER_FAILURE));
        assert!(logs_contain("custom signer failed"));
    }

    #[test]
    fn oauth1_header_has_every_protocol_parameter() {
        let extras = Extras::new();
        let ctx = AuthContext::OAuth1(OAuth1Credentials::new("ck", "cs").with_token("tok", "ts"));
        let header = sign(&ctx, &request(&extras).with_nonce_length(24))
            .unwrap()
            .authorization
            .unwrap();

        assert!(header.starts_with("OAuth oauth_token=\"tok\""));
        for key in [
            "oauth_version=\"1.0\"",
            "oauth_consumer_key=\"ck\"",
            "oauth_signature_method=\"HMAC-SHA1\"",
            "oauth_nonce=\"",
            "oauth_timestamp=\"",
            "oauth_signature=\"",
        ] {
            assert!(header.contains(key), "missing {key} in {header}");
        }
        let nonce = header
            .split("oauth_nonce=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        assert_eq!(nonce.len(), 24);
    }

    #[test]
    fn oauth1_extras_override_token() {
        let extras: Extras =
            serde_json::from_str(r#"{"access_token":"session-tok","access_token_secret":"s"}"#)
                .unwrap();
        let ctx = AuthContext::OAuth1(OAuth1Credentials::new("ck", "cs").with_token("tok", "ts"));
        let header = sign(&ctx, &request(&extras)).unwrap().authorization.unwrap();
        assert!(header.contains("oauth_token=\"session-tok\""));
    }
}
