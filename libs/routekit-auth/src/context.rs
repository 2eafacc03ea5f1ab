use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::AuthError;
use crate::oauth1::OAuth1Credentials;
use crate::secret::SecretString;
use crate::sign::SigningRequest;

/// Boxed error returned by custom signers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Caller supplied signing function.
///
/// Receives the outgoing request (method, full URL, per-call extras) and
/// returns the complete `Authorization` header value.
pub trait CustomSigner: Send + Sync {
    /// # Errors
    ///
    /// Any error is absorbed by the signing engine, which substitutes a
    /// marker header and lets the request proceed.
    fn sign(&self, request: &SigningRequest<'_>) -> Result<String, BoxError>;
}

impl<F> CustomSigner for F
where
    F: Fn(&SigningRequest<'_>) -> Result<String, BoxError> + Send + Sync,
{
    fn sign(&self, request: &SigningRequest<'_>) -> Result<String, BoxError> {
        self(request)
    }
}

/// How requests of a client are authenticated.
///
/// Deserializes from the option objects accepted by `authenticate`:
///
/// ```json
/// { "type": "basic",  "username": "u", "password": "p" }
/// { "type": "token",  "username": "u", "token": "t" }
/// { "type": "apikey", "api_key": "k" }
/// { "type": "oauth",  "token": "t" }
/// { "type": "xauth",  "consumer_key": "ck", "consumer_secret": "cs",
///   "token": "t", "token_secret": "ts" }
/// ```
///
/// [`AuthContext::Custom`] can only be built in code, see
/// [`AuthContext::custom`].
#[derive(Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthContext {
    #[default]
    #[serde(skip)]
    None,
    Basic {
        username: String,
        password: SecretString,
    },
    /// Sent as HTTP Basic with `username/token` as the user part.
    Token {
        username: String,
        token: SecretString,
    },
    #[serde(rename = "apikey")]
    ApiKey { api_key: SecretString },
    #[serde(rename = "oauth")]
    OAuth2 { token: SecretString },
    #[serde(rename = "xauth")]
    OAuth1(OAuth1Credentials),
    #[serde(skip)]
    Custom(Arc<dyn CustomSigner>),
}

impl AuthContext {
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn token(username: impl Into<String>, token: impl Into<SecretString>) -> Self {
        Self::Token {
            username: username.into(),
            token: token.into(),
        }
    }

    #[must_use]
    pub fn api_key(key: impl Into<SecretString>) -> Self {
        Self::ApiKey {
            api_key: key.into(),
        }
    }

    #[must_use]
    pub fn oauth2(token: impl Into<SecretString>) -> Self {
        Self::OAuth2 {
            token: token.into(),
        }
    }

    #[must_use]
    pub fn custom(signer: impl CustomSigner + 'static) -> Self {
        Self::Custom(Arc::new(signer))
    }

    /// Parse an `authenticate` option object.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidOptions`] for unknown `type` values or
    /// malformed fields, and the [`validate`](Self::validate) errors otherwise.
    pub fn from_options(options: serde_json::Value) -> Result<Self, AuthError> {
        let ctx: Self = serde_json::from_value(options)
            .map_err(|e| AuthError::InvalidOptions(e.to_string()))?;
        ctx.validate()?;
        Ok(ctx)
    }

    /// Short scheme name, matching the `type` tag of the options.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Token { .. } => "token",
            Self::ApiKey { .. } => "apikey",
            Self::OAuth2 { .. } => "oauth",
            Self::OAuth1(_) => "xauth",
            Self::Custom(_) => "custom",
        }
    }

    /// Check that the credentials the scheme needs are present.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredential`] naming the first empty field.
    pub fn validate(&self) -> Result<(), AuthError> {
        let missing = |field| {
            Err(AuthError::MissingCredential {
                scheme: self.kind(),
                field,
            })
        };

        match self {
            Self::None | Self::Custom(_) => Ok(()),
            Self::Basic { username, password } => {
                if username.is_empty() {
                    return missing("username");
                }
                if password.is_empty() {
                    return missing("password");
                }
                Ok(())
            }
            Self::Token { username, token } => {
                if username.is_empty() {
                    return missing("username");
                }
                if token.is_empty() {
                    return missing("token");
                }
                Ok(())
            }
            Self::ApiKey { api_key } if api_key.is_empty() => missing("api_key"),
            Self::OAuth2 { token } if token.is_empty() => missing("token"),
            Self::ApiKey { .. } | Self::OAuth2 { .. } => Ok(()),
            Self::OAuth1(creds) => {
                if creds.consumer_key.is_empty() {
                    return missing("consumer_key");
                }
                if creds.consumer_secret.is_empty() {
                    return missing("consumer_secret");
                }
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } | Self::Token { username, .. } => f
                .debug_struct(self.kind())
                .field("username", username)
                .finish_non_exhaustive(),
            Self::OAuth1(creds) => f.debug_tuple("xauth").field(creds).finish(),
            Self::ApiKey { .. } | Self::OAuth2 { .. } | Self::Custom(_) => {
                f.debug_struct(self.kind()).finish_non_exhaustive()
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_option_shape() {
        let cases = [
            (json!({"type": "basic", "username": "u", "password": "p"}), "basic"),
            (json!({"type": "token", "username": "u", "token": "t"}), "token"),
            (json!({"type": "apikey", "api_key": "k"}), "apikey"),
            (json!({"type": "oauth", "token": "t"}), "oauth"),
            (
                json!({"type": "xauth", "consumer_key": "ck", "consumer_secret": "cs"}),
                "xauth",
            ),
        ];
        for (options, kind) in cases {
            let ctx = AuthContext::from_options(options).unwrap();
            assert_eq!(ctx.kind(), kind);
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let err = AuthContext::from_options(json!({"type": "digest"})).unwrap_err();
        assert!(matches!(err, AuthError::InvalidOptions(_)), "{err}");
    }

    #[test]
    fn custom_cannot_be_deserialized() {
        let err = AuthContext::from_options(json!({"type": "custom"})).unwrap_err();
        assert!(matches!(err, AuthError::InvalidOptions(_)));
    }

    #[test]
    fn basic_requires_password() {
        let err = AuthContext::from_options(json!({"type": "basic", "username": "u", "password": ""}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "basic authentication requires password to be set"
        );
    }

    #[test]
    fn xauth_requires_consumer_secret() {
        let ctx = AuthContext::OAuth1(OAuth1Credentials::new("ck", ""));
        assert!(matches!(
            ctx.validate(),
            Err(AuthError::MissingCredential {
                field: "consumer_secret",
                ..
            })
        ));
    }

    #[test]
    fn oauth_requires_token() {
        assert!(AuthContext::oauth2("").validate().is_err());
        assert!(AuthContext::oauth2("t").validate().is_ok());
    }

    #[test]
    fn debug_never_prints_secrets() {
        let ctx = AuthContext::basic("octocat", "hunter2");
        let dbg = format!("{ctx:?}");
        assert!(dbg.contains("octocat"));
        assert!(!dbg.contains("hunter2"));

        let ctx = AuthContext::OAuth1(OAuth1Credentials::new("ck", "very-secret"));
        assert!(!format!("{ctx:?}").contains("very-secret"));
    }
}
