#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Request signing for routekit clients.
//!
//! An [`AuthContext`] describes how outgoing requests are authenticated.
//! [`sign`] turns a context plus a [`SigningRequest`] into an [`AuthOutcome`]:
//! either an `Authorization` header value or a query parameter to append.
//!
//! Supported schemes:
//! - HTTP Basic (`basic`) and the `user/token` variant (`token`)
//! - Query-string keys (`apikey`) and `OAuth2` bearer tokens passed as
//!   `access_token` (`oauth`)
//! - `OAuth1` request signing (`xauth`) with `HMAC-SHA1` or `PLAINTEXT`
//! - Caller supplied signers (`custom`)
//!
//! # Example
//!
//! ```ignore
//! use routekit_auth::{AuthContext, SigningRequest, sign};
//!
//! let ctx: AuthContext = serde_json::from_value(serde_json::json!({
//!     "type": "basic",
//!     "username": "octocat",
//!     "password": "hunter2",
//! }))?;
//! ctx.validate()?;
//!
//! let extras = serde_json::Map::new();
//! let outcome = sign(&ctx, &SigningRequest::new("GET", "https://api.example.com/user", &extras))?;
//! assert!(outcome.authorization.unwrap().starts_with("Basic "));
//! ```

mod context;
pub mod encoding;
mod error;
pub mod oauth1;
mod secret;
mod sign;

pub use context::{AuthContext, BoxError, CustomSigner};
pub use error::AuthError;
pub use oauth1::{OAuth1Credentials, SignatureMethod, Stamp};
pub use secret::SecretString;
pub use sign::{
    AuthOutcome, CUSTOM_SIGNER_FAILURE, DEFAULT_NONCE_LENGTH, Extras, SigningRequest, sign,
};
