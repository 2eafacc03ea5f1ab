//! Public-API tests for the signing engine: option parsing, scheme selection
//! and `OAuth1` determinism through the crate root exports.

use routekit_auth::encoding::encode;
use routekit_auth::oauth1::{base_string, signature};
use routekit_auth::{
    AuthContext, AuthError, Extras, OAuth1Credentials, SignatureMethod, SigningRequest, Stamp,
    sign,
};
use serde_json::json;

#[test]
fn authenticate_options_round_trip_to_headers() {
    let ctx = AuthContext::from_options(json!({
        "type": "basic",
        "username": "octocat",
        "password": "hunter2",
    }))
    .unwrap();

    let extras = Extras::new();
    let outcome = sign(
        &ctx,
        &SigningRequest::new("GET", "https://api.example.com/user", &extras),
    )
    .unwrap();

    assert_eq!(
        outcome.authorization.as_deref(),
        Some("Basic b2N0b2NhdDpodW50ZXIy")
    );
    assert!(outcome.query.is_none());
}

#[test]
fn xauth_without_consumer_key_is_rejected() {
    let err = AuthContext::from_options(json!({
        "type": "xauth",
        "consumer_key": "",
        "consumer_secret": "cs",
    }))
    .unwrap_err();
    assert!(matches!(
        err,
        AuthError::MissingCredential {
            scheme: "xauth",
            field: "consumer_key"
        }
    ));
}

#[test]
fn percent_encoding_differs_from_uri_component_encoding() {
    assert_eq!(encode("a b!'()*"), "a%20b%21%27%28%29%2A");
    assert_eq!(
        routekit_auth::encoding::encode_uri_component("a b!'()*"),
        "a%20b!'()*"
    );
}

#[test]
fn fixed_stamp_signature_is_reproducible() {
    let creds = OAuth1Credentials::new("ck", "cs").with_token("tok", "ts");
    let stamp = Stamp::fixed("abcdef0123456789", 1_700_000_000);
    let url = "https://api.example.com/repos/d1b1/x";

    let first = creds.authorization_header("GET", url, &stamp).unwrap();
    let second = creds.authorization_header("GET", url, &stamp).unwrap();
    assert_eq!(first, second);

    // Same value computed from the individual RFC 5849 building blocks.
    let params: Vec<(String, String)> = [
        ("oauth_token", "tok"),
        ("oauth_version", "1.0"),
        ("oauth_consumer_key", "ck"),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_nonce", "abcdef0123456789"),
        ("oauth_timestamp", "1700000000"),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
    .collect();
    let expected = signature(SignatureMethod::HmacSha1, "GET", url, &params, "cs", Some("ts"))
        .unwrap();
    assert_eq!(expected, "3UBjUV+Z3iGfN2SNPhGFQEf8vAs=");
    assert!(first.ends_with(&format!("oauth_signature=\"{}\"", encode(&expected))));

    assert!(base_string("GET", url, &params).starts_with("GET&https%3A%2F%2Fapi.example.com"));
}

#[test]
fn plaintext_method_is_honoured_in_header() {
    let creds = OAuth1Credentials::new("ck", "cs")
        .with_token("tok", "ts")
        .with_signature_method(SignatureMethod::Plaintext);
    let header = creds
        .authorization_header("POST", "https://x.test/", &Stamp::fixed("n", 1))
        .unwrap();
    assert!(header.contains("oauth_signature_method=\"PLAINTEXT\""));
    // "cs%26ts" is itself percent-encoded once more inside the header.
    assert!(header.ends_with("oauth_signature=\"cs%2526ts\""));
}
