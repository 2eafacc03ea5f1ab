//! Percent-encoding and URL normalization helpers used by the signers and by
//! the request builder.
//!
//! Two encoders are provided:
//! - [`encode`] follows RFC 3986 strictly: only unreserved characters
//!   (`A-Z a-z 0-9 - . _ ~`) are left literal. This is the encoding `OAuth1`
//!   base strings require (RFC 5849 §3.6).
//! - [`encode_uri_component`] additionally leaves `! ' ( ) *` literal, which is
//!   what most REST servers expect for path segments and query values.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

const RFC3986_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const URI_COMPONENT: &AsciiSet = &RFC3986_UNRESERVED
    .remove(b'!')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*');

/// Percent-encode per RFC 3986 (`!` -> `%21`, `'` -> `%27`, `(` -> `%28`,
/// `)` -> `%29`, `*` -> `%2A`).
#[must_use]
pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, RFC3986_UNRESERVED).to_string()
}

/// Percent-encode a single URI component, leaving `! ' ( ) *` untouched.
#[must_use]
pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Strip the query string (and fragment) from a URL.
#[must_use]
pub fn normalize_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Extract the query parameters already present on a URL, percent-decoded.
///
/// Segments without `=` yield an empty value; empty segments are skipped.
#[must_use]
pub fn query_params(url: &str) -> Vec<(String, String)> {
    let Some((_, rest)) = url.split_once('?') else {
        return Vec::new();
    };
    let query = rest.split_once('#').map_or(rest, |(q, _)| q);

    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            (decode(key), decode(value))
        })
        .collect()
}

/// Build the normalized parameter string of RFC 5849 §3.4.1.3.2: every name
/// and value encoded, pairs sorted by name then value, joined with `&`.
#[must_use]
pub fn normalize_params(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn encode_escapes_rfc3986_reserved_extras() {
        assert_eq!(encode("a b!'()*"), "a%20b%21%27%28%29%2A");
    }

    #[test]
    fn encode_uri_component_keeps_sub_delims() {
        assert_eq!(encode_uri_component("a b!'()*"), "a%20b!'()*");
        assert_eq!(encode_uri_component("x/y?z=1&w"), "x%2Fy%3Fz%3D1%26w");
    }

    #[test]
    fn encoders_leave_unreserved_alone() {
        let unreserved = "AZaz09-._~";
        assert_eq!(encode(unreserved), unreserved);
        assert_eq!(encode_uri_component(unreserved), unreserved);
    }

    #[test]
    fn encode_handles_utf8() {
        assert_eq!(encode("é"), "%C3%A9");
    }

    #[test]
    fn normalize_url_strips_query_and_fragment() {
        assert_eq!(
            normalize_url("https://x.test/a/b?page=2#top"),
            "https://x.test/a/b"
        );
        assert_eq!(normalize_url("https://x.test/a"), "https://x.test/a");
    }

    #[test]
    fn query_params_are_decoded() {
        let params = query_params("https://x.test/?q=a%20b&flag&&page=2");
        assert_eq!(
            params,
            vec![
                ("q".to_owned(), "a b".to_owned()),
                ("flag".to_owned(), String::new()),
                ("page".to_owned(), "2".to_owned()),
            ]
        );
        assert!(query_params("https://x.test/").is_empty());
    }

    #[test]
    fn normalize_params_sorts_by_name_then_value() {
        let params = vec![
            ("b".to_owned(), "2".to_owned()),
            ("a".to_owned(), "z".to_owned()),
            ("a".to_owned(), "y".to_owned()),
            ("c d".to_owned(), "!".to_owned()),
        ];
        assert_eq!(normalize_params(&params), "a=y&a=z&b=2&c%20d=%21");
    }
}
