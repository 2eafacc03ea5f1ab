use http::HeaderMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::ClientError;
use crate::transport::RawResponse;

/// Response headers surfaced alongside the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseMeta {
    #[serde(rename = "x-ratelimit-limit", skip_serializing_if = "Option::is_none")]
    pub rate_limit_limit: Option<String>,
    #[serde(rename = "x-ratelimit-remaining", skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<String>,
    #[serde(rename = "x-oauth-scopes", skip_serializing_if = "Option::is_none")]
    pub oauth_scopes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl ResponseMeta {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        Self {
            rate_limit_limit: get("x-ratelimit-limit"),
            rate_limit_remaining: get("x-ratelimit-remaining"),
            oauth_scopes: get("x-oauth-scopes"),
            link: get("link"),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Successful endpoint response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub data: Value,
    pub meta: ResponseMeta,
}

impl ApiResponse {
    /// The body with the meta headers attached under a `meta` key, when the
    /// body is a JSON object and any meta header was present.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self.data {
            Value::Object(mut map) if !self.meta.is_empty() => {
                map.insert(
                    "meta".to_owned(),
                    serde_json::to_value(&self.meta).unwrap_or_default(),
                );
                Value::Object(map)
            }
            other => other,
        }
    }
}

/// Map a raw response onto the call outcome.
///
/// # Errors
///
/// Returns [`ClientError::Http`] for 4xx/5xx statuses and
/// [`ClientError::InternalServerError`] for bodies that are not JSON.
pub fn classify(raw: RawResponse) -> Result<ApiResponse, ClientError> {
    let status = raw.status;
    let body = String::from_utf8_lossy(&raw.body);

    if status.is_client_error() || status.is_server_error() {
        tracing::debug!(status = status.as_u16(), "request failed");
        return Err(ClientError::Http {
            status,
            body: body.into_owned(),
        });
    }

    let data = if body.trim().is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        match serde_json::from_str(&body) {
            Ok(Value::Null) => Value::Object(serde_json::Map::new()),
            Ok(value) => value,
            Err(e) => return Err(ClientError::InternalServerError(e.to_string())),
        }
    };

    Ok(ApiResponse {
        data,
        meta: ResponseMeta::from_headers(&raw.headers),
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderValue, StatusCode};
    use serde_json::json;

    fn raw(status: u16, body: &'static str) -> RawResponse {
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn error_statuses_carry_body() {
        for status in [400, 404, 500, 503] {
            let err = classify(raw(status, "{\"message\":\"nope\"}")).unwrap_err();
            assert_eq!(err.status().map(|s| s.as_u16()), Some(status));
            assert_eq!(err.data(), json!({"message": "nope"}));
        }
    }

    #[test]
    fn success_parses_json_and_meta() {
        let mut response = raw(200, "[1,2]");
        response
            .headers
            .insert("x-ratelimit-remaining", HeaderValue::from_static("59"));
        response
            .headers
            .insert("link", HeaderValue::from_static("<https://x/?page=2>; rel=\"next\""));
        let ok = classify(response).unwrap();
        assert_eq!(ok.data, json!([1, 2]));
        assert_eq!(ok.meta.rate_limit_remaining.as_deref(), Some("59"));
        assert!(ok.meta.link.is_some());
        assert!(ok.meta.rate_limit_limit.is_none());
    }

    #[test]
    fn empty_or_null_body_becomes_object() {
        assert_eq!(classify(raw(204, "")).unwrap().data, json!({}));
        assert_eq!(classify(raw(200, "null")).unwrap().data, json!({}));
    }

    #[test]
    fn invalid_json_is_internal_server_error() {
        let err = classify(raw(200, "<html>")).unwrap_err();
        assert!(matches!(err, ClientError::InternalServerError(_)));
    }

    #[test]
    fn into_value_attaches_meta() {
        let response = ApiResponse {
            data: json!({"id": 1}),
            meta: ResponseMeta {
                oauth_scopes: Some("repo".into()),
                ..ResponseMeta::default()
            },
        };
        assert_eq!(
            response.into_value(),
            json!({"id": 1, "meta": {"x-oauth-scopes": "repo"}})
        );

        let response = ApiResponse {
            data: json!({"id": 1}),
            meta: ResponseMeta::default(),
        };
        assert_eq!(response.into_value(), json!({"id": 1}));
    }
}
