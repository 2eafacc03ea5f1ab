//! The I/O seam of the client.
//!
//! [`Transport`] sends one [`RequestSpec`] and returns the raw response.
//! [`HyperTransport`] is the production implementation; tests substitute
//! their own.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use thiserror::Error;

use crate::request::{Body, RequestSpec};

/// Boxed source error of transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(#[source] BoxError),

    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to read upload '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Status, headers and collected body of a response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange. HTTP error statuses are not errors here.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response could be obtained.
    async fn send(&self, request: RequestSpec) -> Result<RawResponse, TransportError>;
}

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// hyper client with rustls (webpki roots), speaking HTTP/1.1 and HTTP/2
/// over both `http` and `https`.
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
}

impl HyperTransport {
    /// # Errors
    ///
    /// Returns [`TransportError::Tls`] if the TLS connector cannot be set up.
    pub fn new() -> Result<Self, TransportError> {
        let provider = crypto_provider();
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider)
            .map_err(|e| TransportError::Tls(Box::new(e)))?
            .https_or_http()
            .enable_all_versions()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(https);

        Ok(Self { client })
    }

    async fn exchange(&self, request: RequestSpec) -> Result<RawResponse, TransportError> {
        let RequestSpec {
            method,
            url,
            mut headers,
            body,
            ..
        } = request;

        let payload = match body {
            Body::Empty => Bytes::new(),
            Body::Text(text) => Bytes::from(text),
            Body::Multipart(form) => {
                let encoded = form
                    .encode()
                    .await
                    .map_err(|(path, source)| TransportError::File { path, source })?;
                headers.insert(CONTENT_LENGTH, HeaderValue::from(encoded.len()));
                if !headers.contains_key(CONTENT_TYPE) {
                    let content_type = HeaderValue::from_str(&form.content_type())
                        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                    headers.insert(CONTENT_TYPE, content_type);
                }
                Bytes::from(encoded)
            }
        };

        let uri: http::Uri = url
            .parse()
            .map_err(|e: http::uri::InvalidUri| TransportError::InvalidRequest(e.to_string()))?;

        let mut req = http::Request::new(Full::new(payload));
        *req.method_mut() = method;
        *req.uri_mut() = uri;
        *req.headers_mut() = headers;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| TransportError::Connection(Box::new(e)))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TransportError::Connection(Box::new(e)))?
            .to_bytes();

        Ok(RawResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: RequestSpec) -> Result<RawResponse, TransportError> {
        match request.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(request))
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => self.exchange(request).await,
        }
    }
}

/// Use the process-wide rustls provider if one is installed, aws-lc-rs otherwise.
fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::Method;
    use httpmock::prelude::*;

    fn spec(method: Method, url: String, body: Body) -> RequestSpec {
        RequestSpec {
            method,
            url,
            headers: HeaderMap::new(),
            body,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn returns_error_statuses_as_responses() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("{\"message\":\"Not Found\"}");
        });

        let transport = HyperTransport::new().unwrap();
        let response = transport
            .send(spec(Method::GET, server.url("/missing"), Body::Empty))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(&response.body[..], b"{\"message\":\"Not Found\"}");
        mock.assert();
    }

    #[tokio::test]
    async fn sends_text_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/items").body("a=1&b=2");
            then.status(201).body("{}");
        });

        let transport = HyperTransport::new().unwrap();
        let response = transport
            .send(spec(Method::POST, server.url("/items"), Body::Text("a=1&b=2".into())))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        mock.assert();
    }

    #[tokio::test]
    async fn enforces_timeout() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_millis(500));
        });

        let transport = HyperTransport::new().unwrap();
        let mut request = spec(Method::GET, server.url("/slow"), Body::Empty);
        request.timeout = Some(Duration::from_millis(50));

        let err = transport.send(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)), "{err}");
    }

    #[tokio::test]
    async fn connection_refused_is_a_connection_error() {
        let transport = HyperTransport::new().unwrap();
        let err = transport
            .send(spec(Method::GET, "http://127.0.0.1:1/".into(), Body::Empty))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)), "{err}");
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_sending() {
        let transport = HyperTransport::new().unwrap();
        let err = transport
            .send(spec(Method::GET, "not a url".into(), Body::Empty))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)), "{err}");
    }
}
