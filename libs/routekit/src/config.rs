use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

/// Default User-Agent string for requests
pub const DEFAULT_USER_AGENT: &str = concat!("routekit/", env!("CARGO_PKG_VERSION"));

/// Port used when a proxy is configured without one
pub const DEFAULT_PROXY_PORT: u16 = 3128;

/// Client configuration.
///
/// Every connection field is optional and falls back to the route table
/// `defines.constants`, then to protocol defaults.
///
/// ```json
/// {
///   "version": "3.0.0",
///   "host": "api.example.com",
///   "path_prefix": "/api/v3",
///   "timeout": "5s",
///   "proxy": { "host": "proxy.internal" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API version the route table describes. Informational.
    pub version: Option<String>,

    /// `http` or `https`
    pub protocol: Option<String>,

    pub host: Option<String>,

    pub port: Option<u16>,

    /// Prepended to every endpoint path.
    #[serde(alias = "pathPrefix")]
    pub path_prefix: Option<String>,

    pub proxy: Option<ProxyConfig>,

    /// Request timeout; a humantime string (`"5s"`) or milliseconds.
    #[serde(deserialize_with = "optional_duration")]
    pub timeout: Option<Duration>,

    /// Value of the `user-agent` header (default: `routekit/<version>`)
    #[serde(alias = "userAgent")]
    pub user_agent: String,

    /// Length of generated `OAuth1` nonces (default: 16)
    #[serde(alias = "nonceLength")]
    pub nonce_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: None,
            protocol: None,
            host: None,
            port: None,
            path_prefix: None,
            proxy: None,
            timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            nonce_length: routekit_auth::DEFAULT_NONCE_LENGTH,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Forward proxy all requests are sent through.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

fn default_proxy_port() -> u16 {
    DEFAULT_PROXY_PORT
}

fn optional_duration<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct V;

    impl<'de2> Visitor<'de2> for V {
        type Value = Option<Duration>;

        fn expecting(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
            fmt.write_str("a duration string or a number of milliseconds")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2: Deserializer<'de2>>(self, d: D2) -> Result<Self::Value, D2::Error> {
            d.deserialize_any(self)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(Duration::from_millis(v)))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v)
                .map(|ms| Some(Duration::from_millis(ms)))
                .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    d.deserialize_option(V)
}
