use std::fmt;
use std::path::PathBuf;

use http::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::transport::TransportError;

/// Which part of a `(section, operation)` lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingKind {
    /// No handler at all is registered for the section.
    Section,
    /// The section exists but lacks the operation.
    Operation,
}

/// A route whose handler is not implemented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingHandler {
    /// Slash-joined path of the route in the table (`repos/get`).
    pub route: String,
    pub section: String,
    pub operation: String,
    pub kind: MissingKind,
}

impl fmt::Display for MissingHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MissingKind::Section => write!(
                f,
                "unsupported route section '{}' for route '{}'",
                self.section, self.route
            ),
            MissingKind::Operation => write!(
                f,
                "unsupported route '{}.{}' for route '{}'",
                self.section, self.operation, self.route
            ),
        }
    }
}

/// Fatal route table problems, raised while loading or compiling.
///
/// A client is never built from a route table that produces one of these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read route file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("route table is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid route table at '{route}': {reason}")]
    InvalidRouteTable { route: String, reason: String },

    #[error("invalid HTTP method '{method}' for route '{route}'")]
    InvalidMethod { route: String, method: String },

    #[error(
        "invalid variable parameter name substitution; param '{param}' of route '{route}' not found in defines block"
    )]
    UnresolvedAlias { route: String, param: String },

    #[error("invalid validation pattern for parameter '{param}' of route '{route}': {source}")]
    InvalidPattern {
        route: String,
        param: String,
        #[source]
        source: regex::Error,
    },

    #[error("routes '{first}' and '{second}' both compile to '{section}.{operation}'")]
    DuplicateOperation {
        section: String,
        operation: String,
        first: String,
        second: String,
    },

    #[error("{} route(s) not implemented: {}", missing.len(), join_missing(missing))]
    Unimplemented { missing: Vec<MissingHandler> },

    #[error("no route table configured")]
    MissingRoutes,

    #[error("failed to initialise transport: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid initial authentication: {0}")]
    Auth(#[from] routekit_auth::AuthError),
}

fn join_missing(missing: &[MissingHandler]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Caller supplied parameters that do not satisfy the endpoint schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("Empty value for parameter '{param}'")]
    EmptyRequired { param: String },

    #[error("Invalid value for parameter '{param}': {value}")]
    PatternMismatch { param: String, value: String },

    #[error("Invalid value for parameter '{param}': {value} is NaN")]
    NotANumber { param: String, value: String },

    #[error("JSON parse error of value for parameter '{param}': {value}")]
    InvalidJson { param: String, value: String },
}

impl ValidationError {
    /// Name of the offending parameter.
    #[must_use]
    pub fn param(&self) -> &str {
        match self {
            Self::EmptyRequired { param }
            | Self::PatternMismatch { param, .. }
            | Self::NotANumber { param, .. }
            | Self::InvalidJson { param, .. } => param,
        }
    }
}

/// Failures while turning a validated message into a [`RequestSpec`](crate::RequestSpec).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("no host configured (set it in the client config or the route table constants)")]
    MissingHost,

    #[error("invalid value for header '{name}': {source}")]
    InvalidHeader {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },

    #[error("file parameter '{param}' must be a path or an object of paths")]
    InvalidFile { param: String },

    #[error("invalid page URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Auth(#[from] routekit_auth::AuthError),

    #[error("failed to serialize request body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error returned by every endpoint call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The server answered with a 4xx/5xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    /// The response body was not valid JSON.
    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A pagination relation was requested that the response does not have.
    #[error("{0}")]
    NotFound(String),

    #[error("unknown operation '{section}.{operation}'")]
    UnknownOperation { section: String, operation: String },

    #[error("failed to build request: {0}")]
    Build(#[from] BuildError),
}

impl ClientError {
    /// HTTP status for [`ClientError::Http`].
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Error payload: the HTTP error body parsed as JSON when possible, the
    /// raw body otherwise, or the message of any other error.
    #[must_use]
    pub fn data(&self) -> Value {
        match self {
            Self::Http { body, .. } => {
                serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.clone()))
            }
            other => Value::String(other.to_string()),
        }
    }
}
