#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! REST clients generated from declarative route tables.
//!
//! A route table (JSON) describes every endpoint of an API: HTTP method,
//! URL template and parameter schema. This crate turns it into callable,
//! validated and authenticated operations:
//!
//! - [`RouteTable`] loads the table, resolving it into endpoint and group nodes
//! - [`compile`] flattens it into an [`EndpointTable`], checking that every
//!   endpoint has a [`Handler`] registered
//! - [`ResolvedSchema::validate`] trims and coerces caller parameters
//! - [`build`] creates the [`RequestSpec`] (URL, query or body, headers,
//!   signing through [`routekit_auth`])
//! - a [`Transport`] sends it; [`HyperTransport`] is the default
//! - [`parse_links`] reads `Link` pagination headers
//!
//! [`Client`] ties these together.
//!
//! # Example
//!
//! ```ignore
//! use routekit::{Client, ClientConfig, RouteTable};
//! use serde_json::json;
//!
//! let routes = RouteTable::from_path("github-v3.json")?;
//! let client = Client::builder(ClientConfig::default()).routes(routes).build()?;
//!
//! let repo = client
//!     .call("repos", "get", serde_json::from_value(json!({ "user": "d1b1", "repo": "x" }))?)
//!     .await?;
//! println!("{}", repo.data["full_name"]);
//! ```

mod builder;
mod client;
mod compiler;
mod config;
mod error;
pub mod pagination;
mod params;
mod request;
mod response;
mod schema;
mod transport;

pub use builder::{BuildInput, HeaderHook, build};
pub use client::{Client, ClientBuilder, SectionApi};
pub use compiler::{
    Call, CompiledEndpoint, EndpointKey, EndpointTable, Handler, HandlerRegistry, SendHandler,
    compile,
};
pub use config::{ClientConfig, DEFAULT_PROXY_PORT, DEFAULT_USER_AGENT, ProxyConfig};
pub use error::{BuildError, ClientError, ConfigError, MissingHandler, MissingKind, ValidationError};
pub use pagination::{
    LinkSource, PageLinks, Relation, has_first_page, has_last_page, has_next_page,
    has_previous_page, parse_links,
};
pub use params::{INVALID_DATE, ParamError, ResolvedParam, ResolvedSchema, validate};
pub use request::{Body, FilePart, MultipartBody, RequestSpec};
pub use response::{ApiResponse, ResponseMeta, classify};
pub use schema::{
    Constants, EndpointSpec, Message, ParamDef, ParamEntry, ParamSchema, ParamSlot, ParamType,
    RequestFormat, RouteNode, RouteTable, SharedDefines,
};
pub use transport::{HyperTransport, RawResponse, Transport, TransportError};

pub use routekit_auth::{AuthContext, AuthError, Extras};
