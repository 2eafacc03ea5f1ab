//! Route table model.
//!
//! A route table is a JSON document: an optional `defines` block with shared
//! constants and parameter definitions, followed by sections of (possibly
//! nested) endpoint definitions. Any object carrying both `url` and `params`
//! is an endpoint; every other object is a group of further nodes.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use http::Method;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Caller supplied parameters of one call.
pub type Message = Map<String, Value>;

/// How parameters of a method with a body are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestFormat {
    /// JSON object body.
    Json,
    /// `application/x-www-form-urlencoded` body.
    #[serde(alias = "form")]
    Query,
}

/// Declared type of a parameter. Drives coercion during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Float,
    Json,
    Date,
    File,
    /// Unknown type names are kept and applied without coercion.
    Other(String),
}

impl FromStr for ParamType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "float" => Self::Float,
            "json" => Self::Json,
            "date" => Self::Date,
            "file" => Self::File,
            _ => Self::Other(s.to_owned()),
        })
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Float => "float",
            Self::Json => "json",
            Self::Date => "date",
            Self::File => "file",
            Self::Other(name) => name,
        })
    }
}

impl<'de> Deserialize<'de> for ParamType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        let Ok(kind) = name.parse::<Self>();
        Ok(kind)
    }
}

/// Constraints of a single parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ParamDef {
    #[serde(default, rename = "type")]
    pub kind: Option<ParamType>,
    #[serde(default)]
    pub required: bool,
    /// Regex source; an empty string means no pattern.
    #[serde(default, deserialize_with = "non_empty_string")]
    pub validation: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ParamDef {
    #[must_use]
    pub fn of_type(kind: ParamType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, pattern: impl Into<String>) -> Self {
        self.validation = Some(pattern.into());
        self
    }
}

fn non_empty_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Where the definition of a declared parameter comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamEntry {
    Inline(ParamDef),
    /// Reference to `defines.params[name]`.
    Alias(String),
}

/// A declared parameter: the message field it reads, and its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSlot {
    pub name: String,
    pub entry: ParamEntry,
}

/// Ordered parameter declarations of an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSchema {
    slots: Vec<ParamSlot>,
}

impl ParamSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` with an inline definition.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, def: ParamDef) -> Self {
        self.push(name, ParamEntry::Inline(def));
        self
    }

    /// Declare `name` as a reference to a shared definition of the same name.
    #[must_use]
    pub fn with_alias(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.push(name.clone(), ParamEntry::Alias(name));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, entry: ParamEntry) {
        self.slots.push(ParamSlot {
            name: name.into(),
            entry,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamSlot> {
        self.slots.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn from_json(route: &str, params: &Map<String, Value>) -> Result<Self, ConfigError> {
        let mut schema = Self::new();
        for (key, value) in params {
            if let Some(name) = key.strip_prefix('$') {
                schema.push(name, ParamEntry::Alias(name.to_owned()));
                continue;
            }
            let entry = match value {
                Value::String(alias) => {
                    ParamEntry::Alias(alias.strip_prefix('$').unwrap_or(alias).to_owned())
                }
                Value::Null => ParamEntry::Inline(ParamDef::default()),
                Value::Object(_) => {
                    let def = ParamDef::deserialize(value).map_err(|e| {
                        ConfigError::InvalidRouteTable {
                            route: format!("{route}/params/{key}"),
                            reason: e.to_string(),
                        }
                    })?;
                    ParamEntry::Inline(def)
                }
                other => {
                    return Err(ConfigError::InvalidRouteTable {
                        route: format!("{route}/params/{key}"),
                        reason: format!("expected a definition object or \"$alias\", got {other}"),
                    });
                }
            };
            schema.push(key.clone(), entry);
        }
        Ok(schema)
    }
}

/// A callable endpoint definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Path template with `:name` placeholders.
    pub url: String,
    pub method: Method,
    pub params: ParamSchema,
    /// Overrides `defines.constants.requestFormat`.
    pub request_format: Option<RequestFormat>,
    pub description: Option<String>,
}

impl EndpointSpec {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            params: ParamSchema::new(),
            request_format: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: ParamSchema) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_request_format(mut self, format: RequestFormat) -> Self {
        self.request_format = Some(format);
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEndpoint {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Map<String, Value>>,
    #[serde(default)]
    request_format: Option<RequestFormat>,
    #[serde(default)]
    description: Option<String>,
}

impl EndpointSpec {
    fn from_json(route: &str, value: &Value) -> Result<Self, ConfigError> {
        let raw = RawEndpoint::deserialize(value).map_err(|e| ConfigError::InvalidRouteTable {
            route: route.to_owned(),
            reason: e.to_string(),
        })?;
        let method_name = raw.method.unwrap_or_else(|| "GET".to_owned());
        let method = Method::from_bytes(method_name.to_ascii_uppercase().as_bytes()).map_err(|_| {
            ConfigError::InvalidMethod {
                route: route.to_owned(),
                method: method_name.clone(),
            }
        })?;
        let params = match raw.params {
            Some(params) => ParamSchema::from_json(route, &params)?,
            None => ParamSchema::new(),
        };
        Ok(Self {
            url: raw.url,
            method,
            params,
            request_format: raw.request_format,
            description: raw.description,
        })
    }
}

/// A node of the route tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteNode {
    Endpoint(EndpointSpec),
    Group(Vec<(String, RouteNode)>),
}

impl RouteNode {
    fn from_json(route: &str, map: &Map<String, Value>) -> Result<Self, ConfigError> {
        if map.contains_key("url") && map.contains_key("params") {
            return EndpointSpec::from_json(route, &Value::Object(map.clone())).map(Self::Endpoint);
        }
        let mut children = Vec::with_capacity(map.len());
        for (key, value) in map {
            let path = format!("{route}/{key}");
            match value {
                Value::Object(child) => children.push((key.clone(), Self::from_json(&path, child)?)),
                _ => tracing::warn!(route = %path, "skipping non-object route node"),
            }
        }
        Ok(Self::Group(children))
    }
}

/// Values shared by every endpoint of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constants {
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub request_format: Option<RequestFormat>,
}

/// The `defines` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SharedDefines {
    #[serde(default)]
    pub constants: Constants,
    #[serde(default)]
    pub params: HashMap<String, ParamDef>,
}

/// A parsed route table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    pub defines: SharedDefines,
    /// Top-level sections in document order.
    pub sections: Vec<(String, RouteNode)>,
}

impl RouteTable {
    /// Parse a route table from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and the
    /// [`from_value`](Self::from_value) errors otherwise.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Read and parse a route file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Build a route table from an already parsed JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRouteTable`] when the document is not an
    /// object or a definition is malformed, and [`ConfigError::InvalidMethod`]
    /// for unknown HTTP methods.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let Value::Object(root) = value else {
            return Err(ConfigError::InvalidRouteTable {
                route: String::new(),
                reason: "route table must be a JSON object".to_owned(),
            });
        };

        let mut table = Self::default();
        for (key, value) in root {
            if key == "defines" {
                table.defines =
                    SharedDefines::deserialize(value).map_err(|e| ConfigError::InvalidRouteTable {
                        route: "defines".to_owned(),
                        reason: e.to_string(),
                    })?;
                continue;
            }
            match value {
                Value::Object(map) => table
                    .sections
                    .push((key.clone(), RouteNode::from_json(key, map)?)),
                _ => tracing::warn!(route = %key, "skipping non-object route section"),
            }
        }
        Ok(table)
    }

    /// Every endpoint with the path of keys leading to it, depth first.
    #[must_use]
    pub fn endpoints(&self) -> Vec<(Vec<&str>, &EndpointSpec)> {
        fn walk<'a>(
            path: &mut Vec<&'a str>,
            nodes: &'a [(String, RouteNode)],
            out: &mut Vec<(Vec<&'a str>, &'a EndpointSpec)>,
        ) {
            for (key, node) in nodes {
                path.push(key);
                match node {
                    RouteNode::Endpoint(spec) => out.push((path.clone(), spec)),
                    RouteNode::Group(children) => walk(path, children, out),
                }
                path.pop();
            }
        }

        let mut out = Vec::new();
        walk(&mut Vec::new(), &self.sections, &mut out);
        out
    }
}
