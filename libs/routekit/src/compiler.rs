//! Route compilation: route tree plus handler registry to a flat endpoint table.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use heck::ToLowerCamelCase;
use routekit_auth::Extras;

use crate::client::Client;
use crate::error::{ClientError, ConfigError, MissingHandler, MissingKind};
use crate::params::ResolvedSchema;
use crate::response::ApiResponse;
use crate::schema::{EndpointSpec, Message, RouteNode, RouteTable};

/// `(section, operation)` name of a compiled endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointKey {
    pub section: String,
    pub operation: String,
}

impl EndpointKey {
    #[must_use]
    pub fn new(section: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            operation: operation.into(),
        }
    }

    /// Section from the first key, operation from the remaining keys joined
    /// with `-`, both in lower camel case.
    #[must_use]
    pub fn from_path(path: &[&str]) -> Self {
        let section = path
            .first()
            .map(|s| s.to_lowercase().to_lower_camel_case())
            .unwrap_or_default();
        let operation = path.get(1..).unwrap_or_default().join("-").to_lower_camel_case();
        Self { section, operation }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.operation)
    }
}

/// A validated invocation, handed to a [`Handler`].
pub struct Call<'a> {
    pub client: &'a Client,
    pub endpoint: &'a CompiledEndpoint,
    pub message: Message,
    pub extras: Extras,
}

/// Implementation of one endpoint.
#[async_trait]
pub trait Handler: Send + Sync {
    /// # Errors
    ///
    /// Returns the [`ClientError`] of the failed exchange.
    async fn handle(&self, call: Call<'_>) -> Result<ApiResponse, ClientError>;
}

/// Build, sign, send and classify: what nearly every endpoint does.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendHandler;

#[async_trait]
impl Handler for SendHandler {
    async fn handle(&self, call: Call<'_>) -> Result<ApiResponse, ClientError> {
        call.client
            .send(call.endpoint, &call.message, &call.extras)
            .await
    }
}

/// Handlers by section and operation.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    sections: HashMap<String, HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// [`SendHandler`] for every `(section, child)` pair of the first two
    /// levels of `table`.
    #[must_use]
    pub fn standard(table: &RouteTable) -> Self {
        let handler: Arc<dyn Handler> = Arc::new(SendHandler);
        let mut registry = Self::new();
        for (section, node) in &table.sections {
            let RouteNode::Group(children) = node else {
                continue;
            };
            for (child, _) in children {
                let key = EndpointKey::from_path(&[section.as_str(), child.as_str()]);
                registry.insert(key, Arc::clone(&handler));
            }
        }
        registry
    }

    /// Register `handler` for `section.operation`, replacing any previous one.
    pub fn register(
        &mut self,
        section: impl Into<String>,
        operation: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> &mut Self {
        self.insert(EndpointKey::new(section, operation), Arc::new(handler));
        self
    }

    fn insert(&mut self, key: EndpointKey, handler: Arc<dyn Handler>) {
        self.sections
            .entry(key.section)
            .or_default()
            .insert(key.operation, handler);
    }

    fn lookup(&self, key: &EndpointKey) -> Result<Arc<dyn Handler>, MissingKind> {
        let operations = self.sections.get(&key.section).ok_or(MissingKind::Section)?;
        operations
            .get(&key.operation)
            .cloned()
            .ok_or(MissingKind::Operation)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .sections
            .iter()
            .flat_map(|(s, ops)| ops.keys().map(move |o| format!("{s}.{o}")))
            .collect();
        keys.sort();
        f.debug_struct("HandlerRegistry").field("handlers", &keys).finish()
    }
}

/// An endpoint ready to be called.
pub struct CompiledEndpoint {
    pub key: EndpointKey,
    /// Slash-joined path of the route in the table.
    pub route: String,
    pub spec: EndpointSpec,
    pub params: ResolvedSchema,
    pub(crate) handler: Arc<dyn Handler>,
}

impl fmt::Debug for CompiledEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledEndpoint")
            .field("key", &self.key)
            .field("route", &self.route)
            .field("method", &self.spec.method)
            .field("url", &self.spec.url)
            .finish_non_exhaustive()
    }
}

/// Compiled endpoints by `(section, operation)`.
#[derive(Debug, Default)]
pub struct EndpointTable {
    endpoints: BTreeMap<EndpointKey, CompiledEndpoint>,
}

impl EndpointTable {
    #[must_use]
    pub fn get(&self, section: &str, operation: &str) -> Option<&CompiledEndpoint> {
        self.endpoints
            .get(&EndpointKey::new(section, operation))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledEndpoint> {
        self.endpoints.values()
    }

    /// Section names, sorted.
    #[must_use]
    pub fn sections(&self) -> Vec<&str> {
        let mut sections: Vec<&str> = self.endpoints.keys().map(|k| k.section.as_str()).collect();
        sections.dedup();
        sections
    }

    /// Operation names of `section`, sorted.
    #[must_use]
    pub fn operations(&self, section: &str) -> Vec<&str> {
        self.endpoints
            .keys()
            .filter(|k| k.section == section)
            .map(|k| k.operation.as_str())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Compile `table` against `registry`.
///
/// Every endpoint must have a handler; all missing ones are reported together.
///
/// # Errors
///
/// Returns [`ConfigError::Unimplemented`] listing the routes without handler,
/// [`ConfigError::DuplicateOperation`] when two routes share a name, and the
/// parameter resolution errors of [`ParamSchema::resolve`](crate::ParamSchema::resolve).
pub fn compile(table: &RouteTable, registry: &HandlerRegistry) -> Result<EndpointTable, ConfigError> {
    let mut endpoints: BTreeMap<EndpointKey, CompiledEndpoint> = BTreeMap::new();
    let mut missing = Vec::new();

    for (path, spec) in table.endpoints() {
        let route = path.join("/");
        let key = EndpointKey::from_path(&path);
        let params = spec.params.resolve(&table.defines, &route)?;

        let handler = match registry.lookup(&key) {
            Ok(handler) => handler,
            Err(kind) => {
                missing.push(MissingHandler {
                    route,
                    section: key.section,
                    operation: key.operation,
                    kind,
                });
                continue;
            }
        };

        if let Some(existing) = endpoints.get(&key) {
            return Err(ConfigError::DuplicateOperation {
                section: key.section,
                operation: key.operation,
                first: existing.route.clone(),
                second: route,
            });
        }

        endpoints.insert(
            key.clone(),
            CompiledEndpoint {
                key,
                route,
                spec: spec.clone(),
                params,
                handler,
            },
        );
    }

    if !missing.is_empty() {
        return Err(ConfigError::Unimplemented { missing });
    }

    tracing::debug!(endpoints = endpoints.len(), "compiled route table");
    Ok(EndpointTable { endpoints })
}
