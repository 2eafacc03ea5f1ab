use std::sync::Arc;

use arc_swap::ArcSwap;
use http::{HeaderMap, Method};
use routekit_auth::{AuthContext, AuthError, Extras};
use serde_json::Value;
use url::Url;

use crate::builder::{self, BuildInput, HeaderHook};
use crate::compiler::{self, Call, CompiledEndpoint, EndpointTable, HandlerRegistry};
use crate::config::ClientConfig;
use crate::error::{BuildError, ClientError, ConfigError};
use crate::pagination::{LinkSource, Relation, parse_links};
use crate::params::ResolvedSchema;
use crate::request::RequestSpec;
use crate::response::{ApiResponse, classify};
use crate::schema::{Constants, EndpointSpec, Message, RouteTable};
use crate::transport::{HyperTransport, Transport};

/// A REST client generated from a route table.
///
/// Cheap to clone; clones share endpoints, transport and authentication.
///
/// ```ignore
/// let routes = RouteTable::from_path("routes.json")?;
/// let client = Client::builder(ClientConfig::default()).routes(routes).build()?;
///
/// client.authenticate(AuthContext::oauth2(token))?;
/// let repo = client
///     .call("repos", "get", message(json!({ "user": "d1b1", "repo": "x" })))
///     .await?;
/// if has_next_page(&repo) {
///     let more = client.get_next_page(&repo).await?;
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    constants: Constants,
    endpoints: EndpointTable,
    auth: ArcSwap<AuthContext>,
    transport: Arc<dyn Transport>,
    header_hook: Option<HeaderHook>,
}

impl Client {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn endpoints(&self) -> &EndpointTable {
        &self.inner.endpoints
    }

    /// View of the operations of one section.
    #[must_use]
    pub fn section<'a>(&'a self, name: &'a str) -> Option<SectionApi<'a>> {
        self.inner
            .endpoints
            .sections()
            .contains(&name)
            .then_some(SectionApi { client: self, name })
    }

    /// Replace the authentication used by subsequent requests.
    ///
    /// Requests already in flight keep the context they started with.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredential`] if `auth` lacks a field its
    /// scheme needs; the current context is kept in that case.
    pub fn authenticate(&self, auth: AuthContext) -> Result<(), AuthError> {
        auth.validate()?;
        tracing::debug!(scheme = auth.kind(), "authentication updated");
        self.inner.auth.store(Arc::new(auth));
        Ok(())
    }

    /// [`authenticate`](Self::authenticate) from an option object such as
    /// `{"type": "token", "username": "u", "token": "t"}`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidOptions`] for unparseable options.
    pub fn authenticate_with_options(&self, options: Value) -> Result<(), AuthError> {
        self.authenticate(AuthContext::from_options(options)?)
    }

    /// Current authentication context.
    #[must_use]
    pub fn auth(&self) -> Arc<AuthContext> {
        self.inner.auth.load_full()
    }

    /// Call `section.operation` with `message`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownOperation`] for names not in the
    /// endpoint table, [`ClientError::Validation`] without any I/O when the
    /// message is invalid, and the handler's error otherwise.
    pub async fn call(
        &self,
        section: &str,
        operation: &str,
        message: Message,
    ) -> Result<ApiResponse, ClientError> {
        self.call_with_extras(section, operation, message, Extras::new())
            .await
    }

    /// [`call`](Self::call) with per-call extras, which reach handlers and
    /// the signing engine (e.g. a session's `OAuth1` token pair).
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_with_extras(
        &self,
        section: &str,
        operation: &str,
        mut message: Message,
        extras: Extras,
    ) -> Result<ApiResponse, ClientError> {
        let endpoint = self.inner.endpoints.get(section, operation).ok_or_else(|| {
            ClientError::UnknownOperation {
                section: section.to_owned(),
                operation: operation.to_owned(),
            }
        })?;

        if let Err(e) = endpoint.params.validate(&mut message) {
            tracing::debug!(endpoint = %endpoint.key, error = %e, "rejected invalid parameters");
            return Err(e.into());
        }

        endpoint
            .handler
            .handle(Call {
                client: self,
                endpoint,
                message,
                extras,
            })
            .await
    }

    /// Build, sign, send and classify the request for `endpoint`.
    ///
    /// This is what [`SendHandler`](crate::SendHandler) does; custom handlers
    /// call it to wrap the standard exchange.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Build`], [`ClientError::Transport`] or the
    /// classification errors.
    pub async fn send(
        &self,
        endpoint: &CompiledEndpoint,
        message: &Message,
        extras: &Extras,
    ) -> Result<ApiResponse, ClientError> {
        let request = self.build_request(&endpoint.spec, &endpoint.params, message, extras)?;
        self.dispatch(request).await
    }

    /// Build the request for `spec` without sending it.
    ///
    /// # Errors
    ///
    /// Returns the [`BuildError`] of the builder.
    pub fn build_request(
        &self,
        spec: &EndpointSpec,
        params: &ResolvedSchema,
        message: &Message,
        extras: &Extras,
    ) -> Result<RequestSpec, BuildError> {
        let auth = self.inner.auth.load();
        builder::build(&BuildInput {
            message,
            endpoint: spec,
            params,
            auth: &auth,
            constants: &self.inner.constants,
            config: &self.inner.config,
            extras,
            header_hook: self.inner.header_hook.as_ref(),
        })
    }

    /// Send a built request and classify the response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`], [`ClientError::Http`] or
    /// [`ClientError::InternalServerError`].
    pub async fn dispatch(&self, request: RequestSpec) -> Result<ApiResponse, ClientError> {
        let method = request.method.clone();
        let url = request.url.clone();
        tracing::debug!(%method, url = %url, "sending request");

        let raw = self.inner.transport.send(request).await.inspect_err(|e| {
            tracing::debug!(%method, url = %url, error = %e, "transport failed");
        })?;
        tracing::debug!(%method, url = %url, status = raw.status.as_u16(), "received response");
        classify(raw)
    }

    /// Fetch the `next` page of a paginated response.
    ///
    /// # Errors
    ///
    /// See [`get_page`](Self::get_page).
    pub async fn get_next_page<S: LinkSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<ApiResponse, ClientError> {
        self.get_page(source, Relation::Next).await
    }

    /// Fetch the `prev` page of a paginated response.
    ///
    /// # Errors
    ///
    /// See [`get_page`](Self::get_page).
    pub async fn get_previous_page<S: LinkSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<ApiResponse, ClientError> {
        self.get_page(source, Relation::Prev).await
    }

    /// Fetch the `first` page of a paginated response.
    ///
    /// # Errors
    ///
    /// See [`get_page`](Self::get_page).
    pub async fn get_first_page<S: LinkSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<ApiResponse, ClientError> {
        self.get_page(source, Relation::First).await
    }

    /// Fetch the `last` page of a paginated response.
    ///
    /// # Errors
    ///
    /// See [`get_page`](Self::get_page).
    pub async fn get_last_page<S: LinkSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<ApiResponse, ClientError> {
        self.get_page(source, Relation::Last).await
    }

    /// Fetch the page `relation` points to.
    ///
    /// The link's path and query are requested from the configured host,
    /// with the current authentication.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] without any I/O if `source` has no
    /// such link, and the usual call errors otherwise.
    pub async fn get_page<S: LinkSource + ?Sized>(
        &self,
        source: &S,
        relation: Relation,
    ) -> Result<ApiResponse, ClientError> {
        let links = parse_links(source);
        let Some(link) = links.get(relation) else {
            return Err(ClientError::NotFound(format!("No {relation} page found")));
        };

        let url = parse_link(link)?;
        let mut template = strip_prefix(url.path(), self.inner.config.path_prefix.as_deref());
        // Verbatim query: repeated keys and their order are preserved.
        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            template.push('?');
            template.push_str(query);
        }
        let spec = EndpointSpec::new(Method::GET, template);

        let request = self.build_request(
            &spec,
            &ResolvedSchema::default(),
            &Message::new(),
            &Extras::new(),
        )?;
        self.dispatch(request).await
    }
}

/// `path` without the configured prefix, which the builder adds back.
fn strip_prefix(path: &str, prefix: Option<&str>) -> String {
    let prefix = prefix.map_or("", |p| p.trim_end_matches('/'));
    match path.strip_prefix(prefix) {
        Some(rest) if !prefix.is_empty() && (rest.is_empty() || rest.starts_with('/')) => {
            rest.to_owned()
        }
        _ => path.to_owned(),
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("endpoints", &self.inner.endpoints.len())
            .field("auth", &self.inner.auth.load().kind())
            .finish_non_exhaustive()
    }
}

fn parse_link(link: &str) -> Result<Url, BuildError> {
    let invalid = |e: url::ParseError| BuildError::InvalidUrl {
        url: link.to_owned(),
        reason: e.to_string(),
    };
    match Url::parse(link) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://localhost/")
            .and_then(|base| base.join(link))
            .map_err(invalid),
        Err(e) => Err(invalid(e)),
    }
}

/// The operations of one section.
#[derive(Debug, Clone, Copy)]
pub struct SectionApi<'a> {
    client: &'a Client,
    name: &'a str,
}

impl SectionApi<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    #[must_use]
    pub fn operations(&self) -> Vec<&str> {
        self.client.inner.endpoints.operations(self.name)
    }

    /// # Errors
    ///
    /// See [`Client::call`].
    pub async fn call(&self, operation: &str, message: Message) -> Result<ApiResponse, ClientError> {
        self.client.call(self.name, operation, message).await
    }

    /// # Errors
    ///
    /// See [`Client::call`].
    pub async fn call_with_extras(
        &self,
        operation: &str,
        message: Message,
        extras: Extras,
    ) -> Result<ApiResponse, ClientError> {
        self.client
            .call_with_extras(self.name, operation, message, extras)
            .await
    }
}

/// Builder for [`Client`].
#[must_use]
pub struct ClientBuilder {
    config: ClientConfig,
    routes: Option<RouteTable>,
    handlers: Option<HandlerRegistry>,
    transport: Option<Arc<dyn Transport>>,
    header_hook: Option<HeaderHook>,
    auth: AuthContext,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            routes: None,
            handlers: None,
            transport: None,
            header_hook: None,
            auth: AuthContext::None,
        }
    }

    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Handlers to compile against (default: [`HandlerRegistry::standard`]).
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Transport to send requests with (default: [`HyperTransport`]).
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Hook run on the headers of every request, after signing.
    pub fn header_hook(mut self, hook: impl Fn(&mut HeaderMap) + Send + Sync + 'static) -> Self {
        self.header_hook = Some(Arc::new(hook));
        self
    }

    /// Initial authentication. Validated by [`build`](Self::build).
    pub fn auth(mut self, auth: AuthContext) -> Self {
        self.auth = auth;
        self
    }

    /// Compile the routes and create the client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRoutes`] without a route table, the
    /// compilation errors of [`compile`](crate::compile), [`ConfigError::Auth`]
    /// for incomplete credentials, and [`ConfigError::Transport`] if the
    /// default transport cannot be created.
    pub fn build(self) -> Result<Client, ConfigError> {
        let routes = self.routes.ok_or(ConfigError::MissingRoutes)?;
        let handlers = self
            .handlers
            .unwrap_or_else(|| HandlerRegistry::standard(&routes));
        let endpoints = compiler::compile(&routes, &handlers)?;

        self.auth.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new()?),
        };

        tracing::debug!(
            endpoints = endpoints.len(),
            version = self.config.version.as_deref().unwrap_or("-"),
            "client ready"
        );

        Ok(Client {
            inner: Arc::new(Inner {
                config: self.config,
                constants: routes.defines.constants,
                endpoints,
                auth: ArcSwap::from_pointee(self.auth),
                transport,
                header_hook: self.header_hook,
            }),
        })
    }
}
