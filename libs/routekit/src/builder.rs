//! Turns a validated message into a [`RequestSpec`].

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use routekit_auth::encoding::encode_uri_component;
use routekit_auth::{AuthContext, Extras, SigningRequest};
use serde_json::{Map, Value};

use crate::config::ClientConfig;
use crate::error::BuildError;
use crate::params::{ResolvedSchema, text_of};
use crate::request::{Body, FilePart, MultipartBody, RequestSpec};
use crate::schema::{Constants, EndpointSpec, Message, ParamType, RequestFormat};

/// Caller hook that may edit the headers of every request after signing.
pub type HeaderHook = Arc<dyn Fn(&mut HeaderMap) + Send + Sync>;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";
const BOUNDARY_LENGTH: usize = 24;

/// Everything a single request is built from.
#[derive(Clone, Copy)]
pub struct BuildInput<'a> {
    /// Already validated parameters.
    pub message: &'a Message,
    pub endpoint: &'a EndpointSpec,
    pub params: &'a ResolvedSchema,
    pub auth: &'a AuthContext,
    pub constants: &'a Constants,
    pub config: &'a ClientConfig,
    pub extras: &'a Extras,
    pub header_hook: Option<&'a HeaderHook>,
}

/// Build the request for one endpoint call.
///
/// # Errors
///
/// Returns [`BuildError::MissingHost`] when neither the config nor the
/// route constants name a host, [`BuildError::InvalidFile`] for malformed
/// file parameters, and signing or header errors.
pub fn build(input: &BuildInput<'_>) -> Result<RequestSpec, BuildError> {
    let method = input.endpoint.method.clone();
    let has_body = !matches!(method, Method::HEAD | Method::GET | Method::DELETE);
    let format = if has_body {
        input
            .endpoint
            .request_format
            .or(input.constants.request_format)
            .unwrap_or(RequestFormat::Query)
    } else {
        RequestFormat::Query
    };

    let mut path = input.endpoint.url.clone();
    let mut fields: Vec<(&str, &Value)> = Vec::new();
    let mut files: Vec<FilePart> = Vec::new();

    for param in input.params.iter() {
        let Some(value) = input.message.get(&param.name).filter(|v| !v.is_null()) else {
            continue;
        };
        if has_body && param.kind() == Some(&ParamType::File) {
            collect_files(&param.name, value, &mut files)?;
            continue;
        }
        if let Some(range) = find_placeholder(&path, &param.name) {
            path.replace_range(range, &encode_uri_component(&text_of(value)));
            continue;
        }
        fields.push((param.name.as_str(), value));
    }

    let origin = Origin::resolve(input.config, input.constants)?;
    if let Some(prefix) = input.config.path_prefix.as_deref() {
        path.insert_str(0, prefix.trim_end_matches('/'));
    }

    let (body, content_type) = if has_body {
        make_body(format, &fields, files)?
    } else {
        if !fields.is_empty() {
            path.push('?');
            path.push_str(&query_string(&fields));
        }
        (Body::Empty, None)
    };

    let mut url = format!("{}{path}", origin.base());

    let mut headers = HeaderMap::new();
    insert(&mut headers, HOST, &origin.authority())?;
    insert(&mut headers, USER_AGENT, &input.config.user_agent)?;
    if let Some(content_type) = content_type {
        insert(&mut headers, CONTENT_TYPE, &content_type)?;
    }
    match &body {
        Body::Empty => insert(&mut headers, CONTENT_LENGTH, "0")?,
        Body::Text(text) => insert(&mut headers, CONTENT_LENGTH, &text.len().to_string())?,
        // Length is known once the transport has read the files.
        Body::Multipart(_) => {}
    }

    apply_auth(input, &mut url, &mut headers)?;

    if let Some(hook) = input.header_hook {
        hook(&mut headers);
    }

    tracing::debug!(%method, url = %url, auth = input.auth.kind(), "built request");

    Ok(RequestSpec {
        method,
        url,
        headers,
        body,
        timeout: input.config.timeout,
    })
}

/// Body and content type of a request that carries one.
fn make_body(
    format: RequestFormat,
    fields: &[(&str, &Value)],
    files: Vec<FilePart>,
) -> Result<(Body, Option<String>), BuildError> {
    if !files.is_empty() {
        let form = MultipartBody {
            boundary: format!("routekit-{}", routekit_auth::oauth1::nonce(BOUNDARY_LENGTH)),
            fields: fields
                .iter()
                .map(|(name, value)| ((*name).to_owned(), text_of(value)))
                .collect(),
            files,
        };
        let content_type = form.content_type();
        return Ok((Body::Multipart(form), Some(content_type)));
    }
    Ok(match format {
        RequestFormat::Json => (
            Body::Text(json_body(fields)?),
            Some(JSON_CONTENT_TYPE.to_owned()),
        ),
        RequestFormat::Query => (
            Body::Text(query_string(fields)),
            Some(FORM_CONTENT_TYPE.to_owned()),
        ),
    })
}

/// Sign the request: either an `authorization` header or a query parameter.
fn apply_auth(
    input: &BuildInput<'_>,
    url: &mut String,
    headers: &mut HeaderMap,
) -> Result<(), BuildError> {
    let signing = SigningRequest::new(input.endpoint.method.as_str(), url, input.extras)
        .with_nonce_length(input.config.nonce_length);
    let outcome = routekit_auth::sign(input.auth, &signing)?;
    if let Some((name, value)) = outcome.query {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(name);
        url.push('=');
        url.push_str(&encode_uri_component(&value));
    }
    if let Some(authorization) = outcome.authorization {
        let mut value = header_value(AUTHORIZATION.as_str(), &authorization)?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(())
}

/// Where requests are sent: scheme, host and port.
struct Origin<'a> {
    protocol: &'a str,
    host: &'a str,
    port: u16,
}

impl<'a> Origin<'a> {
    fn resolve(config: &'a ClientConfig, constants: &'a Constants) -> Result<Self, BuildError> {
        let protocol = config
            .protocol
            .as_deref()
            .or(constants.protocol.as_deref())
            .unwrap_or("http");

        if let Some(proxy) = &config.proxy {
            return Ok(Self {
                protocol,
                host: &proxy.host,
                port: proxy.port,
            });
        }

        let host = config
            .host
            .as_deref()
            .or(constants.host.as_deref())
            .ok_or(BuildError::MissingHost)?;
        let port = config
            .port
            .or(constants.port)
            .unwrap_or_else(|| default_port(protocol));
        Ok(Self {
            protocol,
            host,
            port,
        })
    }

    fn authority(&self) -> String {
        if self.port == default_port(self.protocol) {
            self.host.to_owned()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn base(&self) -> String {
        format!("{}://{}", self.protocol, self.authority())
    }
}

fn default_port(protocol: &str) -> u16 {
    if protocol.eq_ignore_ascii_case("https") {
        443
    } else {
        80
    }
}

/// Byte range of the first `:name` placeholder in `template` that is not
/// a prefix of a longer placeholder.
fn find_placeholder(template: &str, name: &str) -> Option<Range<usize>> {
    let token = format!(":{name}");
    let mut from = 0;
    while let Some(pos) = template[from..].find(&token) {
        let start = from + pos;
        let end = start + token.len();
        let at_boundary = template[end..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'));
        if at_boundary {
            return Some(start..end);
        }
        from = end;
    }
    None
}

fn query_string(fields: &[(&str, &Value)]) -> String {
    fields
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                encode_uri_component(name),
                encode_uri_component(&text_of(value))
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn json_body(fields: &[(&str, &Value)]) -> Result<String, BuildError> {
    // A declared `body` parameter is the whole payload.
    if let Some((_, body)) = fields.iter().find(|(name, _)| *name == "body") {
        return Ok(serde_json::to_string(body)?);
    }
    let object: Map<String, Value> = fields
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).clone()))
        .collect();
    Ok(serde_json::to_string(&object)?)
}

fn collect_files(param: &str, value: &Value, files: &mut Vec<FilePart>) -> Result<(), BuildError> {
    let invalid = || BuildError::InvalidFile {
        param: param.to_owned(),
    };
    match value {
        Value::String(path) => files.push(FilePart {
            field: param.to_owned(),
            path: PathBuf::from(path),
        }),
        Value::Object(map) => {
            for (field, path) in map {
                let path = path.as_str().ok_or_else(invalid)?;
                files.push(FilePart {
                    field: field.clone(),
                    path: PathBuf::from(path),
                });
            }
        }
        _ => return Err(invalid()),
    }
    Ok(())
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, BuildError> {
    HeaderValue::from_str(value).map_err(|source| BuildError::InvalidHeader {
        name: name.to_owned(),
        source,
    })
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), BuildError> {
    let value = header_value(name.as_str(), value)?;
    headers.insert(name, value);
    Ok(())
}
