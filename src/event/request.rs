use base64::{engine::general_purpose, Engine as _};
use http::header::CONTENT_TYPE;
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::error::AppError;
use crate::ids::RequestId;

/// Raw event delivered by the serverless host.
///
/// Field names follow the gateway payload (`httpMethod`, `rawPath`,
/// `queryStringParameters`, `isBase64Encoded`); the snake_case forms are
/// accepted as well.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundEvent {
    #[serde(alias = "httpMethod")]
    pub method: String,
    #[serde(alias = "rawPath")]
    pub path: String,
    #[serde(alias = "rawQueryString")]
    pub raw_query: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    #[serde(alias = "queryStringParameters")]
    pub query: Option<HashMap<String, String>>,
    pub body: Option<String>,
    #[serde(alias = "isBase64Encoded")]
    pub is_base64_encoded: bool,
}

/// Decoded request handed to every pipeline stage.
///
/// `path_params` and `route` are filled in by the resolver, and `context` is
/// an opaque slot hooks use to pass values downstream (e.g. the
/// authenticated principal).
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub id: RequestId,
    pub method: Method,
    /// Request path without the query string
    pub path: String,
    /// Route template once resolved, e.g. `/users/{id}`
    pub route: Option<String>,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub path_params: HashMap<String, String>,
    pub context: Extensions,
    pub raw_body: Vec<u8>,
    /// Body parsed according to `content-type`; `Null` when absent
    pub body: Value,
}

impl Request {
    /// A bare request, mostly useful for tests and hosts that decode
    /// events themselves.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query) = split_query(&path);
        Self {
            method,
            path,
            query,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    /// Set a JSON body; `raw_body` holds its serialized form.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.raw_body = body.to_string().into_bytes();
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = body;
        self
    }

    /// Decode an inbound event.
    ///
    /// Query parameters from the event map win over ones embedded in the path.
    /// A malformed method or body is a 400.
    pub fn from_event(event: InboundEvent) -> Result<Self, AppError> {
        let method = Method::from_bytes(event.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                AppError::bad_request(
                    "invalid_method",
                    format!("unsupported HTTP method '{}'", event.method),
                )
            })?;

        let (path, mut query) = split_query(&event.path);
        if let Some(raw) = event.raw_query.as_deref().filter(|q| !q.is_empty()) {
            query.extend(parse_query(raw));
        }
        query.extend(event.query.unwrap_or_default());

        let mut headers = HeaderMap::new();
        for (name, value) in event.headers.unwrap_or_default() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => debug!(header = %name, "Skipping unrepresentable header"),
            }
        }

        let raw_body = match event.body {
            Some(body) if event.is_base64_encoded => general_purpose::STANDARD
                .decode(body.trim())
                .map_err(|e| {
                    AppError::bad_request("invalid_body", format!("invalid base64 body: {e}"))
                })?,
            Some(body) => body.into_bytes(),
            None => Vec::new(),
        };
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let body = parse_body(content_type, &raw_body)?;

        Ok(Self {
            id: RequestId::from_headers(&headers),
            method,
            path,
            route: None,
            headers,
            query,
            path_params: HashMap::new(),
            context: Extensions::new(),
            raw_body,
            body,
        })
    }

    /// Header value as a string, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Route template when resolved, the raw path otherwise.
    pub fn route_or_path(&self) -> &str {
        self.route.as_deref().unwrap_or(&self.path)
    }
}

fn split_query(path: &str) -> (String, HashMap<String, String>) {
    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (path, HashMap::new()),
    };
    let path = if path.is_empty() { "/" } else { path };
    (path.to_string(), query)
}

fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Parse a body by content type: JSON, url-encoded form, otherwise text.
pub(crate) fn parse_body(content_type: Option<&str>, raw: &[u8]) -> Result<Value, AppError> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if mime == "application/json" || mime.ends_with("+json") {
        return serde_json::from_slice(raw).map_err(|e| {
            AppError::bad_request("invalid_body", format!("malformed JSON body: {e}"))
        });
    }
    if mime == "application/x-www-form-urlencoded" {
        let form: Map<String, Value> = url::form_urlencoded::parse(raw)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();
        return Ok(Value::Object(form));
    }
    Ok(Value::String(String::from_utf8_lossy(raw).into_owned()))
}
