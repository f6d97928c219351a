use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::ids::{RequestId, REQUEST_ID_HEADER};

/// One entry of a response error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub key: String,
    pub message: String,
    /// Where the problem was found (`body`, `query.limit`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ErrorEntry {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            location: None,
        }
    }

    #[must_use]
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Mutable response envelope threaded through the pipeline.
///
/// Status is inferred unless set explicitly to something other than 200: an
/// error list means 400, an empty body 204, anything else 200. Once an error is pushed the remaining stages
/// are skipped.
#[derive(Debug, Clone, Default)]
pub struct Response {
    status: Option<StatusCode>,
    pub headers: HeaderMap,
    body: Option<Value>,
    errors: Vec<ErrorEntry>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective status code.
    pub fn status(&self) -> StatusCode {
        match self.status {
            Some(status) if status != StatusCode::OK => status,
            _ if !self.errors.is_empty() => StatusCode::BAD_REQUEST,
            _ if self.is_empty() => StatusCode::NO_CONTENT,
            _ => StatusCode::OK,
        }
    }

    /// Status set by a stage, if any.
    pub fn explicit_status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: impl Into<Value>) {
        self.body = Some(body.into());
    }

    /// Builder form of [`Response::set_body`].
    #[must_use]
    pub fn json(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn take_body(&mut self) -> Option<Value> {
        self.body.take()
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn push_error(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ErrorEntry::new(key, message));
    }

    pub fn push_entry(&mut self, entry: ErrorEntry) {
        self.errors.push(entry);
    }

    /// Replace whatever the pipeline produced so far with a single error.
    pub fn fail(&mut self, status: StatusCode, key: impl Into<String>, message: impl Into<String>) {
        self.body = None;
        self.errors.clear();
        self.status = Some(status);
        self.errors.push(ErrorEntry::new(key, message));
    }

    fn is_empty(&self) -> bool {
        match &self.body {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }

    /// The value that goes on the wire: the error list when present,
    /// otherwise the body.
    pub fn payload(&self) -> Option<Value> {
        if self.has_errors() {
            Some(json!({ "errors": self.errors }))
        } else if self.is_empty() {
            None
        } else {
            self.body.clone()
        }
    }

    /// Serialize for the host, echoing the request id.
    pub fn into_outbound(self, request_id: Option<&RequestId>) -> OutboundResponse {
        let status = self.status();
        let payload = self.payload();
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &self.headers {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(&value);
                })
                .or_insert(value);
        }

        let body = match payload {
            None => String::new(),
            Some(Value::String(text)) => {
                headers
                    .entry(CONTENT_TYPE.as_str().to_string())
                    .or_insert_with(|| "text/plain; charset=utf-8".to_string());
                text
            }
            Some(value) => {
                headers
                    .entry(CONTENT_TYPE.as_str().to_string())
                    .or_insert_with(|| "application/json".to_string());
                value.to_string()
            }
        };
        if let Some(id) = request_id {
            headers.insert(REQUEST_ID_HEADER.to_string(), id.to_string());
        }

        OutboundResponse {
            status_code: status.as_u16(),
            headers,
            body,
            is_base64_encoded: false,
        }
    }
}

/// Serialized response returned to the serverless host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_inference() {
        let mut res = Response::new();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        res.set_body(json!({"ok": true}));
        assert_eq!(res.status(), StatusCode::OK);
        res.push_error("invalid", "bad input");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        res.set_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_explicit_ok_still_infers() {
        let mut res = Response::new().with_status(StatusCode::OK);
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        res.set_body(json!({"id": 1}));
        assert_eq!(res.status(), StatusCode::OK);
        res.push_error("invalid", "bad input");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.explicit_status(), Some(StatusCode::OK));
    }

    #[test]
    fn test_empty_string_body_is_no_content() {
        let res = Response::new().json("");
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_fail_replaces_body_and_errors() {
        let mut res = Response::new().json(json!({"partial": 1}));
        res.push_error("first", "one");
        res.fail(StatusCode::NOT_FOUND, "not_found", "missing");
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.errors().len(), 1);
        assert_eq!(res.errors()[0].key, "not_found");
        assert!(res.body().is_none());
    }

    #[test]
    fn test_outbound_json_and_request_id() {
        let id = RequestId::new();
        let out = Response::new().json(json!({"id": 7})).into_outbound(Some(&id));
        assert_eq!(out.status_code, 200);
        assert_eq!(out.body, r#"{"id":7}"#);
        assert_eq!(out.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(out.headers.get("x-request-id").unwrap(), &id.to_string());

        let wire = serde_json::to_value(&out).unwrap();
        assert_eq!(wire["statusCode"], 200);
        assert_eq!(wire["isBase64Encoded"], false);
    }

    #[test]
    fn test_outbound_errors_and_text() {
        let mut res = Response::new();
        res.push_entry(ErrorEntry::new("required", "limit is required").at("query.limit"));
        let out = res.into_outbound(None);
        assert_eq!(out.status_code, 400);
        let body: Value = serde_json::from_str(&out.body).unwrap();
        assert_eq!(body["errors"][0]["location"], "query.limit");

        let out = Response::new().json("pong").into_outbound(None);
        assert_eq!(out.body, "pong");
        assert_eq!(
            out.headers.get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
