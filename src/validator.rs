//! Request and response validation.
//!
//! Two mutually exclusive modes feed the pipeline's validation stages:
//!
//! - **schema**: a host-supplied [`SchemaValidator`] (an OpenAPI validator,
//!   for example) sees every request and returns its issues.
//! - **requirements**: [`RequirementsValidator`] checks the JSON Schemas an
//!   endpoint declares in its [`ValidationRequirements`].
//!
//! Either way issues accumulate and are reported together rather than
//! stopping at the first violation.

use http::HeaderMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Failure;
use crate::event::{ErrorEntry, Request, Response};
use crate::handler::ValidationRequirements;
use crate::validator_cache::ValidatorCache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// `headers`, `query`, `path`, `body` or `response`
    pub location: String,
    /// Machine key, e.g. `invalid_body`
    pub kind: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        location: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ValidationIssue {
            location: location.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// An issue at `location` keyed `invalid_<location>`.
    pub fn at(location: &str, message: impl Into<String>) -> Self {
        Self::new(location, format!("invalid_{location}"), message)
    }
}

impl From<ValidationIssue> for ErrorEntry {
    fn from(issue: ValidationIssue) -> Self {
        ErrorEntry::new(issue.kind, issue.message).at(issue.location)
    }
}

/// Host-supplied validator used in schema mode.
pub trait SchemaValidator: Send + Sync {
    fn validate_request(&self, req: &Request) -> Vec<ValidationIssue>;

    fn validate_response(&self, _req: &Request, _res: &Response) -> Vec<ValidationIssue> {
        Vec::new()
    }
}

impl<F> SchemaValidator for F
where
    F: Fn(&Request) -> Vec<ValidationIssue> + Send + Sync,
{
    fn validate_request(&self, req: &Request) -> Vec<ValidationIssue> {
        self(req)
    }
}

/// Validates requests against the schemas in [`ValidationRequirements`].
///
/// Headers, query and path parameters are validated as JSON objects of
/// strings; header names are lower-case.
#[derive(Clone, Default)]
pub struct RequirementsValidator {
    cache: ValidatorCache,
}

impl RequirementsValidator {
    pub fn new(cache: ValidatorCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ValidatorCache {
        &self.cache
    }

    /// Collect every violation of `requirements` by `req`.
    ///
    /// A schema that does not compile is a configuration error, reported as
    /// an internal failure rather than blamed on the client.
    pub fn validate_request(
        &self,
        requirements: &ValidationRequirements,
        req: &Request,
    ) -> Result<Vec<ValidationIssue>, Failure> {
        let mut issues = Vec::new();
        if let Some(schema) = &requirements.headers {
            self.check("headers", schema, &header_object(&req.headers), &mut issues)?;
        }
        if let Some(schema) = &requirements.query {
            self.check("query", schema, &string_object(&req.query), &mut issues)?;
        }
        if let Some(schema) = &requirements.path {
            self.check("path", schema, &string_object(&req.path_params), &mut issues)?;
        }
        if let Some(schema) = &requirements.body {
            self.check("body", schema, &req.body, &mut issues)?;
        }
        Ok(issues)
    }

    /// Validate the response body; a missing body validates as `null`.
    pub fn validate_response(
        &self,
        requirements: &ValidationRequirements,
        res: &Response,
    ) -> Result<Vec<ValidationIssue>, Failure> {
        let mut issues = Vec::new();
        if let Some(schema) = &requirements.response {
            let body = res.body().cloned().unwrap_or(Value::Null);
            self.check("response", schema, &body, &mut issues)?;
        }
        Ok(issues)
    }

    fn check(
        &self,
        location: &str,
        schema: &Value,
        instance: &Value,
        issues: &mut Vec<ValidationIssue>,
    ) -> Result<(), Failure> {
        let validator = self
            .cache
            .get_or_compile(location, schema)
            .map_err(|reason| Failure::internal(format!("invalid {location} schema: {reason}")))?;
        issues.extend(
            validator
                .iter_errors(instance)
                .map(|e| ValidationIssue::at(location, e.to_string().replace('\n', " "))),
        );
        Ok(())
    }
}

impl std::fmt::Debug for RequirementsValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequirementsValidator")
            .field("cached_schemas", &self.cache.size())
            .finish()
    }
}

/// Shared handle used by the router builder.
pub type SharedSchemaValidator = Arc<dyn SchemaValidator>;

fn string_object(values: &HashMap<String, String>) -> Value {
    Value::Object(
        values
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn header_object(headers: &HeaderMap) -> Value {
    let mut object = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        object.insert(name.as_str().to_string(), Value::String(joined));
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    fn requirements() -> ValidationRequirements {
        ValidationRequirements {
            headers: Some(json!({"type": "object", "required": ["x-api-key"]})),
            query: Some(json!({
                "type": "object",
                "properties": {"limit": {"type": "string", "pattern": "^[0-9]+$"}}
            })),
            body: Some(json!({
                "type": "object",
                "required": ["name"],
                "properties": {"name": {"type": "string"}}
            })),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request_has_no_issues() {
        let req = Request::new(Method::POST, "/users?limit=10")
            .with_header("x-api-key", "k")
            .with_json(json!({"name": "ada"}));
        let issues = RequirementsValidator::default()
            .validate_request(&requirements(), &req)
            .unwrap();
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn test_issues_accumulate_across_locations() {
        let req = Request::new(Method::POST, "/users?limit=ten").with_json(json!({}));
        let issues = RequirementsValidator::default()
            .validate_request(&requirements(), &req)
            .unwrap();
        let kinds: Vec<&str> = issues.iter().map(|i| i.kind.as_str()).collect();
        assert_eq!(kinds, ["invalid_headers", "invalid_query", "invalid_body"]);

        let entry = ErrorEntry::from(issues[2].clone());
        assert_eq!(entry.location.as_deref(), Some("body"));
    }

    #[test]
    fn test_response_validation() {
        let reqs = ValidationRequirements {
            response: Some(json!({"type": "array"})),
            ..Default::default()
        };
        let validator = RequirementsValidator::default();
        let ok = Response::new().json(json!([1, 2]));
        assert!(validator.validate_response(&reqs, &ok).unwrap().is_empty());
        let bad = Response::new().json(json!({"a": 1}));
        let issues = validator.validate_response(&reqs, &bad).unwrap();
        assert_eq!(issues[0].kind, "invalid_response");
    }

    #[test]
    fn test_uncompilable_schema_is_internal() {
        let reqs = ValidationRequirements {
            body: Some(json!({"type": 12})),
            ..Default::default()
        };
        let req = Request::new(Method::POST, "/");
        assert!(matches!(
            RequirementsValidator::default().validate_request(&reqs, &req),
            Err(Failure::Internal(_))
        ));
    }

    #[test]
    fn test_closure_schema_validator() {
        let validator = |req: &Request| {
            if req.query_param("q").is_none() {
                vec![ValidationIssue::at("query", "q is required")]
            } else {
                Vec::new()
            }
        };
        assert_eq!(validator.validate_request(&Request::new(Method::GET, "/")).len(), 1);
        assert!(validator.validate_request(&Request::new(Method::GET, "/?q=1")).is_empty());
    }
}
