use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Failure;
use crate::middleware::Hook;

/// Converts the parsed request body into the shape the handler expects,
/// before the handler runs. Returning an error ends the request.
pub type BodyTransform = Arc<dyn Fn(Value) -> Result<Value, Failure> + Send + Sync>;

/// JSON Schemas a request (and optionally its response) must satisfy.
///
/// `headers`, `query` and `path` are validated as objects of strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRequirements {
    pub headers: Option<Value>,
    pub query: Option<Value>,
    pub path: Option<Value>,
    pub body: Option<Value>,
    pub response: Option<Value>,
}

impl ValidationRequirements {
    pub fn is_empty(&self) -> bool {
        self.headers.is_none()
            && self.query.is_none()
            && self.path.is_none()
            && self.body.is_none()
            && self.response.is_none()
    }

    /// Field-wise merge; `self` wins.
    #[must_use]
    pub fn or(self, other: &ValidationRequirements) -> Self {
        Self {
            headers: self.headers.or_else(|| other.headers.clone()),
            query: self.query.or_else(|| other.query.clone()),
            path: self.path.or_else(|| other.path.clone()),
            body: self.body.or_else(|| other.body.clone()),
            response: self.response.or_else(|| other.response.clone()),
        }
    }
}

/// Per-method configuration, from a module's `requirements` map or from
/// handler metadata.
///
/// Every field is optional so partial configurations can be layered.
#[derive(Clone, Default)]
pub struct MethodConfig {
    pub auth: Option<bool>,
    pub timeout: Option<Duration>,
    pub before: Vec<Arc<dyn Hook>>,
    pub after: Vec<Arc<dyn Hook>>,
    pub validation: Option<ValidationRequirements>,
    pub body: Option<BodyTransform>,
    /// Route template for dynamic routes, e.g. `/users/{id}`
    pub required_path: Option<String>,
}

impl MethodConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn auth(mut self, required: bool) -> Self {
        self.auth = Some(required);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn before(mut self, hook: Arc<dyn Hook>) -> Self {
        self.before.push(hook);
        self
    }

    #[must_use]
    pub fn after(mut self, hook: Arc<dyn Hook>) -> Self {
        self.after.push(hook);
        self
    }

    #[must_use]
    pub fn validation(mut self, requirements: ValidationRequirements) -> Self {
        self.validation = Some(requirements);
        self
    }

    #[must_use]
    pub fn body<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(transform));
        self
    }

    #[must_use]
    pub fn required_path(mut self, template: impl Into<String>) -> Self {
        self.required_path = Some(template.into());
        self
    }

    /// Combine the two configuration sources of one endpoint.
    ///
    /// Scalar values come from `requirements` when set and from `metadata`
    /// otherwise. Hook lists concatenate, requirements hooks first.
    pub fn merge(requirements: Option<&MethodConfig>, metadata: Option<&MethodConfig>) -> Self {
        match (requirements, metadata) {
            (None, None) => Self::default(),
            (Some(only), None) | (None, Some(only)) => only.clone(),
            (Some(req), Some(meta)) => Self {
                auth: req.auth.or(meta.auth),
                timeout: req.timeout.or(meta.timeout),
                before: req.before.iter().chain(&meta.before).cloned().collect(),
                after: req.after.iter().chain(&meta.after).cloned().collect(),
                validation: match (&req.validation, &meta.validation) {
                    (Some(r), Some(m)) => Some(r.clone().or(m)),
                    (r, m) => r.clone().or_else(|| m.clone()),
                },
                body: req.body.clone().or_else(|| meta.body.clone()),
                required_path: req
                    .required_path
                    .clone()
                    .or_else(|| meta.required_path.clone()),
            },
        }
    }
}

impl fmt::Debug for MethodConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodConfig")
            .field("auth", &self.auth)
            .field("timeout", &self.timeout)
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("validation", &self.validation)
            .field("body", &self.body.is_some())
            .field("required_path", &self.required_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Request, Response};
    use crate::middleware::hook;
    use serde_json::json;

    fn tag(name: &'static str) -> Arc<dyn Hook> {
        hook(move |_req: &mut Request, res: &mut Response| {
            res.headers.append(
                "x-order",
                http::HeaderValue::from_static(name),
            );
            Ok(())
        })
    }

    #[test]
    fn test_requirements_win_metadata_supplements() {
        let req = MethodConfig::new()
            .timeout(Duration::from_millis(100))
            .validation(ValidationRequirements {
                body: Some(json!({"type": "object"})),
                ..Default::default()
            });
        let meta = MethodConfig::new()
            .auth(true)
            .timeout(Duration::from_secs(5))
            .required_path("/users/{id}")
            .validation(ValidationRequirements {
                body: Some(json!({"type": "array"})),
                query: Some(json!({"type": "object"})),
                ..Default::default()
            });

        let merged = MethodConfig::merge(Some(&req), Some(&meta));
        assert_eq!(merged.timeout, Some(Duration::from_millis(100)));
        assert_eq!(merged.auth, Some(true));
        assert_eq!(merged.required_path.as_deref(), Some("/users/{id}"));
        let validation = merged.validation.unwrap();
        assert_eq!(validation.body, Some(json!({"type": "object"})));
        assert_eq!(validation.query, Some(json!({"type": "object"})));
    }

    #[test]
    fn test_hooks_concatenate_requirements_first() {
        let req = MethodConfig::new().before(tag("r1")).before(tag("r2"));
        let meta = MethodConfig::new().before(tag("m1"));
        let merged = MethodConfig::merge(Some(&req), Some(&meta));

        let mut request = Request::default();
        let mut response = Response::new();
        for h in &merged.before {
            h.call(&mut request, &mut response).unwrap();
        }
        let order: Vec<_> = response
            .headers
            .get_all("x-order")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(order, ["r1", "r2", "m1"]);
    }

    #[test]
    fn test_merge_of_nothing_is_empty() {
        let merged = MethodConfig::merge(None, None);
        assert!(merged.auth.is_none());
        assert!(merged.before.is_empty());
        assert!(merged.validation.is_none());
    }
}
