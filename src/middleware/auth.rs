use http::header::AUTHORIZATION;
use http::HeaderName;

use super::Hook;
use crate::error::{AppError, Failure};
use crate::event::{Request, Response};

/// Identity stored in the request context after a successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
}

/// Shared-secret authentication.
///
/// Compares one header against a configured token, optionally behind a
/// `Bearer ` scheme. Mismatches fail with 401.
pub struct TokenAuth {
    header: HeaderName,
    token: String,
    bearer: bool,
    subject: String,
}

impl TokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            header: AUTHORIZATION,
            token: token.into(),
            bearer: false,
            subject: "token".to_string(),
        }
    }

    /// Expect `Bearer <token>` rather than the bare token.
    #[must_use]
    pub fn bearer(mut self) -> Self {
        self.bearer = true;
        self
    }

    #[must_use]
    pub fn header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }

    /// Subject recorded on the [`Principal`].
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    fn presented<'r>(&self, req: &'r Request) -> Option<&'r str> {
        let value = req.headers.get(&self.header)?.to_str().ok()?.trim();
        if !self.bearer {
            return Some(value);
        }
        let (scheme, token) = value.split_once(' ')?;
        scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
    }
}

impl Hook for TokenAuth {
    fn call(&self, req: &mut Request, _res: &mut Response) -> Result<(), Failure> {
        match self.presented(req) {
            Some(token) if token == self.token => {
                req.context.insert(Principal {
                    subject: self.subject.clone(),
                });
                Ok(())
            }
            Some(_) => Err(AppError::unauthorized("invalid credentials").into()),
            None => Err(AppError::unauthorized(format!("missing {} header", self.header)).into()),
        }
    }
}
