//! Policy results and processor failures.
//!
//! A policy (or a whole chain) resolves to a [`PolicyResult`]: either the
//! payload-free success marker or a [`PolicyFailure`] describing what the
//! client should receive instead of continuing. [`ProcessorFailure`] wraps a
//! failure in the shape the gateway pipeline consumes.

use crate::types::Response;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use serde_json::Value;
use std::collections::HashMap;

/// Outcome of evaluating a policy or a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyResult {
    /// Evaluation succeeded. Success carries no payload.
    Success,
    /// Evaluation failed.
    Failure(PolicyFailure),
}

impl PolicyResult {
    /// Returns true for the success marker.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true for a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&PolicyFailure> {
        match self {
            Self::Success => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

impl From<PolicyFailure> for PolicyResult {
    fn from(failure: PolicyFailure) -> Self {
        Self::Failure(failure)
    }
}

/// A structured policy failure.
///
/// Carries the status to answer with, an optional human-readable message,
/// an optional machine-readable key, optional response content to emit in
/// place of the default error envelope, and free-form parameters.
///
/// # Example
///
/// ```
/// use tollgate_core::PolicyFailure;
/// use http::StatusCode;
///
/// let failure = PolicyFailure::new(StatusCode::FORBIDDEN)
///     .with_key("API_KEY_INVALID")
///     .with_message("denied");
///
/// assert_eq!(failure.status(), StatusCode::FORBIDDEN);
/// assert_eq!(failure.message(), Some("denied"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyFailure {
    status: StatusCode,
    message: Option<String>,
    key: Option<String>,
    content_type: Option<String>,
    content: Option<Bytes>,
    parameters: HashMap<String, Value>,
}

impl PolicyFailure {
    /// Creates a failure with the given status and nothing else.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
            key: None,
            content_type: None,
            content: None,
            parameters: HashMap::new(),
        }
    }

    /// Creates the generic failure used when a policy fails unexpectedly.
    ///
    /// It is a bare `500 Internal Server Error` so that no internal detail
    /// reaches the client.
    #[must_use]
    pub fn generic() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the machine-readable error key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the content to emit instead of the default error envelope.
    #[must_use]
    pub fn with_content(mut self, content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        self.content_type = Some(content_type.into());
        self.content = Some(content.into());
        self
    }

    /// Adds a free-form parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Returns the status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the error key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns the content type of the replacement content, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the replacement content, if any.
    #[must_use]
    pub const fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    /// Returns the parameters.
    #[must_use]
    pub fn parameters(&self) -> &HashMap<String, Value> {
        &self.parameters
    }
}

/// A chain failure in the shape consumed by the gateway pipeline.
///
/// Wraps a [`PolicyFailure`] without adding to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorFailure {
    failure: PolicyFailure,
}

impl ProcessorFailure {
    /// Wraps a policy failure.
    #[must_use]
    pub fn new(failure: PolicyFailure) -> Self {
        Self { failure }
    }

    /// Returns the wrapped failure.
    #[must_use]
    pub const fn failure(&self) -> &PolicyFailure {
        &self.failure
    }

    /// Unwraps the failure.
    #[must_use]
    pub fn into_failure(self) -> PolicyFailure {
        self.failure
    }

    /// Returns the status of the wrapped failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.failure.status
    }

    /// Returns the message of the wrapped failure.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.failure.message()
    }

    /// Renders the failure as the response sent to the client.
    ///
    /// Replacement content is sent verbatim with its content type. Otherwise
    /// the body is a JSON envelope:
    ///
    /// ```json
    /// {"error": {"status": 403, "code": "API_KEY_INVALID", "message": "denied"}}
    /// ```
    ///
    /// `code` and `message` fall back to the status' canonical reason.
    #[must_use]
    pub fn into_response(self) -> Response {
        let failure = self.failure;
        let reason = failure.status.canonical_reason().unwrap_or("Unknown");

        let (content_type, body) = match failure.content {
            Some(content) => {
                let content_type = failure
                    .content_type
                    .as_deref()
                    .and_then(|ct| HeaderValue::from_str(ct).ok())
                    .unwrap_or_else(|| HeaderValue::from_static("text/plain; charset=utf-8"));
                (content_type, content)
            }
            None => {
                let body = serde_json::json!({
                    "error": {
                        "status": failure.status.as_u16(),
                        "code": failure.key.as_deref().unwrap_or(reason),
                        "message": failure.message.as_deref().unwrap_or(reason),
                    }
                });
                (
                    HeaderValue::from_static("application/json"),
                    Bytes::from(body.to_string()),
                )
            }
        };

        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = failure.status;
        response.headers_mut().insert(CONTENT_TYPE, content_type);
        response
    }
}

impl From<PolicyFailure> for ProcessorFailure {
    fn from(failure: PolicyFailure) -> Self {
        Self::new(failure)
    }
}

impl std::fmt::Display for ProcessorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.failure.message() {
            Some(message) => write!(f, "policy chain failed with {}: {message}", self.status()),
            None => write!(f, "policy chain failed with {}", self.status()),
        }
    }
}
