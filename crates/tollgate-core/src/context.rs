//! Execution context types.
//!
//! The [`ExecutionContext`] carries all per-request state for one direction
//! (request or response) of a policy chain. It is owned by the request
//! lifecycle; chains and policies only ever borrow it.

use crate::metrics::RequestMetrics;
use crate::types::{self, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
///
/// # Example
///
/// ```
/// use tollgate_core::RequestId;
///
/// let id = RequestId::new();
/// println!("Request ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    ///
    /// This is useful when the gateway propagates an ID from an inbound header.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Per-request state shared by every policy of a chain.
///
/// The context holds the request and response handles, a string-keyed
/// attribute map that policies use to pass data to each other, and the
/// request's [`RequestMetrics`]. Policies are shared configuration and
/// must keep any per-request state here rather than in themselves.
///
/// # Example
///
/// ```
/// use tollgate_core::ExecutionContext;
/// use bytes::Bytes;
/// use http_body_util::Full;
///
/// let request = http::Request::builder()
///     .uri("/orders")
///     .body(Full::new(Bytes::new()))
///     .unwrap();
///
/// let mut ctx = ExecutionContext::new(request);
/// ctx.set_attribute("api.key", "k-123");
///
/// assert_eq!(ctx.request().uri().path(), "/orders");
/// assert_eq!(ctx.attribute("api.key").and_then(|v| v.as_str()), Some("k-123"));
/// ```
#[derive(Debug)]
pub struct ExecutionContext {
    /// Unique identifier for this request.
    request_id: RequestId,

    /// Inbound request handle.
    request: Request,

    /// Outbound response handle.
    response: Response,

    /// Attributes shared between policies.
    attributes: HashMap<String, Value>,

    /// Diagnostics recorder for this request.
    metrics: RequestMetrics,

    /// When the request started processing.
    started_at: Instant,
}

impl ExecutionContext {
    /// Creates a context for an inbound request with an empty `200 OK` response.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self::with_response(request, types::empty_response())
    }

    /// Creates a context with both request and response handles.
    ///
    /// Response-direction chains are usually given the upstream response here.
    #[must_use]
    pub fn with_response(request: Request, response: Response) -> Self {
        Self {
            request_id: RequestId::new(),
            request,
            response,
            attributes: HashMap::new(),
            metrics: RequestMetrics::new(),
            started_at: Instant::now(),
        }
    }

    /// Replaces the generated request ID with a propagated one.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request handle.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the request handle for modification.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Returns the response handle.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Returns the response handle for modification.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Replaces the response handle, returning the previous one.
    pub fn replace_response(&mut self, response: Response) -> Response {
        std::mem::replace(&mut self.response, response)
    }

    /// Consumes the context, returning the request and response handles.
    #[must_use]
    pub fn into_parts(self) -> (Request, Response) {
        (self.request, self.response)
    }

    /// Returns an attribute value, if set.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Sets an attribute, returning the previous value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(name.into(), value.into())
    }

    /// Removes and returns an attribute.
    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// Checks if an attribute is set.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Returns the request metrics.
    #[must_use]
    pub fn metrics(&self) -> &RequestMetrics {
        &self.metrics
    }

    /// Returns the request metrics for recording.
    pub fn metrics_mut(&mut self) -> &mut RequestMetrics {
        &mut self.metrics
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
