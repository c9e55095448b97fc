//! HTTP types carried through a policy chain.

use bytes::Bytes;
use http_body_util::Full;

/// The HTTP request type seen by policies.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type seen by policies.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// Creates an empty `200 OK` response.
///
/// Used as the response handle of a context before any upstream response
/// has been received.
#[must_use]
pub fn empty_response() -> Response {
    http::Response::new(Full::new(Bytes::new()))
}
