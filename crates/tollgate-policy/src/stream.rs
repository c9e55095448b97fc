//! The chain as seen by a running policy.
//!
//! A [`ChainHandle`] is how a policy talks back to its chain: it can
//! short-circuit the chain with [`ChainHandle::fail_with`], fail the body
//! stream with [`ChainHandle::stream_fail_with`], and write body bytes that
//! the chain forwards to a [`StreamSink`].
//!
//! Handles are cheap to clone and `Send + 'static`, so a policy can move one
//! into a spawned task and fail the chain from there.

use crate::completion::{ChainOutcome, CompletionLatch, OutcomeKind};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tollgate_core::{ChainError, ChainResult, PolicyFailure, ProcessorFailure};
use tracing::{debug, warn};

/// Errors reported by a [`StreamSink`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink no longer accepts data.
    #[error("stream sink is closed")]
    Closed,

    /// The sink refused the data.
    #[error("stream sink rejected data: {0}")]
    Rejected(String),
}

/// Downstream receiver of the body bytes a chain forwards.
///
/// What happens to the bytes (buffering, forwarding upstream) is up to the
/// sink. Implementations are shared between the chain and its handles and
/// must use interior mutability.
pub trait StreamSink: Send + Sync + 'static {
    /// Accepts a chunk of body data.
    fn write(&self, chunk: Bytes) -> Result<(), SinkError>;

    /// Marks the end of the body.
    fn end(&self) -> Result<(), SinkError>;

    /// Notified once when the chain's stream fails.
    fn fail(&self, _failure: &ProcessorFailure) {}
}

#[derive(Debug, Default)]
struct BufferState {
    body: BytesMut,
    ended: bool,
    failure: Option<ProcessorFailure>,
}

/// A sink that buffers the body in memory.
///
/// # Example
///
/// ```
/// use tollgate_policy::{BufferedSink, StreamSink};
///
/// let sink = BufferedSink::new();
/// sink.write("hello ".into()).unwrap();
/// sink.write("world".into()).unwrap();
/// sink.end().unwrap();
///
/// assert_eq!(sink.body(), "hello world");
/// assert!(sink.is_ended());
/// ```
#[derive(Debug, Default)]
pub struct BufferedSink {
    state: Mutex<BufferState>,
    limit: Option<usize>,
}

impl BufferedSink {
    /// Creates an unbounded buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer that rejects writes past `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: Mutex::default(),
            limit: Some(limit),
        }
    }

    /// Returns a copy of the buffered body.
    #[must_use]
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.lock().body)
    }

    /// Returns true once the body has ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// Returns the stream failure the sink was notified of, if any.
    #[must_use]
    pub fn failure(&self) -> Option<ProcessorFailure> {
        self.state.lock().failure.clone()
    }
}

impl StreamSink for BufferedSink {
    fn write(&self, chunk: Bytes) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.ended || state.failure.is_some() {
            return Err(SinkError::Closed);
        }
        if let Some(limit) = self.limit {
            if state.body.len() + chunk.len() > limit {
                return Err(SinkError::Rejected(format!(
                    "body exceeds the {limit} byte buffer limit"
                )));
            }
        }
        state.body.extend_from_slice(&chunk);
        Ok(())
    }

    fn end(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.ended {
            return Err(SinkError::Closed);
        }
        state.ended = true;
        Ok(())
    }

    fn fail(&self, failure: &ProcessorFailure) {
        self.state.lock().failure = Some(failure.clone());
    }
}

struct HandleInner {
    latch: CompletionLatch,
    sink: Arc<dyn StreamSink>,
    stream_closed: AtomicBool,
    direction: &'static str,
}

/// A running chain's control and stream surface.
#[derive(Clone)]
pub struct ChainHandle {
    inner: Arc<HandleInner>,
}

impl ChainHandle {
    pub(crate) fn new(
        latch: CompletionLatch,
        sink: Arc<dyn StreamSink>,
        direction: &'static str,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                latch,
                sink,
                stream_closed: AtomicBool::new(false),
                direction,
            }),
        }
    }

    /// Terminates the chain with a control-flow failure.
    ///
    /// The failure is delivered verbatim. Returns false, and does nothing,
    /// if the chain already has an outcome.
    pub fn fail_with(&self, failure: PolicyFailure) -> bool {
        let status = failure.status();
        let fired = self
            .inner
            .latch
            .fire(ChainOutcome::Failed(ProcessorFailure::new(failure)));
        if fired {
            debug!(
                direction = self.inner.direction,
                status = status.as_u16(),
                "Policy chain failed"
            );
        }
        fired
    }

    /// Terminates the chain with a body-stream failure.
    ///
    /// Only the stream failure outcome is fired; the control-flow failure
    /// path is never taken. The stream is closed and the sink is notified.
    /// Returns false, and leaves the sink untouched, if the chain already
    /// has an outcome.
    pub fn stream_fail_with(&self, failure: PolicyFailure) -> bool {
        self.inner.stream_closed.store(true, Ordering::Release);

        let failure = ProcessorFailure::new(failure);
        let fired = self
            .inner
            .latch
            .fire(ChainOutcome::StreamFailed(failure.clone()));
        if fired {
            debug!(
                direction = self.inner.direction,
                status = failure.status().as_u16(),
                "Policy chain stream failed"
            );
            self.inner.sink.fail(&failure);
        }
        fired
    }

    /// Forwards a chunk of body data to the sink.
    ///
    /// A sink error fails the stream with a generic failure.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::StreamClosed`] after the stream has ended or
    /// failed, and [`ChainError::Sink`] if the sink rejects the chunk.
    pub fn write(&self, chunk: impl Into<Bytes>) -> ChainResult<()> {
        if self.inner.stream_closed.load(Ordering::Acquire) {
            return Err(ChainError::StreamClosed);
        }
        self.inner
            .sink
            .write(chunk.into())
            .map_err(|e| self.sink_failed(&e))
    }

    /// Ends the body stream.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::StreamClosed`] if the stream already ended or
    /// failed, and [`ChainError::Sink`] if the sink rejects the end.
    pub fn end(&self) -> ChainResult<()> {
        if self.inner.stream_closed.swap(true, Ordering::AcqRel) {
            return Err(ChainError::StreamClosed);
        }
        self.inner.sink.end().map_err(|e| self.sink_failed(&e))
    }

    /// Returns true once the chain has an outcome.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.latch.fired().is_some()
    }

    /// Returns the kind of the chain's outcome, if it has one.
    #[must_use]
    pub fn outcome_kind(&self) -> Option<OutcomeKind> {
        self.inner.latch.fired()
    }

    /// Returns true once the body stream has ended or failed.
    #[must_use]
    pub fn is_stream_closed(&self) -> bool {
        self.inner.stream_closed.load(Ordering::Acquire)
    }

    /// Returns the direction name of the chain this handle belongs to.
    #[must_use]
    pub fn direction(&self) -> &'static str {
        self.inner.direction
    }

    pub(crate) fn complete(&self) -> bool {
        self.inner.latch.fire(ChainOutcome::Success)
    }

    pub(crate) fn fail_uncaught(&self) -> bool {
        self.inner
            .latch
            .fire(ChainOutcome::Failed(ProcessorFailure::new(PolicyFailure::generic())))
    }

    fn sink_failed(&self, error: &SinkError) -> ChainError {
        warn!(
            direction = self.inner.direction,
            error = %error,
            "Stream sink failed, failing policy chain stream"
        );
        self.stream_fail_with(PolicyFailure::generic());
        ChainError::Sink(error.to_string())
    }
}

impl std::fmt::Debug for ChainHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainHandle")
            .field("direction", &self.inner.direction)
            .field("outcome", &self.inner.latch.fired())
            .field("stream_closed", &self.is_stream_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Completion;
    use http::StatusCode;

    fn handle_with(sink: Arc<dyn StreamSink>) -> (ChainHandle, Completion) {
        let (latch, completion) = CompletionLatch::channel();
        (ChainHandle::new(latch, sink, "request"), completion)
    }

    #[tokio::test]
    async fn test_fail_with_delivers_failure_verbatim() {
        let (handle, completion) = handle_with(Arc::new(BufferedSink::new()));

        let failure = PolicyFailure::new(StatusCode::FORBIDDEN)
            .with_message("denied")
            .with_key("API_KEY_INVALID");
        assert!(handle.fail_with(failure.clone()));
        assert!(!handle.fail_with(PolicyFailure::generic()));
        assert!(handle.is_terminated());

        let outcome = completion.await.unwrap();
        assert_eq!(outcome, ChainOutcome::Failed(ProcessorFailure::new(failure)));
    }

    #[tokio::test]
    async fn test_stream_fail_with_notifies_sink_and_closes_stream() {
        let sink = Arc::new(BufferedSink::new());
        let (handle, completion) = handle_with(sink.clone());

        handle.write("partial").unwrap();
        assert!(handle.stream_fail_with(PolicyFailure::new(StatusCode::BAD_GATEWAY)));

        assert_eq!(handle.write("more"), Err(ChainError::StreamClosed));
        assert_eq!(handle.end(), Err(ChainError::StreamClosed));
        assert_eq!(
            sink.failure().map(|f| f.status()),
            Some(StatusCode::BAD_GATEWAY)
        );
        assert_eq!(sink.body(), "partial");

        let outcome = completion.await.unwrap();
        assert_eq!(outcome.kind(), OutcomeKind::StreamFailed);
    }

    #[test]
    fn test_stream_fail_after_failure_leaves_sink_alone() {
        let sink = Arc::new(BufferedSink::new());
        let (handle, _completion) = handle_with(sink.clone());

        assert!(handle.fail_with(PolicyFailure::new(StatusCode::FORBIDDEN)));
        assert!(!handle.stream_fail_with(PolicyFailure::generic()));

        assert!(sink.failure().is_none());
        assert_eq!(handle.outcome_kind(), Some(OutcomeKind::Failed));
    }

    #[tokio::test]
    async fn test_sink_error_becomes_stream_failure() {
        let sink = Arc::new(BufferedSink::with_limit(4));
        let (handle, completion) = handle_with(sink.clone());

        let err = handle.write("too long").unwrap_err();
        assert!(matches!(err, ChainError::Sink(_)));
        assert!(handle.is_stream_closed());

        let outcome = completion.await.unwrap();
        assert_eq!(outcome.kind(), OutcomeKind::StreamFailed);
        assert_eq!(
            outcome.failure().map(ProcessorFailure::status),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
    }

    #[test]
    fn test_end_closes_stream() {
        let sink = Arc::new(BufferedSink::new());
        let (handle, _completion) = handle_with(sink.clone());

        handle.write("body").unwrap();
        handle.end().unwrap();

        assert!(sink.is_ended());
        assert_eq!(handle.write("late"), Err(ChainError::StreamClosed));
        assert!(!handle.is_terminated());
    }

    #[test]
    fn test_buffered_sink_rejects_after_end() {
        let sink = BufferedSink::new();
        sink.end().unwrap();
        assert_eq!(sink.write(Bytes::from_static(b"x")), Err(SinkError::Closed));
        assert_eq!(sink.end(), Err(SinkError::Closed));
    }

    #[tokio::test]
    async fn test_fail_with_from_spawned_task() {
        let (handle, completion) = handle_with(Arc::new(BufferedSink::new()));

        let remote = handle.clone();
        tokio::spawn(async move {
            remote.fail_with(PolicyFailure::new(StatusCode::GATEWAY_TIMEOUT));
        })
        .await
        .unwrap();

        assert_eq!(handle.outcome_kind(), Some(OutcomeKind::Failed));
        let outcome = completion.await.unwrap();
        assert_eq!(
            outcome.failure().map(ProcessorFailure::status),
            Some(StatusCode::GATEWAY_TIMEOUT)
        );
    }
}
