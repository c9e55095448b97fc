//! Single-shot chain completion.
//!
//! A chain has exactly one terminal outcome. It is delivered once, through
//! one channel, as a [`ChainOutcome`]. The [`Completion`] future is handed
//! out by the chain constructor, so a caller cannot forget to register for
//! it before the chain starts.
//!
//! The at-most-once guarantee lives in the latch shared by the chain and
//! every [`ChainHandle`](crate::ChainHandle): whichever path fires first
//! wins, and every later attempt is ignored.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tollgate_core::types::Response;
use tollgate_core::{ChainError, ChainResult, PolicyResult, ProcessorFailure};
use tracing::warn;

/// The terminal outcome of a policy chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    /// Every runnable policy completed; the request proceeds.
    Success,
    /// The chain was short-circuited by a control-flow failure.
    Failed(ProcessorFailure),
    /// The body stream being forwarded through the chain failed.
    StreamFailed(ProcessorFailure),
}

impl ChainOutcome {
    /// Returns the outcome's kind.
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success => OutcomeKind::Success,
            Self::Failed(_) => OutcomeKind::Failed,
            Self::StreamFailed(_) => OutcomeKind::StreamFailed,
        }
    }

    /// Returns true for [`ChainOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns the carried failure for either failure kind.
    #[must_use]
    pub const fn failure(&self) -> Option<&ProcessorFailure> {
        match self {
            Self::Success => None,
            Self::Failed(failure) | Self::StreamFailed(failure) => Some(failure),
        }
    }

    /// Converts the outcome into the policy result it represents.
    #[must_use]
    pub fn into_result(self) -> PolicyResult {
        match self {
            Self::Success => PolicyResult::Success,
            Self::Failed(failure) | Self::StreamFailed(failure) => {
                PolicyResult::Failure(failure.into_failure())
            }
        }
    }

    /// Renders a failure as the client response.
    ///
    /// Returns `None` on success, where the request proceeds instead.
    #[must_use]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Success => None,
            Self::Failed(failure) | Self::StreamFailed(failure) => Some(failure.into_response()),
        }
    }
}

/// The kind of a [`ChainOutcome`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    /// See [`ChainOutcome::Success`].
    Success,
    /// See [`ChainOutcome::Failed`].
    Failed,
    /// See [`ChainOutcome::StreamFailed`].
    StreamFailed,
}

impl OutcomeKind {
    /// Returns the label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::StreamFailed => "stream_failed",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct LatchState {
    sender: Option<oneshot::Sender<ChainOutcome>>,
    fired: Option<OutcomeKind>,
}

/// Fires a chain's outcome at most once.
pub(crate) struct CompletionLatch {
    state: Mutex<LatchState>,
}

impl CompletionLatch {
    /// Creates a latch and the future that receives its outcome.
    pub(crate) fn channel() -> (Self, Completion) {
        let (sender, receiver) = oneshot::channel();
        let latch = Self {
            state: Mutex::new(LatchState {
                sender: Some(sender),
                fired: None,
            }),
        };
        (latch, Completion { receiver })
    }

    /// Delivers `outcome` unless an outcome was already delivered.
    ///
    /// Returns whether this call fired the latch.
    pub(crate) fn fire(&self, outcome: ChainOutcome) -> bool {
        let mut state = self.state.lock();
        if state.fired.is_some() {
            return false;
        }
        state.fired = Some(outcome.kind());
        if let Some(sender) = state.sender.take() {
            // A dropped receiver means nobody is waiting; the chain still terminates.
            let _ = sender.send(outcome);
        }
        true
    }

    /// Returns the kind of the delivered outcome, if any.
    pub(crate) fn fired(&self) -> Option<OutcomeKind> {
        self.state.lock().fired
    }
}

impl std::fmt::Debug for CompletionLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionLatch")
            .field("fired", &self.fired())
            .finish()
    }
}

/// Resolves to the chain's outcome.
///
/// Resolves to [`ChainError::Abandoned`] if the chain and every handle to it
/// were dropped without an outcome being fired.
#[derive(Debug)]
#[must_use = "a chain's outcome is only observable through its Completion"]
pub struct Completion {
    receiver: oneshot::Receiver<ChainOutcome>,
}

impl Completion {
    /// Returns the outcome if it has already been fired, without waiting.
    ///
    /// Returns `None` while the chain is still pending. Once an outcome has
    /// been taken, later calls report [`ChainError::Abandoned`].
    pub fn try_outcome(&mut self) -> Option<ChainResult<ChainOutcome>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(Ok(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ChainError::Abandoned)),
        }
    }

    /// Waits for the outcome and routes it to exactly one handler.
    ///
    /// Returns the kind of outcome that was dispatched.
    pub async fn dispatch(self, handlers: CompletionHandlers) -> ChainResult<OutcomeKind> {
        let outcome = self.await?;
        let kind = outcome.kind();
        handlers.handle(outcome);
        Ok(kind)
    }
}

impl Future for Completion {
    type Output = ChainResult<ChainOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| ChainError::Abandoned))
    }
}

type SuccessHandler = Box<dyn FnOnce() + Send>;
type FailureHandler = Box<dyn FnOnce(ProcessorFailure) + Send>;

/// Callback-style completion handlers.
///
/// The success handler is required at construction: a chain that succeeds
/// with nobody to tell would leave the request hanging. Failure handlers
/// are optional; an unhandled failure is logged and dropped.
///
/// # Example
///
/// ```ignore
/// let handlers = CompletionHandlers::new(|| forward_upstream())
///     .on_failure(|failure| reject(failure.into_response()))
///     .on_stream_failure(|failure| abort_stream(failure));
///
/// completion.dispatch(handlers).await?;
/// ```
pub struct CompletionHandlers {
    on_success: SuccessHandler,
    on_failure: Option<FailureHandler>,
    on_stream_failure: Option<FailureHandler>,
}

impl CompletionHandlers {
    /// Creates handlers with the given success handler.
    pub fn new<F>(on_success: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            on_success: Box::new(on_success),
            on_failure: None,
            on_stream_failure: None,
        }
    }

    /// Sets the control-flow failure handler.
    pub fn on_failure<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(ProcessorFailure) + Send + 'static,
    {
        self.on_failure = Some(Box::new(handler));
        self
    }

    /// Sets the stream failure handler.
    pub fn on_stream_failure<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(ProcessorFailure) + Send + 'static,
    {
        self.on_stream_failure = Some(Box::new(handler));
        self
    }

    /// Invokes the handler matching `outcome`.
    pub fn handle(self, outcome: ChainOutcome) {
        let kind = outcome.kind();
        let (handler, failure) = match outcome {
            ChainOutcome::Success => {
                (self.on_success)();
                return;
            }
            ChainOutcome::Failed(failure) => (self.on_failure, failure),
            ChainOutcome::StreamFailed(failure) => (self.on_stream_failure, failure),
        };

        match handler {
            Some(handler) => handler(failure),
            None => warn!(
                outcome = kind.as_str(),
                status = failure.status().as_u16(),
                "No handler registered for policy chain failure, dropping it"
            ),
        }
    }
}

impl std::fmt::Debug for CompletionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandlers")
            .field("on_failure", &self.on_failure.is_some())
            .field("on_stream_failure", &self.on_stream_failure.is_some())
            .finish_non_exhaustive()
    }
}
