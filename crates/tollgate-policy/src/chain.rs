//! The policy chain engine.
//!
//! A [`PolicyChain`] drives one request's policies for one direction, one
//! policy at a time, and resolves to a single [`ChainOutcome`]:
//!
//! ```text
//!            advance                     list exhausted
//! Pending ───────────▶ Running ─────────────────────────────▶ Succeeded
//!                        │  │
//!                        │  └─ fail_with / Err / panic ─────▶ Failed
//!                        └──── stream_fail_with / sink error ▶ StreamFailed
//! ```
//!
//! Policies are walked with an explicit cursor in a loop, so a long list of
//! policies that finish immediately never grows the stack. The latch is
//! checked before every policy and after every invocation, which stops the
//! chain at the next boundary when a failure is fired from elsewhere, for
//! example from a task a policy spawned.
//!
//! [`ChainOutcome`]: crate::ChainOutcome

use crate::completion::{Completion, CompletionLatch, OutcomeKind};
use crate::direction::{ChainDirection, RequestDirection, ResponseDirection};
use crate::policy::SharedPolicy;
use crate::stream::{BufferedSink, ChainHandle, StreamSink};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tollgate_core::{
    ChainError, ChainResult, ExecutionContext, ExecutionStatus, PolicyExecution, Traversal,
};
use tracing::{debug, error};

/// The lifecycle state of a [`PolicyChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainState {
    /// Built, not yet advanced.
    Pending,
    /// Advancing through its policies.
    Running,
    /// Every runnable policy completed.
    Succeeded,
    /// Terminated by a control-flow failure.
    Failed,
    /// Terminated by a body-stream failure.
    StreamFailed,
}

impl ChainState {
    /// Returns true for the three terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::StreamFailed)
    }

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::StreamFailed => "stream_failed",
        }
    }
}

impl From<OutcomeKind> for ChainState {
    fn from(kind: OutcomeKind) -> Self {
        match kind {
            OutcomeKind::Success => Self::Succeeded,
            OutcomeKind::Failed => Self::Failed,
            OutcomeKind::StreamFailed => Self::StreamFailed,
        }
    }
}

impl std::fmt::Display for ChainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-use policy chain.
///
/// Built per request and direction, advanced to a terminal state, then
/// dropped. `advance` takes `&mut self`, so a chain can never be advanced
/// from two places at once; its future is `Send`, so it may resume on any
/// runtime worker after a policy suspends.
///
/// # Example
///
/// ```ignore
/// let (mut chain, completion) = PolicyChain::request(policies.as_slice());
/// chain.start(&mut ctx).await?;
///
/// match completion.await? {
///     ChainOutcome::Success => forward_upstream(ctx).await,
///     failure => reject(failure.into_response()),
/// }
/// ```
pub struct PolicyChain<D = RequestDirection> {
    policies: Arc<[SharedPolicy]>,
    cursor: usize,
    started: bool,
    direction: D,
    handle: ChainHandle,
    capture_diagnostics: bool,
}

impl<D: ChainDirection> PolicyChain<D> {
    /// Builds a chain over a snapshot of `policies`, ordered by `direction`.
    ///
    /// Body bytes written by policies go to an in-memory [`BufferedSink`].
    pub fn new(policies: &[SharedPolicy], direction: D) -> (Self, Completion) {
        Self::with_sink(policies, direction, Arc::new(BufferedSink::new()))
    }

    /// Builds a chain that forwards body bytes to `sink`.
    pub fn with_sink(
        policies: &[SharedPolicy],
        direction: D,
        sink: Arc<dyn StreamSink>,
    ) -> (Self, Completion) {
        let (latch, completion) = CompletionLatch::channel();
        let handle = ChainHandle::new(latch, sink, direction.name());
        let chain = Self {
            policies: direction.order(policies).into(),
            cursor: 0,
            started: false,
            direction,
            handle,
            capture_diagnostics: true,
        };
        (chain, completion)
    }

    /// Sets whether uncaught failure detail is written to the request metrics.
    pub fn with_diagnostics(mut self, capture: bool) -> Self {
        self.capture_diagnostics = capture;
        self
    }

    /// Returns a handle to this chain.
    ///
    /// A surrounding pipeline can use it to fail the chain from outside,
    /// for instance when a deadline expires.
    #[must_use]
    pub fn handle(&self) -> &ChainHandle {
        &self.handle
    }

    /// Returns the direction name.
    #[must_use]
    pub fn direction(&self) -> &'static str {
        self.direction.name()
    }

    /// Returns the number of policies in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns true if the chain has no policies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Returns the number of policies already taken from the list.
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ChainState {
        match self.handle.outcome_kind() {
            Some(kind) => kind.into(),
            None if self.started => ChainState::Running,
            None => ChainState::Pending,
        }
    }

    /// Starts a pending chain and advances it to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::AlreadyStarted`] unless the chain is pending.
    pub async fn start(&mut self, ctx: &mut ExecutionContext) -> ChainResult<ChainState> {
        if self.state() != ChainState::Pending {
            return Err(ChainError::AlreadyStarted);
        }
        Ok(self.advance(ctx).await)
    }

    /// Advances the chain until it reaches a terminal state.
    ///
    /// Each policy is checked for runnability and either skipped or invoked.
    /// A policy that returns `Ok` hands control to the next one. When the
    /// list is exhausted the chain succeeds.
    ///
    /// Calling this on a terminated chain does nothing and returns the
    /// terminal state.
    pub async fn advance(&mut self, ctx: &mut ExecutionContext) -> ChainState {
        self.started = true;
        let direction = self.direction.name();

        while let Some(policy) = self.next_policy() {
            let policy_id = policy.id();

            let runnable = panic::catch_unwind(AssertUnwindSafe(|| policy.is_runnable(ctx)));
            match runnable {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        request_id = %ctx.request_id(),
                        policy = policy_id,
                        direction,
                        "Skipping policy, not runnable"
                    );
                    ctx.metrics_mut()
                        .record_execution(PolicyExecution::skipped(policy_id, direction));
                    continue;
                }
                Err(payload) => {
                    let diagnostic =
                        format!("runnability check panicked: {}", panic_message(&*payload));
                    self.contain(policy_id, diagnostic, ctx);
                    ctx.metrics_mut().record_execution(PolicyExecution::new(
                        policy_id,
                        direction,
                        ExecutionStatus::Errored,
                        Duration::ZERO,
                    ));
                    break;
                }
            }

            debug!(
                request_id = %ctx.request_id(),
                policy = policy_id,
                direction,
                "Invoking policy"
            );

            let started = Instant::now();
            let result = {
                let strategy = &self.direction;
                let handle = &self.handle;
                let policy = &*policy;
                // Deferred so a panic raised while building the policy's future is caught too.
                AssertUnwindSafe(async { strategy.invoke(policy, ctx, handle).await })
                    .catch_unwind()
                    .await
            };
            let elapsed = started.elapsed();

            let status = match result {
                Ok(Ok(())) if self.handle.is_terminated() => ExecutionStatus::Failed,
                Ok(Ok(())) => ExecutionStatus::Completed,
                Ok(Err(err)) => {
                    self.contain(policy_id, format!("{err:?}"), ctx);
                    ExecutionStatus::Errored
                }
                Err(payload) => {
                    let diagnostic = format!("policy panicked: {}", panic_message(&*payload));
                    self.contain(policy_id, diagnostic, ctx);
                    ExecutionStatus::Errored
                }
            };

            ctx.metrics_mut()
                .record_execution(PolicyExecution::new(policy_id, direction, status, elapsed));
        }

        if self.handle.complete() {
            debug!(
                request_id = %ctx.request_id(),
                direction,
                policies = self.policies.len(),
                "Policy chain completed"
            );
        }

        self.state()
    }

    /// Takes the next policy, or `None` once the chain has an outcome or the
    /// list is exhausted.
    fn next_policy(&mut self) -> Option<SharedPolicy> {
        if self.handle.is_terminated() {
            return None;
        }
        let policy = self.policies.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(policy)
    }

    /// Handles an uncaught policy failure.
    ///
    /// The detail goes to the log and, when enabled, to the request metrics;
    /// the caller only ever sees the generic failure.
    fn contain(&self, policy_id: &str, diagnostic: String, ctx: &mut ExecutionContext) {
        error!(
            request_id = %ctx.request_id(),
            policy = policy_id,
            direction = self.direction.name(),
            error = %diagnostic,
            "Unexpected error while running policy"
        );
        if self.capture_diagnostics {
            ctx.metrics_mut().set_message(diagnostic);
        }
        self.handle.fail_uncaught();
    }
}

impl PolicyChain<RequestDirection> {
    /// Builds a request-direction chain.
    pub fn request(policies: &[SharedPolicy]) -> (Self, Completion) {
        Self::new(policies, RequestDirection)
    }
}

impl PolicyChain<ResponseDirection> {
    /// Builds a response-direction chain with the given traversal.
    pub fn response(policies: &[SharedPolicy], traversal: Traversal) -> (Self, Completion) {
        Self::new(policies, ResponseDirection::new(traversal))
    }
}

impl<D: ChainDirection> std::fmt::Debug for PolicyChain<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyChain")
            .field("direction", &self.direction.name())
            .field("policies", &self.policies.len())
            .field("cursor", &self.cursor)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ChainOutcome;
    use crate::policy::{BoxFuture, FnPolicy, Policy};
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use parking_lot::Mutex;
    use tollgate_core::{PolicyFailure, ProcessorFailure};

    fn context() -> ExecutionContext {
        ExecutionContext::new(http::Request::new(Full::new(Bytes::new())))
    }

    type Trace = Arc<Mutex<Vec<String>>>;

    fn recording(id: &str, trace: &Trace) -> SharedPolicy {
        let trace = Arc::clone(trace);
        let name = id.to_string();
        Arc::new(FnPolicy::new(id, move |_, _| {
            trace.lock().push(name.clone());
            Ok(())
        }))
    }

    #[tokio::test]
    async fn test_runs_in_order_then_succeeds() {
        let trace = Trace::default();
        let policies = vec![recording("a", &trace), recording("b", &trace)];
        let mut ctx = context();

        let (mut chain, completion) = PolicyChain::request(&policies);
        assert_eq!(chain.state(), ChainState::Pending);

        let state = chain.start(&mut ctx).await.unwrap();
        assert_eq!(state, ChainState::Succeeded);
        assert_eq!(*trace.lock(), ["a", "b"]);
        assert_eq!(completion.await.unwrap(), ChainOutcome::Success);

        let statuses: Vec<_> = ctx.metrics().executions().iter().map(|e| e.status).collect();
        assert_eq!(statuses, [ExecutionStatus::Completed, ExecutionStatus::Completed]);
    }

    #[tokio::test]
    async fn test_empty_chain_succeeds() {
        let mut ctx = context();
        let (mut chain, completion) = PolicyChain::request(&[]);

        assert!(chain.is_empty());
        assert_eq!(chain.start(&mut ctx).await.unwrap(), ChainState::Succeeded);
        assert_eq!(completion.await.unwrap(), ChainOutcome::Success);
    }

    #[tokio::test]
    async fn test_error_becomes_generic_failure() {
        let trace = Trace::default();
        let policies: Vec<SharedPolicy> = vec![
            Arc::new(FnPolicy::new("broken", |_, _| Err(anyhow::anyhow!("x")))),
            recording("after", &trace),
        ];
        let mut ctx = context();

        let (mut chain, completion) = PolicyChain::request(&policies);
        assert_eq!(chain.start(&mut ctx).await.unwrap(), ChainState::Failed);

        let outcome = completion.await.unwrap();
        assert_eq!(
            outcome,
            ChainOutcome::Failed(ProcessorFailure::new(PolicyFailure::generic()))
        );
        assert!(ctx.metrics().message().unwrap().contains('x'));
        assert!(trace.lock().is_empty());
        assert_eq!(ctx.metrics().executions()[0].status, ExecutionStatus::Errored);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let policies: Vec<SharedPolicy> = vec![Arc::new(FnPolicy::new("panics", |_, _| {
            panic!("boom");
        }))];
        let mut ctx = context();

        let (mut chain, completion) = PolicyChain::request(&policies);
        assert_eq!(chain.start(&mut ctx).await.unwrap(), ChainState::Failed);

        let outcome = completion.await.unwrap();
        assert_eq!(
            outcome.failure().map(ProcessorFailure::status),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert!(outcome.failure().and_then(ProcessorFailure::message).is_none());
        assert!(ctx.metrics().message().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_diagnostics_can_be_disabled() {
        let policies: Vec<SharedPolicy> = vec![Arc::new(FnPolicy::new("broken", |_, _| {
            Err(anyhow::anyhow!("secret detail"))
        }))];
        let mut ctx = context();

        let (chain, _completion) = PolicyChain::request(&policies);
        let mut chain = chain.with_diagnostics(false);
        chain.start(&mut ctx).await.unwrap();

        assert!(ctx.metrics().message().is_none());
    }

    #[tokio::test]
    async fn test_fail_with_stops_the_chain() {
        let trace = Trace::default();
        let policies: Vec<SharedPolicy> = vec![
            Arc::new(FnPolicy::new("deny", |_, chain| {
                chain.fail_with(PolicyFailure::new(StatusCode::FORBIDDEN).with_message("denied"));
                Ok(())
            })),
            recording("after", &trace),
        ];
        let mut ctx = context();

        let (mut chain, completion) = PolicyChain::request(&policies);
        assert_eq!(chain.start(&mut ctx).await.unwrap(), ChainState::Failed);

        let outcome = completion.await.unwrap();
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.status(), StatusCode::FORBIDDEN);
        assert_eq!(failure.message(), Some("denied"));
        assert!(trace.lock().is_empty());
        assert_eq!(chain.position(), 1);
        assert!(ctx.metrics().message().is_none());
    }

    #[tokio::test]
    async fn test_stream_fail_with_only_fires_stream_failure() {
        let policies: Vec<SharedPolicy> = vec![
            Arc::new(FnPolicy::new("transform", |_, chain| {
                chain.write("partial")?;
                chain.stream_fail_with(PolicyFailure::new(StatusCode::BAD_GATEWAY));
                chain.fail_with(PolicyFailure::new(StatusCode::FORBIDDEN));
                Ok(())
            })),
        ];
        let sink = Arc::new(BufferedSink::new());
        let mut ctx = context();

        let (mut chain, completion) = PolicyChain::with_sink(&policies, RequestDirection, sink.clone());
        assert_eq!(chain.start(&mut ctx).await.unwrap(), ChainState::StreamFailed);

        let outcome = completion.await.unwrap();
        assert_eq!(outcome.kind(), OutcomeKind::StreamFailed);
        assert_eq!(
            outcome.failure().map(ProcessorFailure::status),
            Some(StatusCode::BAD_GATEWAY)
        );
        assert_eq!(sink.body(), "partial");
        assert!(sink.failure().is_some());
    }

    #[tokio::test]
    async fn test_not_runnable_is_skipped() {
        let trace = Trace::default();
        let skipped = FnPolicy::new("skipped", |_, _| panic!("must not run")).when(|_| false);
        let policies: Vec<SharedPolicy> = vec![
            recording("a", &trace),
            Arc::new(skipped),
            recording("c", &trace),
        ];
        let mut ctx = context();

        let (mut chain, completion) = PolicyChain::request(&policies);
        chain.start(&mut ctx).await.unwrap();

        assert_eq!(*trace.lock(), ["a", "c"]);
        assert_eq!(completion.await.unwrap(), ChainOutcome::Success);
        assert_eq!(ctx.metrics().executions()[1].status, ExecutionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_panicking_runnability_check_is_contained() {
        let policies: Vec<SharedPolicy> = vec![Arc::new(
            FnPolicy::new("odd", |_, _| Ok(())).when(|_| panic!("bad predicate")),
        )];
        let mut ctx = context();

        let (mut chain, completion) = PolicyChain::request(&policies);
        assert_eq!(chain.start(&mut ctx).await.unwrap(), ChainState::Failed);
        assert!(completion.await.unwrap().failure().is_some());
        assert!(ctx.metrics().message().unwrap().contains("bad predicate"));
    }

    #[tokio::test]
    async fn test_advance_after_terminal_is_noop() {
        let trace = Trace::default();
        let policies = vec![recording("a", &trace)];
        let mut ctx = context();

        let (mut chain, _completion) = PolicyChain::request(&policies);
        chain.start(&mut ctx).await.unwrap();

        assert_eq!(chain.advance(&mut ctx).await, ChainState::Succeeded);
        assert_eq!(chain.start(&mut ctx).await, Err(ChainError::AlreadyStarted));
        assert_eq!(trace.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_response_chain_runs_reverse() {
        let trace = Trace::default();
        let policies = vec![recording("a", &trace), recording("b", &trace)];
        let mut ctx = context();

        let (mut chain, _completion) = PolicyChain::response(&policies, Traversal::Reverse);
        assert_eq!(chain.direction(), "response");
        chain.start(&mut ctx).await.unwrap();

        assert_eq!(*trace.lock(), ["b", "a"]);
    }

    struct RequestOnly;

    impl Policy for RequestOnly {
        fn id(&self) -> &str {
            "request-only"
        }

        fn on_request<'a>(
            &'a self,
            ctx: &'a mut ExecutionContext,
            _chain: &'a ChainHandle,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                ctx.set_attribute("request-only", true);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_direction_selects_operation() {
        let policies: Vec<SharedPolicy> = vec![Arc::new(RequestOnly)];

        let mut ctx = context();
        let (mut chain, _completion) = PolicyChain::request(&policies);
        chain.start(&mut ctx).await.unwrap();
        assert!(ctx.has_attribute("request-only"));

        let mut ctx = context();
        let (mut chain, completion) = PolicyChain::response(&policies, Traversal::Reverse);
        chain.start(&mut ctx).await.unwrap();
        assert!(!ctx.has_attribute("request-only"));
        assert_eq!(completion.await.unwrap(), ChainOutcome::Success);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }
}
