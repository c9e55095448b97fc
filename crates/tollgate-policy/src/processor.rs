//! The chain processor.
//!
//! [`ChainProcessor`] is the integration point for the gateway's request
//! pipeline. It holds the configured request and response policy sets,
//! builds a fresh chain for every call, drives it to its outcome, and
//! reports the outcome to the metrics recorder.

use crate::chain::PolicyChain;
use crate::completion::{ChainOutcome, Completion};
use crate::direction::{ChainDirection, ResponseDirection};
use crate::policy::PolicySet;
use std::time::Instant;
use tollgate_config::ChainSettings;
use tollgate_core::{ChainResult, ExecutionContext, ExecutionStatus};
use tollgate_telemetry::metrics::{
    record_chain_outcome, record_policy_execution, record_policy_skipped,
    record_uncaught_failure, InFlightGuard,
};
use tracing::debug;

/// Runs a gateway's request and response policy chains.
///
/// # Example
///
/// ```ignore
/// let processor = ChainProcessor::new(request_policies, response_policies)
///     .with_settings(config.chain.clone());
///
/// let outcome = processor.process_request(&mut ctx).await?;
/// if let Some(rejection) = outcome.into_response() {
///     return Ok(rejection);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChainProcessor {
    request_policies: PolicySet,
    response_policies: PolicySet,
    settings: ChainSettings,
}

impl ChainProcessor {
    /// Creates a processor with default chain settings.
    #[must_use]
    pub fn new(request_policies: PolicySet, response_policies: PolicySet) -> Self {
        Self {
            request_policies,
            response_policies,
            settings: ChainSettings::default(),
        }
    }

    /// Replaces the chain settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ChainSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the chain settings.
    #[must_use]
    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    /// Returns the request-direction policies.
    #[must_use]
    pub fn request_policies(&self) -> &PolicySet {
        &self.request_policies
    }

    /// Returns the response-direction policies.
    #[must_use]
    pub fn response_policies(&self) -> &PolicySet {
        &self.response_policies
    }

    /// Runs the request policies against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`](tollgate_core::ChainError) only if the chain
    /// machinery itself breaks; policy failures are outcomes.
    pub async fn process_request(&self, ctx: &mut ExecutionContext) -> ChainResult<ChainOutcome> {
        let (chain, completion) = PolicyChain::request(self.request_policies.as_slice());
        self.drive(chain, completion, ctx).await
    }

    /// Runs the response policies against `ctx`, in the configured traversal.
    ///
    /// # Errors
    ///
    /// See [`ChainProcessor::process_request`].
    pub async fn process_response(&self, ctx: &mut ExecutionContext) -> ChainResult<ChainOutcome> {
        let (chain, completion) = PolicyChain::new(
            self.response_policies.as_slice(),
            ResponseDirection::new(self.settings.response_traversal),
        );
        self.drive(chain, completion, ctx).await
    }

    async fn drive<D: ChainDirection>(
        &self,
        chain: PolicyChain<D>,
        mut completion: Completion,
        ctx: &mut ExecutionContext,
    ) -> ChainResult<ChainOutcome> {
        let direction = chain.direction();
        let _in_flight = self
            .settings
            .record_metrics
            .then(|| InFlightGuard::new(direction));
        let first_execution = ctx.metrics().executions().len();
        let started = Instant::now();

        let mut chain = chain.with_diagnostics(self.settings.capture_diagnostics);
        let early = {
            let run = chain.start(ctx);
            tokio::pin!(run);

            // An outcome fired from outside the chain (a policy's spawned
            // task, a deadline) answers the request even if the running
            // policy never returns.
            tokio::select! {
                biased;
                outcome = &mut completion => Some(outcome),
                state = &mut run => {
                    state?;
                    None
                }
            }
        };
        let outcome = match early {
            Some(outcome) => outcome?,
            None => completion.await?,
        };

        let elapsed = started.elapsed();
        let kind = outcome.kind();

        if self.settings.record_metrics {
            for execution in ctx.metrics().executions().iter().skip(first_execution) {
                match execution.status {
                    ExecutionStatus::Skipped => record_policy_skipped(direction, &execution.policy),
                    status => {
                        record_policy_execution(
                            direction,
                            &execution.policy,
                            status.as_str(),
                            execution.elapsed,
                        );
                        if status == ExecutionStatus::Errored {
                            record_uncaught_failure(direction, &execution.policy);
                        }
                    }
                }
            }
            record_chain_outcome(direction, kind.as_str(), elapsed);
        }

        debug!(
            request_id = %ctx.request_id(),
            direction,
            outcome = kind.as_str(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Policy chain finished"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{FnPolicy, SharedPolicy};
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use std::sync::Arc;
    use tollgate_core::{PolicyFailure, Traversal};

    fn context() -> ExecutionContext {
        ExecutionContext::new(http::Request::new(Full::new(Bytes::new())))
    }

    fn appender(id: &'static str) -> SharedPolicy {
        Arc::new(FnPolicy::new(id, move |ctx, _| {
            let mut seen = ctx
                .attribute("seen")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            seen.push_str(id);
            ctx.set_attribute("seen", seen);
            Ok(())
        }))
    }

    fn seen(ctx: &ExecutionContext) -> &str {
        ctx.attribute("seen").and_then(|v| v.as_str()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_process_request_and_response() {
        let set: PolicySet = ["a", "b", "c"].into_iter().map(appender).collect();
        let processor = ChainProcessor::new(set.clone(), set);

        let mut request_ctx = context();
        let outcome = processor.process_request(&mut request_ctx).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(seen(&request_ctx), "abc");

        let mut response_ctx = context();
        let outcome = processor.process_response(&mut response_ctx).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(seen(&response_ctx), "cba");
    }

    #[tokio::test]
    async fn test_forward_response_traversal() {
        let set: PolicySet = ["a", "b"].into_iter().map(appender).collect();
        let processor = ChainProcessor::new(PolicySet::empty(), set).with_settings(ChainSettings {
            response_traversal: Traversal::Forward,
            ..ChainSettings::default()
        });

        let mut ctx = context();
        processor.process_response(&mut ctx).await.unwrap();
        assert_eq!(seen(&ctx), "ab");
    }

    #[tokio::test]
    async fn test_failure_outcome_renders_response() {
        let deny: SharedPolicy = Arc::new(FnPolicy::new("deny", |_, chain| {
            chain.fail_with(
                PolicyFailure::new(StatusCode::UNAUTHORIZED)
                    .with_key("API_KEY_MISSING")
                    .with_message("missing api key"),
            );
            Ok(())
        }));
        let processor = ChainProcessor::new(PolicySet::new(vec![deny]), PolicySet::empty());

        let mut ctx = context();
        let outcome = processor.process_request(&mut ctx).await.unwrap();
        let response = outcome.into_response().unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_processor_without_metrics() {
        let processor = ChainProcessor::default().with_settings(ChainSettings {
            record_metrics: false,
            ..ChainSettings::default()
        });

        let mut ctx = context();
        let outcome = processor.process_request(&mut ctx).await.unwrap();
        assert_eq!(outcome, ChainOutcome::Success);
        assert!(processor.request_policies().is_empty());
    }
}
