//! Per-request metrics recorder.

use std::time::Duration;

/// How a single policy took part in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    /// The policy ran and the chain continued.
    Completed,
    /// The policy was not runnable and was skipped.
    Skipped,
    /// The policy terminated the chain with an explicit failure.
    Failed,
    /// The policy returned an error or panicked.
    Errored,
}

impl ExecutionStatus {
    /// Returns the status label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Errored => "errored",
        }
    }
}

/// One policy's execution record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyExecution {
    /// The policy identifier.
    pub policy: String,
    /// The chain direction the policy ran in (e.g. "request").
    pub direction: &'static str,
    /// How the policy took part in the chain.
    pub status: ExecutionStatus,
    /// Time spent in the policy. Zero for skipped policies.
    pub elapsed: Duration,
}

impl PolicyExecution {
    /// Creates a record for a policy that was invoked.
    #[must_use]
    pub fn new(
        policy: impl Into<String>,
        direction: &'static str,
        status: ExecutionStatus,
        elapsed: Duration,
    ) -> Self {
        Self {
            policy: policy.into(),
            direction,
            status,
            elapsed,
        }
    }

    /// Creates a record for a policy that was not runnable.
    #[must_use]
    pub fn skipped(policy: impl Into<String>, direction: &'static str) -> Self {
        Self::new(policy, direction, ExecutionStatus::Skipped, Duration::ZERO)
    }
}

/// Diagnostics recorded while a request flows through its policy chains.
///
/// The message slot receives the full diagnostic detail of an uncaught
/// policy failure. That detail never reaches the client; it exists for
/// the gateway's logs and reporters.
#[derive(Debug, Clone, Default)]
pub struct RequestMetrics {
    message: Option<String>,
    executions: Vec<PolicyExecution>,
}

impl RequestMetrics {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the diagnostic message, replacing any previous one.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Returns the diagnostic message, if set.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Appends a policy execution record.
    pub fn record_execution(&mut self, execution: PolicyExecution) {
        self.executions.push(execution);
    }

    /// Returns all policy execution records in the order they were made.
    #[must_use]
    pub fn executions(&self) -> &[PolicyExecution] {
        &self.executions
    }

    /// Returns the total time spent in invoked policies.
    #[must_use]
    pub fn total_policy_time(&self) -> Duration {
        self.executions.iter().map(|e| e.elapsed).sum()
    }
}
