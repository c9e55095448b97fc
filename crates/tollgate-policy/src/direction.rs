//! Chain directions.
//!
//! A direction decides two things the engine itself never looks at: the
//! order in which a chain walks its policies, and which policy operation it
//! calls for each of them.

use crate::policy::{BoxFuture, Policy, SharedPolicy};
use crate::stream::ChainHandle;
use tollgate_core::{ExecutionContext, Traversal};

/// A chain variant.
pub trait ChainDirection: Send + Sync + 'static {
    /// Returns the direction name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Returns the policies in the order the chain must run them.
    ///
    /// Called once, when the chain is built.
    fn order(&self, policies: &[SharedPolicy]) -> Vec<SharedPolicy>;

    /// Invokes one policy.
    fn invoke<'a>(
        &self,
        policy: &'a dyn Policy,
        ctx: &'a mut ExecutionContext,
        chain: &'a ChainHandle,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

fn ordered(policies: &[SharedPolicy], traversal: Traversal) -> Vec<SharedPolicy> {
    match traversal {
        Traversal::Forward => policies.to_vec(),
        Traversal::Reverse => policies.iter().rev().cloned().collect(),
    }
}

/// The request path: policies run in insertion order through
/// [`Policy::on_request`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestDirection;

impl ChainDirection for RequestDirection {
    fn name(&self) -> &'static str {
        "request"
    }

    fn order(&self, policies: &[SharedPolicy]) -> Vec<SharedPolicy> {
        ordered(policies, Traversal::Forward)
    }

    fn invoke<'a>(
        &self,
        policy: &'a dyn Policy,
        ctx: &'a mut ExecutionContext,
        chain: &'a ChainHandle,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        policy.on_request(ctx, chain)
    }
}

/// The response path: policies run through [`Policy::on_response`], last
/// to first unless configured otherwise.
#[derive(Debug, Clone, Copy)]
pub struct ResponseDirection {
    traversal: Traversal,
}

impl ResponseDirection {
    /// Creates a response direction with the given traversal.
    #[must_use]
    pub const fn new(traversal: Traversal) -> Self {
        Self { traversal }
    }

    /// Returns the configured traversal.
    #[must_use]
    pub const fn traversal(&self) -> Traversal {
        self.traversal
    }
}

impl Default for ResponseDirection {
    fn default() -> Self {
        Self::new(Traversal::Reverse)
    }
}

impl ChainDirection for ResponseDirection {
    fn name(&self) -> &'static str {
        "response"
    }

    fn order(&self, policies: &[SharedPolicy]) -> Vec<SharedPolicy> {
        ordered(policies, self.traversal)
    }

    fn invoke<'a>(
        &self,
        policy: &'a dyn Policy,
        ctx: &'a mut ExecutionContext,
        chain: &'a ChainHandle,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        policy.on_response(ctx, chain)
    }
}
