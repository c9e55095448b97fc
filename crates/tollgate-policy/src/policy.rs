//! The policy capability and policy lists.
//!
//! A [`Policy`] is one element of a chain: authentication, rate limiting,
//! transformation, and so on. The engine only needs two things from it:
//! whether it can run for the current context, and a way to run it.
//!
//! # Example
//!
//! ```ignore
//! use tollgate_policy::{BoxFuture, ChainHandle, Policy};
//! use tollgate_core::{ExecutionContext, PolicyFailure};
//! use http::StatusCode;
//!
//! struct ApiKey;
//!
//! impl Policy for ApiKey {
//!     fn id(&self) -> &str {
//!         "api-key"
//!     }
//!
//!     fn on_request<'a>(
//!         &'a self,
//!         ctx: &'a mut ExecutionContext,
//!         chain: &'a ChainHandle,
//!     ) -> BoxFuture<'a, anyhow::Result<()>> {
//!         Box::pin(async move {
//!             if !ctx.request().headers().contains_key("x-api-key") {
//!                 chain.fail_with(PolicyFailure::new(StatusCode::UNAUTHORIZED));
//!             }
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use crate::stream::ChainHandle;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tollgate_core::ExecutionContext;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A policy shared across every chain that runs it.
pub type SharedPolicy = Arc<dyn Policy>;

/// One element of a policy chain.
///
/// Policies are shared read-only across all in-flight chains, so they must
/// not hold per-request state. Anything a policy needs to remember for the
/// current request goes into the [`ExecutionContext`].
///
/// # Outcomes
///
/// - Returning `Ok(())` lets the chain continue with the next policy.
/// - Calling [`ChainHandle::fail_with`] or [`ChainHandle::stream_fail_with`]
///   terminates the chain with that failure. This may also happen from a
///   task the policy spawned, after the policy has returned.
/// - Returning `Err` or panicking is an uncaught failure: the caller gets a
///   generic 500 and the detail goes to the logs and request metrics.
pub trait Policy: Send + Sync + 'static {
    /// Returns the policy identifier used in logs and metrics.
    fn id(&self) -> &str;

    /// Returns whether the policy should run for this context.
    ///
    /// Must be a cheap, side-effect free check. Policies that are not
    /// runnable are skipped without being invoked.
    fn is_runnable(&self, _ctx: &ExecutionContext) -> bool {
        true
    }

    /// Runs the policy on the request path.
    fn on_request<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        chain: &'a ChainHandle,
    ) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Runs the policy on the response path. Does nothing by default.
    fn on_response<'a>(
        &'a self,
        _ctx: &'a mut ExecutionContext,
        _chain: &'a ChainHandle,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

type Predicate = Box<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// A policy built from a synchronous closure.
///
/// The closure runs in both directions. Use [`FnPolicy::when`] to make it
/// conditional.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tollgate_policy::{FnPolicy, SharedPolicy};
///
/// let tag: SharedPolicy = Arc::new(
///     FnPolicy::new("tag", |ctx, _chain| {
///         ctx.set_attribute("tagged", true);
///         Ok(())
///     })
///     .when(|ctx| !ctx.has_attribute("tagged")),
/// );
///
/// assert_eq!(tag.id(), "tag");
/// ```
pub struct FnPolicy<F> {
    id: String,
    func: F,
    runnable: Option<Predicate>,
}

impl<F> FnPolicy<F>
where
    F: Fn(&mut ExecutionContext, &ChainHandle) -> anyhow::Result<()> + Send + Sync + 'static,
{
    /// Creates a new closure-backed policy.
    pub fn new(id: impl Into<String>, func: F) -> Self {
        Self {
            id: id.into(),
            func,
            runnable: None,
        }
    }

    /// Runs the policy only when `predicate` holds.
    pub fn when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.runnable = Some(Box::new(predicate));
        self
    }

    fn call<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        chain: &'a ChainHandle,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        // The closure must run inside the future, where the engine can catch its panics.
        Box::pin(async move { (self.func)(ctx, chain) })
    }
}

impl<F> Policy for FnPolicy<F>
where
    F: Fn(&mut ExecutionContext, &ChainHandle) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn is_runnable(&self, ctx: &ExecutionContext) -> bool {
        self.runnable.as_ref().map_or(true, |predicate| predicate(ctx))
    }

    fn on_request<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        chain: &'a ChainHandle,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        self.call(ctx, chain)
    }

    fn on_response<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        chain: &'a ChainHandle,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        self.call(ctx, chain)
    }
}

impl<F> std::fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPolicy")
            .field("id", &self.id)
            .field("conditional", &self.runnable.is_some())
            .finish()
    }
}

/// An immutable, insertion-ordered list of policies.
///
/// Cloning is cheap. Chains take their own snapshot at construction, so
/// replacing a processor's set never affects chains already in flight.
#[derive(Clone)]
pub struct PolicySet {
    policies: Arc<[SharedPolicy]>,
}

impl PolicySet {
    /// Creates a set from policies in execution order.
    #[must_use]
    pub fn new(policies: Vec<SharedPolicy>) -> Self {
        Self {
            policies: policies.into(),
        }
    }

    /// Creates an empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Returns the policies as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[SharedPolicy] {
        &self.policies
    }

    /// Returns the number of policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns true if the set has no policies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Iterates over the policies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SharedPolicy> {
        self.policies.iter()
    }

    /// Returns the policy identifiers in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.id()).collect()
    }
}

impl Default for PolicySet {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<SharedPolicy> for PolicySet {
    fn from_iter<I: IntoIterator<Item = SharedPolicy>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl std::fmt::Debug for PolicySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
