//! # Tollgate Policy
//!
//! The policy chain execution engine of the Tollgate API gateway.
//!
//! For every request, the gateway runs an ordered list of policies
//! (authentication, rate limiting, transformation, ...) one at a time. This
//! crate sequences them and resolves the run to a single outcome:
//!
//! | Outcome | Meaning | Gateway reaction |
//! |---------|---------|------------------|
//! | [`ChainOutcome::Success`] | Every runnable policy completed | Proceed to the next pipeline stage |
//! | [`ChainOutcome::Failed`] | A policy short-circuited the chain, returned an error, or panicked | Reject with the carried status |
//! | [`ChainOutcome::StreamFailed`] | The body stream broke | Abort the stream |
//!
//! ## Failure handling
//!
//! | Policy does | Outcome |
//! |-------------|---------|
//! | returns `Ok(())` | next policy runs |
//! | is not runnable | skipped, never invoked |
//! | calls [`ChainHandle::fail_with`] | `Failed` with that exact failure |
//! | calls [`ChainHandle::stream_fail_with`] | `StreamFailed` with that exact failure |
//! | returns `Err` or panics | `Failed` with a generic 500; detail logged and kept in the request metrics |
//!
//! An outcome fires at most once per chain, whatever order these happen in.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tollgate_policy::{ChainOutcome, FnPolicy, PolicyChain, SharedPolicy};
//! use tollgate_core::ExecutionContext;
//!
//! # tokio_test::block_on(async {
//! let policies: Vec<SharedPolicy> = vec![
//!     Arc::new(FnPolicy::new("tag", |ctx, _chain| {
//!         ctx.set_attribute("tagged", true);
//!         Ok(())
//!     })),
//! ];
//!
//! let request = http::Request::new(http_body_util::Full::new(bytes::Bytes::new()));
//! let mut ctx = ExecutionContext::new(request);
//!
//! let (mut chain, completion) = PolicyChain::request(&policies);
//! chain.start(&mut ctx).await.unwrap();
//!
//! assert_eq!(completion.await.unwrap(), ChainOutcome::Success);
//! assert!(ctx.has_attribute("tagged"));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/tollgate-policy/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod completion;
pub mod direction;
pub mod policy;
pub mod processor;
pub mod stream;

pub use chain::{ChainState, PolicyChain};
pub use completion::{ChainOutcome, Completion, CompletionHandlers, OutcomeKind};
pub use direction::{ChainDirection, RequestDirection, ResponseDirection};
pub use policy::{BoxFuture, FnPolicy, Policy, PolicySet, SharedPolicy};
pub use processor::ChainProcessor;
pub use stream::{BufferedSink, ChainHandle, SinkError, StreamSink};
