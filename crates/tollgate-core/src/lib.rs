//! # Tollgate Core
//!
//! Core types shared by every part of the Tollgate policy chain engine.
//!
//! This crate provides the foundational vocabulary the engine and the
//! surrounding gateway pipeline agree on:
//!
//! - [`ExecutionContext`] - Per-request, per-direction state handed to every policy
//! - [`RequestId`] - UUID v7 request identifier
//! - [`RequestMetrics`] - Per-request diagnostics and policy execution records
//! - [`PolicyResult`] / [`PolicyFailure`] - The outcome of evaluating a policy
//! - [`ProcessorFailure`] - A failure in the shape the gateway pipeline consumes
//! - [`ChainError`] - Engine-level errors
//! - [`Traversal`] - The order in which a chain walks its policies

#![doc(html_root_url = "https://docs.rs/tollgate-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod metrics;
mod result;
mod traversal;
pub mod types;

pub use context::{ExecutionContext, RequestId};
pub use error::{ChainError, ChainResult};
pub use metrics::{ExecutionStatus, PolicyExecution, RequestMetrics};
pub use result::{PolicyFailure, PolicyResult, ProcessorFailure};
pub use traversal::Traversal;
pub use types::{Request, Response};
