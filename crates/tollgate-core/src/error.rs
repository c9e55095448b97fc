//! Error types for the policy chain engine.
//!
//! [`ChainError`] covers misuse of a chain and failures of the machinery
//! around it. Policy failures are not errors in this sense: they are
//! outcomes, delivered through the chain's completion.

use thiserror::Error;

/// Result type alias using [`ChainError`].
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors raised by the policy chain engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// `start` was called on a chain that is no longer pending.
    #[error("policy chain has already been started")]
    AlreadyStarted,

    /// The chain's body stream has ended or failed.
    #[error("policy chain stream is closed")]
    StreamClosed,

    /// The downstream stream sink rejected a write.
    #[error("downstream stream sink failed: {0}")]
    Sink(String),

    /// Every handle to the chain was dropped before it completed.
    #[error("policy chain was dropped before completing")]
    Abandoned,
}
