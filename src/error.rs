//! Error types for context initialization and the shared resource registry.
//!
//! Only caller-correctness problems are reported as errors. Driver oddities
//! are absorbed by the capability probe and lifecycle anomalies go to the
//! [`MessageSink`](crate::MessageSink).

use thiserror::Error;

/// Failure to bring a [`GlContext`](crate::GlContext) up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// No hardware context is current on the calling thread.
    #[error("no OpenGL context is current on this thread")]
    NoCurrentContext,
}

/// Rejected registration in the shared resource registry.
///
/// The registry is left untouched whenever one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Resources cannot be shared under an empty key.
    #[error("shared resource key must not be empty")]
    EmptyKey,

    /// The key already maps to a live resource; release it first.
    #[error("shared resource key `{0}` is already bound")]
    AlreadyBound(String),
}
