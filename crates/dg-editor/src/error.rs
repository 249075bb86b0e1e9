//! Error taxonomy for the editor engine.
//!
//! Query misses are returned values, never panics. Mutating operations
//! are all-or-nothing: a returned error means the tree was not touched.

use dg_core::DiagramId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditorError {
    /// An id lookup missed. Callers decide whether absence is fatal.
    #[error("diagram {0} not found")]
    NotFound(DiagramId),

    /// A precondition of a structural operation was not met; the tree
    /// was left unchanged.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A command payload was missing required fields or malformed at
    /// the boundary.
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

pub type EditorResult<T> = Result<T, EditorError>;
