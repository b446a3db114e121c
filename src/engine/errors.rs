//! Error types for condition evaluation.

use thiserror::Error;

/// A fault raised while evaluating a single rule's condition.
///
/// These are payload problems a structurally valid rule can still carry.
/// The matcher isolates them per rule: a faulting candidate is logged and
/// treated as a non-match, and never aborts the rest of the batch. Missing
/// record sections are deliberately *not* errors; a condition referencing
/// an absent section is simply a non-match.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EvalError {
    /// A cross-aggregate leaf was given an empty symbol group.
    #[error("aggregate group is empty")]
    EmptyGroup,

    /// A threshold leaf carries no `eq`, `min` or `max` constraint at all.
    /// Treating this as vacuously true would make every record match a
    /// miswritten rule, so it faults instead.
    #[error("threshold leaf carries no bounds")]
    UnboundedThreshold,

    /// Unexpected internal condition; indicates a bug, not bad rule data.
    #[error("internal error: {0}")]
    Internal(String),
}
