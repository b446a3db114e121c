//! The matching engine.
//!
//! This module provides:
//! - **condition**: the combinator/leaf condition language
//! - **errors**: evaluation fault types
//! - **eval**: the pure condition evaluator with fact tracing
//! - **index**: the literal index and candidate generation
//! - **store**: immutable rule snapshots and the reloadable handle
//! - **matcher**: evaluation orchestration and priority ranking

pub mod condition;
pub mod errors;
pub mod eval;
pub(crate) mod index;
pub mod matcher;
pub mod store;
