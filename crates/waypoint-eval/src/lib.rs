//! Expression evaluation against paused frames.
//!
//! Synthesizes a module per distinct `(expression, locals-signature)` pair,
//! compiles it at release optimization into a dedicated isolate, and caches
//! the callable in a bounded LRU. The `sandbox` module carries the contract
//! for the optional out-of-process evaluator.

mod evaluator;
pub mod sandbox;
mod sanitize;

pub use crate::evaluator::{EvalError, ExpressionEvaluator};
pub use crate::sanitize::{sanitize_local_name, sanitize_unique};
