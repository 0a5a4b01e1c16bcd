//! The instrumenting rewriter.
//!
//! Transforms a parsed source unit so that every method body pushes a frame
//! on entry and pops it on every exit path, and every statement is preceded
//! by a `checkpoint(id, method, make_locals(...))` call. Produces the
//! [`CheckpointIndex`] the debugger engine consults at runtime.

mod instrument;

pub use crate::instrument::{instrument, instrument_source, InstrumentedUnit};

use thiserror::Error;
use waypoint_syntax::ParseError;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Qualified method names must be stable and unique within the unit;
    /// overloads are not part of the language.
    #[error("duplicate method `{name}` in unit")]
    DuplicateMethod { name: String },
}
