//! Job orchestration that spans the store, the code generator, and the
//! event bus.
//!
//! Contains the auto-fix loop that turns a failed build into a corrected
//! retry job.

pub mod auto_fix;

pub use auto_fix::{AutoFixEngine, AutoFixError, AutoFixOutcome};
