//! Report modules.
//!
//! [`formatter`] projects a matrix into display text; [`generator`] renders
//! the result as Markdown or JSON.

pub mod formatter;
pub mod generator;

pub use formatter::*;
pub use generator::*;
