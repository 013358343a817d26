//! Shared CLI argument types

mod common;
mod global;

pub use common::{HeaderArg, OutputFormat};
pub use global::GlobalOptions;
