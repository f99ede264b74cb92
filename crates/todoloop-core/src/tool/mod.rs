//! Tool registry contract and the built-in todo tools.

pub mod builtin;
pub mod registry;

pub use builtin::TodoToolRegistry;
pub use registry::{ToolRegistry, tool_error, tool_error_summary};
