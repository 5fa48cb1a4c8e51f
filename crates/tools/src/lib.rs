//! Built-in tools for turnstream.
//!
//! Deliberately small: arithmetic and the current time. Deployments add
//! their own tools by registering more [`Tool`](turnstream_core::Tool)
//! implementations on the registry.

pub mod calculator;
pub mod current_time;

use std::sync::Arc;

use turnstream_core::ToolRegistry;

pub use calculator::CalculatorTool;
pub use current_time::CurrentTimeTool;

/// Create a registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CalculatorTool));
    registry.register(Arc::new(CurrentTimeTool));
    registry
}
