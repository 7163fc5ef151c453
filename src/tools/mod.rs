//! Tool capability contract, argument access, schemas and registry.

pub mod arguments;
pub mod registry;
pub mod schema;
pub mod tool;

pub use arguments::ToolArguments;
pub use registry::ToolRegistry;
pub use schema::{ParameterSpec, ParameterType, SchemaBuilder, ToolDeclaration, ToolSchema};
pub use tool::{FnTool, HostContext, Tool};
