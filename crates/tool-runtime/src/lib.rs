pub mod backend;
pub mod tool;
pub mod tools;
pub mod registry;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{endpoints, BackendClient, BackendError, BackendResponse};
pub use tool::{Tool, ToolDefinition, ToolError, ToolResult};
pub use registry::{RegistryError, ToolRegistry};
pub use tools::{
    register_emi_tools, CalculateEmiTool, CalculateScheduleTool, CalculateWithPrepaymentTool,
    CompareLoansTool,
};
