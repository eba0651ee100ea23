//! Function-calling tools for Hearth.
//!
//! A [`ToolRegistry`] holds the tools the reasoner may invoke. The device
//! tools wrap the shared device service; every tool reports its outcome as a
//! [`ToolOutput`] that the dispatch loop turns into text.

pub mod device;
pub mod error;
pub mod registry;
pub mod tool;

pub use device::{device_tools, DeviceControlTool, DeviceStateTool, DEVICE_CONTROL_TOOL, DEVICE_STATE_TOOL};
pub use error::{Result, ToolError};
pub use registry::{ToolRegistry, ToolResult};
pub use tool::{DynTool, Tool, ToolDefinition, ToolOutput};

/// Registry preloaded with the device tools.
pub fn device_registry(service: std::sync::Arc<hearth_devices::DeviceService>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_all(device_tools(service));
    registry
}
