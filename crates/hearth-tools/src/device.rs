//! Device tools exposed to the reasoner.
//!
//! Both tools wrap a shared [`DeviceService`]. Device-level failures such as
//! an unreachable broker or an unknown device are returned as failed
//! [`ToolOutput`]s so the reasoner can explain them; only malformed
//! arguments surface as [`ToolError`].

use std::sync::Arc;

use async_trait::async_trait;
use hearth_devices::{DeviceResult, DeviceService, DeviceStatus, RetryContext};
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, ToolError};
use crate::tool::{
    enum_property, integer_property, object_schema, required_str, DynTool, Tool, ToolOutput,
};

pub const DEVICE_STATE_TOOL: &str = "device_state";
pub const DEVICE_CONTROL_TOOL: &str = "device_control";

fn to_output(result: DeviceResult<DeviceStatus>) -> ToolOutput {
    match result {
        Ok(status) => ToolOutput::success(status.to_string()),
        Err(e) => {
            warn!("Device operation failed: {}", e);
            ToolOutput::error(e.to_string())
        }
    }
}

/// Reads the state of the light or the door.
pub struct DeviceStateTool {
    service: Arc<DeviceService>,
}

impl DeviceStateTool {
    pub fn new(service: Arc<DeviceService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for DeviceStateTool {
    fn name(&self) -> &str {
        DEVICE_STATE_TOOL
    }

    fn description(&self) -> &str {
        "Get the current state of the light or door in the room. If the state is unknown, \
         the device is asked to report again a few times before giving up."
    }

    fn parameters(&self) -> Value {
        object_schema(
            serde_json::json!({
                "device": enum_property("Device to query: 'light' or 'door'", &["light", "door"]),
                "retry_count": integer_property(
                    "Current retry attempt, default 0. Use -1 to skip the first refresh request."
                )
            }),
            vec!["device".to_string()],
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        self.validate_args(&args)?;
        let device = required_str(&args, "device")?;

        let retry = match args.get("retry_count") {
            None | Some(Value::Null) => RetryContext::new(),
            Some(v) => {
                let attempt = v.as_i64().ok_or_else(|| {
                    ToolError::InvalidArguments("'retry_count' must be an integer".to_string())
                })?;
                let attempt = attempt.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
                RetryContext::from_attempt(attempt)
            }
        };

        Ok(to_output(self.service.query(device, retry).await))
    }
}

/// Switches the light or moves the door, then reports the resulting state.
pub struct DeviceControlTool {
    service: Arc<DeviceService>,
}

impl DeviceControlTool {
    pub fn new(service: Arc<DeviceService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for DeviceControlTool {
    fn name(&self) -> &str {
        DEVICE_CONTROL_TOOL
    }

    fn description(&self) -> &str {
        "Control the light or door in the room, then check the state. \
         Use 'on'/'off' for the light and 'open'/'close' for the door."
    }

    fn parameters(&self) -> Value {
        object_schema(
            serde_json::json!({
                "device": enum_property("Device to control: 'light' or 'door'", &["light", "door"]),
                "action": enum_property(
                    "'on'/'off' for light, 'open'/'close' for door",
                    &["on", "off", "open", "close"]
                )
            }),
            vec!["device".to_string(), "action".to_string()],
        )
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        self.validate_args(&args)?;
        let device = required_str(&args, "device")?;
        let action = required_str(&args, "action")?;

        Ok(to_output(self.service.control(device, action).await))
    }
}

/// Both device tools over one service.
pub fn device_tools(service: Arc<DeviceService>) -> Vec<DynTool> {
    vec![
        Arc::new(DeviceStateTool::new(service.clone())),
        Arc::new(DeviceControlTool::new(service)),
    ]
}
