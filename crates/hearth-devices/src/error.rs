//! Device-level errors.
//!
//! The `Display` text of each variant is what the reasoner sees, so the
//! messages are written as plain sentences.

use crate::device::DeviceKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The transport link is down.
    #[error("Not connected to the server")]
    NotConnected,

    /// Unrecognized device identifier.
    #[error("Invalid device")]
    InvalidDevice(String),

    /// The (device, action) pair is not one of the supported commands.
    #[error("Invalid action '{action}' for device '{device}'")]
    InvalidAction { device: String, action: String },

    /// Refresh probes were exhausted without a definitive reading.
    #[error("Unknown {0} state after multiple retries, please check manually.")]
    UnknownAfterRetries(DeviceKind),

    /// The transport rejected an outbound message.
    #[error("Communication error: {0}")]
    Communication(String),
}

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

impl From<DeviceError> for hearth_core::Error {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::InvalidDevice(_) | DeviceError::InvalidAction { .. } => {
                hearth_core::Error::Validation(e.to_string())
            }
            DeviceError::Communication(s) => hearth_core::Error::Network(s),
            other => hearth_core::Error::Device(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(DeviceError::NotConnected.to_string(), "Not connected to the server");
        assert_eq!(
            DeviceError::UnknownAfterRetries(DeviceKind::Light).to_string(),
            "Unknown light state after multiple retries, please check manually."
        );
    }

    #[test]
    fn test_into_core_error() {
        let err: hearth_core::Error = DeviceError::InvalidDevice("fan".into()).into();
        assert!(matches!(err, hearth_core::Error::Validation(_)));

        let err: hearth_core::Error = DeviceError::NotConnected.into();
        assert!(matches!(err, hearth_core::Error::Device(_)));
    }
}
