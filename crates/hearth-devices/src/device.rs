//! Device identities, actions and reading semantics.

use std::fmt;
use std::str::FromStr;

use hearth_core::config::TopicSettings;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Reading value that means "unknown or stale".
pub const READING_UNKNOWN: i64 = -1;

/// Command-channel payload asking the device to report its reading.
pub const REFRESH_PROBE: &str = "-1";

/// Door readings above this angle count as open.
pub const DOOR_OPEN_THRESHOLD: i64 = 45;

/// The two actuators in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Light,
    Door,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::Light, DeviceKind::Door];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Door => "door",
        }
    }

    pub fn reading_topic<'a>(&self, topics: &'a TopicSettings) -> &'a str {
        match self {
            Self::Light => &topics.light_reading,
            Self::Door => &topics.door_reading,
        }
    }

    pub fn command_topic<'a>(&self, topics: &'a TopicSettings) -> &'a str {
        match self {
            Self::Light => &topics.light_command,
            Self::Door => &topics.door_command,
        }
    }

    /// Device whose reading arrives on `topic`, if any.
    pub fn from_reading_topic(topic: &str, topics: &TopicSettings) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.reading_topic(topics) == topic)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "door" => Ok(Self::Door),
            _ => Err(DeviceError::InvalidDevice(s.to_string())),
        }
    }
}

/// Human-meaningful classification of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticState {
    On,
    Off,
    Open,
    Closed,
    Unknown,
}

impl SemanticState {
    /// Classify a raw reading.
    ///
    /// Light is binary: only 1 and 0 are meaningful. The door reports a servo
    /// angle, so anything past the threshold is open and only the `-1`
    /// sentinel is unknown (0 is a real closed reading).
    pub fn from_reading(device: DeviceKind, value: i64) -> Self {
        match device {
            DeviceKind::Light => match value {
                1 => Self::On,
                0 => Self::Off,
                _ => Self::Unknown,
            },
            DeviceKind::Door => {
                if value > DOOR_OPEN_THRESHOLD {
                    Self::Open
                } else if value == READING_UNKNOWN {
                    Self::Unknown
                } else {
                    Self::Closed
                }
            }
        }
    }

    pub fn is_definitive(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SemanticState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    On,
    Off,
    Open,
    Close,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Open => "open",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "open" => Ok(Self::Open),
            "close" => Ok(Self::Close),
            _ => Err(()),
        }
    }
}

/// A validated (device, action) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRequest {
    pub device: DeviceKind,
    pub action: Action,
}

impl CommandRequest {
    /// Validate a raw pairing. Only light:on/off and door:open/close pass.
    pub fn parse(device: &str, action: &str) -> Result<Self, DeviceError> {
        let invalid = || DeviceError::InvalidAction {
            device: device.to_string(),
            action: action.to_string(),
        };

        let kind = device.parse::<DeviceKind>().map_err(|_| invalid())?;
        let action_kind = action.parse::<Action>().map_err(|_| invalid())?;

        match (kind, action_kind) {
            (DeviceKind::Light, Action::On | Action::Off)
            | (DeviceKind::Door, Action::Open | Action::Close) => Ok(Self {
                device: kind,
                action: action_kind,
            }),
            _ => Err(invalid()),
        }
    }

    /// Payload published on the device's command topic.
    pub fn payload(&self) -> &'static str {
        match self.action {
            Action::On => "1",
            Action::Off => "0",
            Action::Open => "80",
            Action::Close => "2",
        }
    }
}

/// Query/Control result: a device and its semantic state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device: DeviceKind,
    pub state: SemanticState,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is {}", self.device, self.state)
    }
}
