//! Device state synchronization for Hearth.
//!
//! ## Architecture
//!
//! - **ReadingStore**: last-known integer reading per device
//! - **Transport**: publish side of the broker link (`MqttLink` in production,
//!   `MemoryTransport` in tests)
//! - **DeviceService**: query/control operations with bounded refresh retries
//!
//! The MQTT receive task is the only writer of fresh readings; control resets
//! a reading to unknown before it publishes a command.

pub mod device;
pub mod error;
pub mod mqtt;
pub mod service;
pub mod store;
pub mod transport;

pub use device::{
    Action, CommandRequest, DeviceKind, DeviceStatus, SemanticState, READING_UNKNOWN,
    REFRESH_PROBE,
};
pub use error::{DeviceError, DeviceResult};
pub use mqtt::{handle_telemetry, Backoff, MqttLink, ReconnectPolicy};
pub use service::{DeviceService, RetryContext};
pub use store::{DeviceReading, ReadingStore};
pub use transport::{ConnectionStatus, DynTransport, MemoryTransport, PublishedMessage, Transport};
