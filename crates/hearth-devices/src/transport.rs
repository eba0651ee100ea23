//! Transport abstraction between the device service and the broker.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{DeviceError, DeviceResult};

/// Link health as seen by the receive task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Not connected and not trying
    Disconnected,
    /// Initial connection in progress
    Connecting,
    /// Connected and operational
    Connected,
    /// Backing off between reconnect attempts
    Reconnecting,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Outbound side of the publish/subscribe link.
#[async_trait]
pub trait Transport: Send + Sync {
    fn status(&self) -> ConnectionStatus;

    fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Best-effort publish of a text payload.
    async fn publish(&self, topic: &str, payload: &str) -> DeviceResult<()>;
}

pub type DynTransport = Arc<dyn Transport>;

/// A message handed to a [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
}

type Responder = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// In-process transport that records publishes.
///
/// A responder callback can play the part of the device, e.g. by writing a
/// reading into a store when a command arrives.
pub struct MemoryTransport {
    connected: AtomicBool,
    published: Mutex<Vec<PublishedMessage>>,
    responder: Mutex<Option<Responder>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            published: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
        }
    }

    pub fn disconnected() -> Self {
        let transport = Self::new();
        transport.set_connected(false);
        transport
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Install a callback run after every accepted publish.
    pub fn on_publish<F>(&self, responder: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Arc::new(responder));
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// Payloads published to one topic, in order.
    pub fn payloads_for(&self, topic: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn status(&self) -> ConnectionStatus {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    async fn publish(&self, topic: &str, payload: &str) -> DeviceResult<()> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        self.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });

        let responder = self.responder.lock().clone();
        if let Some(responder) = responder {
            responder(topic, payload);
        }
        Ok(())
    }
}
