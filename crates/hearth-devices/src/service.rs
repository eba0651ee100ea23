//! Device query and control operations.
//!
//! [`DeviceService`] is the explicit context object built once at startup:
//! it owns the shared reading store and a handle to the transport, and is
//! injected into the tools the reasoner calls.
//!
//! Concurrent `control` calls against the same device are not serialized;
//! the last command published wins.

use std::sync::Arc;
use std::time::Duration;

use hearth_core::config::{TimingSettings, TopicSettings};
use tracing::{debug, info};

use crate::device::{CommandRequest, DeviceKind, DeviceStatus, REFRESH_PROBE};
use crate::error::{DeviceError, DeviceResult};
use crate::store::{DeviceReading, ReadingStore};
use crate::transport::DynTransport;

/// Where a query chain starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    pub attempt: i32,
}

impl RetryContext {
    /// Fresh chain: probe on every unknown reading.
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    /// Skip the probe on the first iteration. That iteration still consumes a
    /// retry slot, so the chain allows one extra look at the store.
    pub fn suppressed() -> Self {
        Self { attempt: -1 }
    }

    /// Values below -1 are treated as -1.
    pub fn from_attempt(attempt: i32) -> Self {
        Self {
            attempt: attempt.max(-1),
        }
    }

    fn probes(&self) -> bool {
        self.attempt != -1
    }
}

impl Default for RetryContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Query/Control engine on top of a transport and a reading store.
pub struct DeviceService {
    transport: DynTransport,
    store: Arc<ReadingStore>,
    topics: TopicSettings,
    max_retry: i32,
    settle: Duration,
}

impl DeviceService {
    pub fn new(transport: DynTransport, store: Arc<ReadingStore>) -> Self {
        Self::with_settings(
            transport,
            store,
            TopicSettings::default(),
            &TimingSettings::default(),
        )
    }

    pub fn with_settings(
        transport: DynTransport,
        store: Arc<ReadingStore>,
        topics: TopicSettings,
        timing: &TimingSettings,
    ) -> Self {
        Self {
            transport,
            store,
            topics,
            max_retry: timing.max_retry,
            settle: timing.settle(),
        }
    }

    pub fn store(&self) -> &Arc<ReadingStore> {
        &self.store
    }

    pub fn readings(&self) -> Vec<DeviceReading> {
        self.store.snapshot()
    }

    fn ensure_connected(&self) -> DeviceResult<()> {
        if self.transport.is_connected() {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    /// Resolve the current semantic state of `device`.
    ///
    /// A definitive reading returns at once. An unknown one triggers a refresh
    /// probe and a settle wait, at most `max_retry` times per chain.
    pub async fn query(&self, device: &str, retry: RetryContext) -> DeviceResult<DeviceStatus> {
        info!("Query device state: {}, Retry count: {}", device, retry.attempt);
        self.ensure_connected()?;
        let kind: DeviceKind = device.parse()?;
        self.query_kind(kind, retry).await
    }

    async fn query_kind(&self, kind: DeviceKind, retry: RetryContext) -> DeviceResult<DeviceStatus> {
        let mut attempt = retry;

        loop {
            self.ensure_connected()?;

            let state = self.store.state(kind);
            if state.is_definitive() {
                return Ok(DeviceStatus { device: kind, state });
            }
            if attempt.attempt >= self.max_retry {
                return Err(DeviceError::UnknownAfterRetries(kind));
            }

            if attempt.probes() {
                debug!("{} state unknown, sending refresh probe (attempt {})", kind, attempt.attempt);
                self.transport
                    .publish(kind.command_topic(&self.topics), REFRESH_PROBE)
                    .await?;
                tokio::time::sleep(self.settle).await;
            }
            attempt.attempt += 1;
        }
    }

    /// Actuate `device`, then confirm the outcome with a fresh query.
    ///
    /// The reading is invalidated before publishing so the confirmation can
    /// only reflect telemetry that arrived after the command.
    pub async fn control(&self, device: &str, action: &str) -> DeviceResult<DeviceStatus> {
        info!("Control device: {}, Action: {}", device, action);
        self.ensure_connected()?;
        let command = CommandRequest::parse(device, action)?;

        self.store.reset(command.device);
        self.transport
            .publish(command.device.command_topic(&self.topics), command.payload())
            .await?;
        tokio::time::sleep(self.settle).await;

        self.query_kind(command.device, RetryContext::new()).await
    }
}
