//! MQTT transport link.
//!
//! One background task owns the `rumqttc` event loop. It feeds inbound
//! readings into the [`ReadingStore`], reruns the subscribe/probe sequence on
//! every ConnAck, and backs off between reconnect attempts.
//!
//! ## Topics
//!
//! ```text
//! device/light/reading   <- "0" | "1"            (QoS 2)
//! device/door/reading    <- servo angle          (QoS 2)
//! device/light/command   -> "0" | "1" | "-1"     (QoS 0)
//! device/door/command    -> "2" | "80" | "-1"    (QoS 0)
//! ```
//!
//! rumqttc delivers every topic through the same event loop, so while the
//! task sleeps in backoff no inbound message is processed for any device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::config::{mqtt, MqttSettings, TimingSettings, TopicSettings};
use rand::Rng;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::device::{DeviceKind, REFRESH_PROBE};
use crate::error::{DeviceError, DeviceResult};
use crate::store::{DeviceReading, ReadingStore};
use crate::transport::{ConnectionStatus, Transport};

/// Exponential reconnect schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub first_delay: Duration,
    pub rate: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_timing(timing: &TimingSettings) -> Self {
        Self {
            first_delay: Duration::from_secs(timing.first_reconnect_delay_secs),
            rate: timing.reconnect_rate,
            max_delay: Duration::from_secs(timing.max_reconnect_delay_secs),
            max_attempts: timing.max_reconnect_count,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempts: 0,
            delay: self.first_delay,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_timing(&TimingSettings::default())
    }
}

/// Running state of a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
    delay: Duration,
}

impl Backoff {
    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let current = self.delay;
        self.attempts += 1;
        self.delay = (self.delay * self.policy.rate).min(self.policy.max_delay);
        Some(current)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.delay = self.policy.first_delay;
    }
}

/// Apply one inbound telemetry message to the store.
///
/// Payloads that are not an ASCII integer are logged and dropped; the prior
/// reading stays in place. Messages on unrelated topics are ignored.
pub fn handle_telemetry(
    store: &ReadingStore,
    topics: &TopicSettings,
    topic: &str,
    payload: &[u8],
) -> Option<DeviceReading> {
    let Some(device) = DeviceKind::from_reading_topic(topic, topics) else {
        debug!("Ignoring message on unrelated topic '{}'", topic);
        return None;
    };

    let text = match std::str::from_utf8(payload) {
        Ok(text) => text.trim(),
        Err(e) => {
            warn!("Malformed {} reading on '{}': not UTF-8 ({})", device, topic, e);
            return None;
        }
    };

    match text.parse::<i64>() {
        Ok(value) => {
            info!("Received `{}` from `{}` topic", value, topic);
            store.set(device, value);
            Some(store.reading(device))
        }
        Err(e) => {
            warn!("Malformed {} reading on '{}': {:?} ({})", device, topic, text, e);
            None
        }
    }
}

/// Client id from settings, or `hearth_client_<0..=100>`.
pub fn client_id(settings: &MqttSettings) -> String {
    settings.client_id.clone().unwrap_or_else(|| {
        format!(
            "{}_{}",
            mqtt::CLIENT_ID_PREFIX,
            rand::thread_rng().gen_range(0..=100)
        )
    })
}

/// Persistent MQTT link to the broker.
pub struct MqttLink {
    client: AsyncClient,
    broker_addr: String,
    status: watch::Receiver<ConnectionStatus>,
    shutdown: Arc<AtomicBool>,
}

impl MqttLink {
    /// Create the client and spawn its receive task.
    ///
    /// Returns immediately with status `Connecting`; the session comes up on
    /// the first ConnAck. Must be called inside a tokio runtime.
    pub fn connect(
        settings: &MqttSettings,
        topics: TopicSettings,
        timing: &TimingSettings,
        store: Arc<ReadingStore>,
    ) -> Arc<Self> {
        let client_id = client_id(settings);
        let mut options = MqttOptions::new(&client_id, &settings.broker, settings.port);
        options.set_keep_alive(settings.keep_alive());
        options.set_clean_session(true);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, 10);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let shutdown = Arc::new(AtomicBool::new(false));

        info!(
            "Connecting to MQTT broker {} as '{}'",
            settings.full_broker_addr(),
            client_id
        );

        let receive = ReceiveTask {
            client: client.clone(),
            status: status_tx,
            store,
            topics,
            startup_step: timing.startup_step(),
            policy: ReconnectPolicy::from_timing(timing),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(receive.run(eventloop));

        Arc::new(Self {
            client,
            broker_addr: settings.full_broker_addr(),
            status: status_rx,
            shutdown,
        })
    }

    pub fn broker_addr(&self) -> &str {
        &self.broker_addr
    }

    /// Wait until the link reports `Connected`, up to `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> DeviceResult<()> {
        let mut status = self.status.clone();
        let ready = tokio::time::timeout(
            timeout,
            status.wait_for(|s| *s == ConnectionStatus::Connected),
        )
        .await
        .map(|r| r.is_ok());

        match ready {
            Ok(true) => Ok(()),
            _ => Err(DeviceError::NotConnected),
        }
    }

    /// Send DISCONNECT and stop the receive task without reconnecting.
    pub async fn disconnect(&self) -> DeviceResult<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.client
            .disconnect()
            .await
            .map_err(|e| DeviceError::Communication(e.to_string()))
    }
}

#[async_trait]
impl Transport for MqttLink {
    fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    async fn publish(&self, topic: &str, payload: &str) -> DeviceResult<()> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        debug!("Publishing `{}` to `{}`", payload, topic);
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| DeviceError::Communication(e.to_string()))
    }
}

struct ReceiveTask {
    client: AsyncClient,
    status: watch::Sender<ConnectionStatus>,
    store: Arc<ReadingStore>,
    topics: TopicSettings,
    startup_step: Duration,
    policy: ReconnectPolicy,
    shutdown: Arc<AtomicBool>,
}

impl ReceiveTask {
    async fn run(self, mut eventloop: EventLoop) {
        let mut backoff = self.policy.backoff();

        loop {
            match eventloop.poll().await {
                // Refused ConnAcks surface as `ConnectionError::ConnectionRefused`.
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT Broker!");
                    backoff.reset();
                    self.status.send_replace(ConnectionStatus::Connected);
                    tokio::spawn(subscribe_and_probe(
                        self.client.clone(),
                        self.topics.clone(),
                        self.startup_step,
                    ));
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handle_telemetry(&self.store, &self.topics, &publish.topic, &publish.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        info!("MQTT link closed");
                        self.status.send_replace(ConnectionStatus::Disconnected);
                        break;
                    }

                    warn!("Disconnected from broker: {}", disconnect_reason(&e));
                    match backoff.next_delay() {
                        Some(delay) => {
                            self.status.send_replace(ConnectionStatus::Reconnecting);
                            info!(
                                "Reconnecting in {} seconds... (attempt {}/{})",
                                delay.as_secs(),
                                backoff.attempts(),
                                self.policy.max_attempts
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!(
                                "Reconnect failed after {} attempts, link stays down until restart",
                                backoff.attempts()
                            );
                            self.status.send_replace(ConnectionStatus::Disconnected);
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn disconnect_reason(e: &ConnectionError) -> String {
    match e {
        ConnectionError::ConnectionRefused(code) => {
            format!("connection refused, return code {:?}", code)
        }
        other => other.to_string(),
    }
}

/// Subscribe to both reading topics, then ask both devices to report.
async fn subscribe_and_probe(client: AsyncClient, topics: TopicSettings, step: Duration) {
    for device in DeviceKind::ALL {
        tokio::time::sleep(step).await;
        let topic = device.reading_topic(&topics);
        match client.subscribe(topic, QoS::ExactlyOnce).await {
            Ok(()) => info!("Subscribed to `{}`", topic),
            Err(e) => error!("Failed to subscribe to `{}`: {}", topic, e),
        }
    }

    for device in DeviceKind::ALL {
        tokio::time::sleep(step).await;
        let topic = device.command_topic(&topics);
        if let Err(e) = client
            .publish(topic, QoS::AtMostOnce, false, REFRESH_PROBE.as_bytes().to_vec())
            .await
        {
            error!("Failed to send startup probe to `{}`: {}", topic, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SemanticState;

    #[test]
    fn test_backoff_schedule() {
        let mut backoff = ReconnectPolicy::default().backoff();
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay())
            .map(|d| d.as_secs())
            .collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60, 60, 60, 60, 60]);
        assert_eq!(backoff.attempts(), 12);
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_telemetry_updates_store() {
        let store = ReadingStore::new();
        let topics = TopicSettings::default();

        let reading = handle_telemetry(&store, &topics, "device/light/reading", b"1").unwrap();
        assert_eq!(reading.value, 1);
        assert_eq!(store.state(DeviceKind::Light), SemanticState::On);

        handle_telemetry(&store, &topics, "device/door/reading", b" 80\n");
        assert_eq!(store.get(DeviceKind::Door), 80);
    }

    #[test]
    fn test_malformed_telemetry_keeps_reading() {
        let store = ReadingStore::new();
        let topics = TopicSettings::default();
        store.set(DeviceKind::Door, 2);

        assert!(handle_telemetry(&store, &topics, "device/door/reading", b"ajar").is_none());
        assert!(handle_telemetry(&store, &topics, "device/door/reading", b"").is_none());
        assert!(handle_telemetry(&store, &topics, "device/door/reading", &[0xff, 0xfe]).is_none());
        assert_eq!(store.get(DeviceKind::Door), 2);
    }

    #[test]
    fn test_unrelated_topic_ignored() {
        let store = ReadingStore::new();
        let topics = TopicSettings::default();
        assert!(handle_telemetry(&store, &topics, "device/light/command", b"1").is_none());
        assert_eq!(store.get(DeviceKind::Light), -1);
    }

    #[test]
    fn test_client_id() {
        let id = client_id(&MqttSettings::default());
        let suffix: u32 = id.strip_prefix("hearth_client_").unwrap().parse().unwrap();
        assert!(suffix <= 100);

        let settings = MqttSettings::default().with_client_id("kitchen");
        assert_eq!(client_id(&settings), "kitchen");
    }

    #[tokio::test]
    async fn test_publish_before_connack_fails_fast() {
        let settings = MqttSettings::new("127.0.0.1").with_port(1);
        let link = MqttLink::connect(
            &settings,
            TopicSettings::default(),
            &TimingSettings::default(),
            Arc::new(ReadingStore::new()),
        );

        assert!(!link.is_connected());
        assert_eq!(
            link.publish("device/light/command", "1").await,
            Err(DeviceError::NotConnected)
        );
        assert_eq!(link.broker_addr(), "127.0.0.1:1");
    }

    fn unreachable_link() -> Arc<MqttLink> {
        MqttLink::connect(
            &MqttSettings::new("127.0.0.1").with_port(1),
            TopicSettings::default(),
            &TimingSettings::default(),
            Arc::new(ReadingStore::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_connected_times_out() {
        let link = unreachable_link();
        let start = tokio::time::Instant::now();

        assert_eq!(
            link.wait_connected(Duration::from_secs(5)).await,
            Err(DeviceError::NotConnected)
        );
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(!link.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_gives_up_after_schedule() {
        let link = unreachable_link();
        let start = tokio::time::Instant::now();

        let mut status = link.status.clone();
        let gave_up = tokio::time::timeout(
            Duration::from_secs(3600),
            status.wait_for(|s| *s == ConnectionStatus::Disconnected),
        )
        .await
        .map(|r| r.is_ok());
        assert!(matches!(gave_up, Ok(true)));

        // 1+2+4+8+16+32 plus six 60 s waits.
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(423) && elapsed < Duration::from_secs(500),
            "gave up after {:?}",
            elapsed
        );
        assert_eq!(link.status(), ConnectionStatus::Disconnected);
        assert_eq!(
            link.wait_connected(Duration::from_secs(1)).await,
            Err(DeviceError::NotConnected)
        );
    }

    #[test]
    fn test_disconnect_reason() {
        let refused = ConnectionError::ConnectionRefused(rumqttc::ConnectReturnCode::NotAuthorized);
        assert_eq!(
            disconnect_reason(&refused),
            "connection refused, return code NotAuthorized"
        );

        let io = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert_eq!(disconnect_reason(&io), io.to_string());
    }
}
