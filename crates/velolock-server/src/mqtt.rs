//! MQTT bridge between the service and the locks.
//!
//! Outbound, [`MqttPublisher`] implements [`CommandPublisher`] over a
//! `rumqttc` client. Inbound, [`run_event_loop`] drives the connection,
//! subscribes to every status topic on each (re)connect, and feeds received
//! messages into the device registry.
//!
//! The event loop is the only consumer of the client's request queue, so
//! nothing on the poll path may wait for queue space.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use velolock_core::{
    CommandPublisher, CommandTopic, DeviceId, IngestOutcome, MqttConfig, PublishError,
    SharedRegistry, StatusTopic,
};

const DEFAULT_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const CHANNEL_CAPACITY: usize = 64;

/// Errors raised while setting up the broker connection.
#[derive(Debug, Error)]
pub enum MqttError {
    /// The broker URL cannot be used.
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

/// Broker address parsed from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    /// Host name or IP.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Whether to connect over TLS.
    pub tls: bool,
}

/// Parses `mqtt://host[:port]` or `mqtts://host[:port]`.
///
/// # Errors
///
/// Returns [`MqttError::InvalidBrokerUrl`] for an empty host or a bad port.
pub fn parse_broker_url(url: &str) -> Result<BrokerAddress, MqttError> {
    let (rest, tls) = if let Some(rest) = url.strip_prefix("mqtts://") {
        (rest, true)
    } else if let Some(rest) = url.strip_prefix("ssl://") {
        (rest, true)
    } else {
        let rest = url
            .strip_prefix("mqtt://")
            .or_else(|| url.strip_prefix("tcp://"))
            .unwrap_or(url);
        (rest, false)
    };
    let rest = rest.trim_end_matches('/');

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| MqttError::InvalidBrokerUrl(format!("invalid port in '{url}'")))?;
            (host, port)
        }
        None => (rest, if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT }),
    };

    if host.is_empty() {
        return Err(MqttError::InvalidBrokerUrl(format!("missing host in '{url}'")));
    }

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

fn client_id(config: &MqttConfig) -> String {
    config
        .client_id
        .clone()
        .unwrap_or_else(|| format!("velolock-{}", uuid::Uuid::new_v4().simple()))
}

/// Builds client options from configuration.
///
/// # Errors
///
/// Returns an error if the broker URL cannot be parsed.
pub fn mqtt_options(config: &MqttConfig) -> Result<MqttOptions, MqttError> {
    let address = parse_broker_url(&config.broker_url)?;

    let mut options = MqttOptions::new(client_id(config), address.host, address.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.clone().unwrap_or_default());
    }
    if address.tls {
        options.set_transport(Transport::tls_with_default_config());
    }

    Ok(options)
}

/// Publishes device commands on the broker.
///
/// Publishing never waits: it fails as disconnected while the broker link is
/// down, and as a client error when the request queue is full.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttPublisher {
    /// Wraps a client whose event loop has not connected yet.
    #[must_use]
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the broker has acknowledged the current connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

#[async_trait]
impl CommandPublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::Disconnected(
                "not connected to MQTT broker".to_string(),
            ));
        }
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| PublishError::Client(e.to_string()))
    }
}

/// Connects to the broker and starts the listener task.
///
/// The returned publisher refuses commands until the first connection
/// acknowledgement.
///
/// # Errors
///
/// Returns an error if the configuration cannot be turned into client options.
pub fn connect(
    config: &MqttConfig,
    registry: SharedRegistry,
) -> Result<(Arc<MqttPublisher>, JoinHandle<()>), MqttError> {
    let options = mqtt_options(config)?;
    let (client, event_loop) = AsyncClient::new(options, CHANNEL_CAPACITY);
    let publisher = MqttPublisher::new(client);

    info!(broker = %config.broker_url, "Connecting to MQTT broker");

    let fallback = config.fallback_device();
    let handle = tokio::spawn(run_event_loop(
        event_loop,
        publisher.clone(),
        registry,
        fallback,
    ));

    Ok((Arc::new(publisher), handle))
}

/// Drives the broker connection until the task is aborted.
///
/// On every connection acknowledgement the status topics are (re)subscribed
/// and a status request is sent, so the registry is refreshed after each
/// reconnect. Connection errors mark the publisher disconnected and are
/// retried after a short delay.
pub async fn run_event_loop(
    mut event_loop: EventLoop,
    publisher: MqttPublisher,
    registry: SharedRegistry,
    fallback: Option<DeviceId>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                info!(?connack, "MQTT connected");
                publisher.set_connected(true);
                tokio::spawn(on_connected(publisher.client.clone(), fallback.clone()));
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Ok(payload) = std::str::from_utf8(&publish.payload) else {
                    warn!(topic = %publish.topic, "Dropping non-UTF-8 message");
                    continue;
                };
                handle_message(&registry, &publish.topic, payload, fallback.as_ref()).await;
            }
            Ok(_) => {}
            Err(e) => {
                if publisher.is_connected() {
                    warn!("MQTT connection lost");
                }
                publisher.set_connected(false);
                error!(error = %e, "MQTT event loop error");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Subscribes and requests status. Runs beside the event loop, which must
/// keep polling for these requests to drain.
async fn on_connected(client: AsyncClient, fallback: Option<DeviceId>) {
    for filter in StatusTopic::subscription_filters() {
        if let Err(e) = client.subscribe(&filter, QoS::AtLeastOnce).await {
            warn!(filter = %filter, error = %e, "Failed to subscribe");
        }
    }

    let topic = CommandTopic::Status.for_device(fallback.as_ref().map(DeviceId::as_str));
    if let Err(e) = client
        .publish(&topic, QoS::AtLeastOnce, false, b"request".to_vec())
        .await
    {
        warn!(topic = %topic, error = %e, "Failed to request device status");
    }
}

/// Feeds one broker message into the registry and logs the outcome.
pub async fn handle_message(
    registry: &SharedRegistry,
    topic: &str,
    payload: &str,
    fallback: Option<&DeviceId>,
) -> IngestOutcome {
    let outcome = registry.write().await.ingest(topic, payload, fallback);

    match &outcome {
        IngestOutcome::Applied { device_id, state } => {
            info!(
                device_id = %device_id,
                topic,
                payload = payload.trim(),
                state = state.map_or("unknown", |s| s.as_str()),
                "Device status received"
            );
        }
        IngestOutcome::Log { device_id, line } => {
            info!(device_id = %device_id, line = %line, "Device log");
        }
        IngestOutcome::Invalid { device_id, error } => {
            warn!(device_id = %device_id, topic, error = %error, "Unrecognized device message");
        }
        IngestOutcome::Ignored => {
            debug!(topic, "Ignoring message");
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use velolock_core::{DeviceRegistry, LifecycleState};

    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    fn test_options(port: u16) -> MqttOptions {
        let config = MqttConfig {
            broker_url: format!("mqtt://127.0.0.1:{port}"),
            client_id: Some("velolock-test".to_string()),
            ..MqttConfig::default()
        };
        mqtt_options(&config).unwrap()
    }

    /// Accepts one client, acknowledges its CONNECT and swallows the rest.
    async fn fake_broker() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 4096];
            if socket.read(&mut buf).await.unwrap_or(0) == 0 {
                return;
            }
            socket.write_all(&CONNACK).await.unwrap();
            while socket.read(&mut buf).await.is_ok_and(|n| n > 0) {}
        });
        port
    }

    #[test]
    fn test_parse_broker_url_with_port() {
        assert_eq!(
            parse_broker_url("mqtt://broker.local:1884").unwrap(),
            BrokerAddress {
                host: "broker.local".to_string(),
                port: 1884,
                tls: false,
            }
        );
    }

    #[test]
    fn test_parse_broker_url_default_ports() {
        assert_eq!(parse_broker_url("mqtt://localhost").unwrap().port, 1883);
        let tls = parse_broker_url("mqtts://broker.example.com/").unwrap();
        assert_eq!(tls.port, 8883);
        assert!(tls.tls);
    }

    #[test]
    fn test_parse_broker_url_errors() {
        assert!(parse_broker_url("mqtt://host:notaport").is_err());
        assert!(parse_broker_url("mqtt://").is_err());
    }

    #[test]
    fn test_mqtt_options_from_config() {
        let config = MqttConfig {
            client_id: Some("velolock-test".to_string()),
            username: Some("fleet".to_string()),
            password: Some("secret".to_string()),
            ..MqttConfig::default()
        };
        let options = mqtt_options(&config).unwrap();
        assert_eq!(options.client_id(), "velolock-test");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
    }

    #[test]
    fn test_generated_client_ids_are_unique() {
        let config = MqttConfig::default();
        assert_ne!(client_id(&config), client_id(&config));
    }

    #[tokio::test]
    async fn test_publish_refused_while_disconnected() {
        let (client, _event_loop) = AsyncClient::new(test_options(1883), 4);
        let publisher = MqttPublisher::new(client);

        let err = publisher.publish("esp/commands/status/AA", "request").await.unwrap_err();
        assert!(matches!(err, PublishError::Disconnected(_)));
    }

    #[tokio::test]
    async fn test_publish_fails_fast_when_queue_full() {
        let (client, _event_loop) = AsyncClient::new(test_options(1883), 1);
        let publisher = MqttPublisher::new(client);
        publisher.set_connected(true);

        let outcome = tokio::time::timeout(Duration::from_secs(1), async {
            publisher.publish("esp/commands/status/AA", "request").await.unwrap();
            publisher.publish("esp/commands/status/AA", "request").await
        })
        .await
        .expect("publish must not wait for queue space");
        assert!(matches!(outcome, Err(PublishError::Client(_))));
    }

    #[tokio::test]
    async fn test_event_loop_drains_full_queue_after_connect() {
        let port = fake_broker().await;
        let (client, event_loop) = AsyncClient::new(test_options(port), CHANNEL_CAPACITY);
        let publisher = MqttPublisher::new(client.clone());

        // Fill the request queue before the first connection.
        for _ in 0..CHANNEL_CAPACITY {
            client
                .try_publish("esp/commands/status/AA", QoS::AtLeastOnce, false, b"request".to_vec())
                .unwrap();
        }

        let listener = tokio::spawn(run_event_loop(
            event_loop,
            publisher.clone(),
            DeviceRegistry::shared(),
            None,
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !publisher.is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            // Wait for the event loop to make room, then publish once more.
            loop {
                match publisher.publish("esp/commands/booking/AA", "book").await {
                    Ok(()) => break,
                    Err(PublishError::Client(_)) => {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Err(e) => panic!("unexpected publish error: {e}"),
                }
            }
        })
        .await
        .expect("event loop stalled after connect");

        listener.abort();
    }

    #[tokio::test]
    async fn test_handle_message_updates_registry() {
        let registry = DeviceRegistry::shared();
        let outcome = handle_message(&registry, "esp/status/aabbcc", "reserved\n", None).await;
        assert!(matches!(outcome, IngestOutcome::Applied { .. }));

        let id = DeviceId::parse("AABBCC").unwrap();
        assert_eq!(
            registry.read().await.get(&id).and_then(|r| r.state),
            Some(LifecycleState::Reserved)
        );
    }
}
