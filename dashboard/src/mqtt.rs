use crate::errors::{Error, Result};
use crate::metrics::{MALFORMED_MESSAGES_TOTAL, MESSAGES_TOTAL};
use crate::model::ConnectionStatus;
use crate::store::{Incoming, StoreHandle};
use crate::telemetry::{parse_message, topic_filter};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const REQUEST_CAPACITY: usize = 100;
const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub namespace: String,
    /// Keep polling after a transport error instead of giving up
    pub reconnect: bool,
    pub reconnect_delay: Duration,
}

fn mqtt_options(settings: &MqttSettings) -> MqttOptions {
    let mut mqtt_options =
        MqttOptions::new(&settings.client_id, &settings.broker, settings.port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    // subscription is re-issued on every ConnAck
    mqtt_options.set_clean_session(true);
    mqtt_options
}

/// Subscribe to bin telemetry and feed it into the store until `shutdown`
/// fires. Connection state is published on `status`.
pub async fn run_mqtt(
    settings: MqttSettings,
    store: StoreHandle,
    status: watch::Sender<ConnectionStatus>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(
        "Connecting to MQTT broker at {}:{}",
        settings.broker, settings.port
    );
    status.send_replace(ConnectionStatus::Connecting);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options(&settings), REQUEST_CAPACITY);
    let filter = topic_filter(&settings.namespace);

    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Shutting down MQTT subscription");
                disconnect(&client, &mut eventloop).await;
                status.send_replace(ConnectionStatus::Disconnected);
                return Ok(());
            }
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
                status.send_replace(ConnectionStatus::Connected);
                client.try_subscribe(filter.as_str(), QoS::AtMostOnce)?;
                info!("Subscribed to {}", filter);
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    error!("Broker rejected subscription to {}", filter);
                    status.send_replace(ConnectionStatus::Error);
                    disconnect(&client, &mut eventloop).await;
                    return Err(Error::SubscriptionRejected(filter));
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "Received message on topic {}, size: {} bytes",
                    publish.topic,
                    publish.payload.len()
                );
                handle_publish(&settings.namespace, &store, &publish.topic, &publish.payload)
                    .await?;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT error: {}", e);
                status.send_replace(ConnectionStatus::Error);

                if !settings.reconnect {
                    return Err(Error::Connection(e));
                }

                warn!(
                    "Reconnecting in {}ms",
                    settings.reconnect_delay.as_millis()
                );
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        status.send_replace(ConnectionStatus::Disconnected);
                        return Ok(());
                    }
                    _ = tokio::time::sleep(settings.reconnect_delay) => {}
                }
                status.send_replace(ConnectionStatus::Connecting);
            }
        }
    }
}

/// Queue the DISCONNECT and poll once so it reaches the broker before the
/// socket is dropped.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_disconnect() {
        debug!("Disconnect request not sent: {}", e);
        return;
    }
    match tokio::time::timeout(DISCONNECT_TIMEOUT, eventloop.poll()).await {
        Ok(Ok(event)) => debug!("Disconnect flushed: {:?}", event),
        Ok(Err(e)) => debug!("Connection closed during disconnect: {}", e),
        Err(_) => debug!("Disconnect timed out"),
    }
}

/// Hand the raw message and its parsed form to the store in one command.
/// Malformed messages are still logged but never applied; only a stopped
/// store is an error.
async fn handle_publish(
    namespace: &str,
    store: &StoreHandle,
    topic: &str,
    payload: &[u8],
) -> Result<()> {
    MESSAGES_TOTAL.inc();

    let telemetry = match parse_message(namespace, topic, payload) {
        Ok(msg) => Some(msg),
        Err(e) => {
            MALFORMED_MESSAGES_TOTAL.inc();
            warn!(topic = %topic, "Dropping malformed telemetry: {}", e);
            None
        }
    };

    store
        .ingest(Incoming {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            telemetry,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceStatus, MqttConfig};
    use crate::seed;
    use crate::state::DashboardState;
    use crate::store::spawn_store;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    // nothing listens on port 1, so the connect is refused straight away
    fn unreachable_broker(reconnect: bool) -> MqttSettings {
        MqttSettings {
            broker: "127.0.0.1".to_string(),
            port: 1,
            client_id: "dashboard-refused".to_string(),
            namespace: "fernhill".to_string(),
            reconnect,
            reconnect_delay: Duration::from_secs(60),
        }
    }

    fn seeded_store() -> StoreHandle {
        let state = DashboardState::new(MqttConfig::for_namespace("localhost", 1883, "fernhill"), 50)
            .with_devices(seed::demo_devices());
        spawn_store(state, 16).0
    }

    #[test]
    fn test_options_from_settings() {
        let settings = MqttSettings {
            broker: "broker.local".to_string(),
            port: 1884,
            client_id: "dashboard-test".to_string(),
            namespace: "fernhill".to_string(),
            reconnect: false,
            reconnect_delay: Duration::from_secs(1),
        };
        let options = mqtt_options(&settings);
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(options.client_id(), "dashboard-test");
        assert!(options.clean_session());
    }

    #[tokio::test]
    async fn test_publish_updates_device() {
        let store = seeded_store();
        assert_ok!(
            handle_publish(
                "fernhill",
                &store,
                "fernhill/bins/SB-101/telemetry",
                br#"{"fillLevel": 86}"#,
            )
            .await
        );

        store.transitions().await.unwrap();
        let device = store.device("SB-101").unwrap();
        assert_eq!(device.fill_level, 86);
        assert_eq!(device.battery_level, 95);
        assert_eq!(device.status, DeviceStatus::Critical);
    }

    #[tokio::test]
    async fn test_malformed_publish_is_dropped() {
        let store = seeded_store();
        let before = store.devices();

        assert_ok!(
            handle_publish("fernhill", &store, "fernhill/bins/SB-101/telemetry", b"not json").await
        );
        assert_ok!(
            handle_publish(
                "fernhill",
                &store,
                "other/bins/SB-101/telemetry",
                br#"{"fillLevel": 99}"#
            )
            .await
        );

        store.transitions().await.unwrap();
        assert_eq!(*store.devices(), *before);
    }

    #[tokio::test]
    async fn test_publish_after_store_stopped() {
        let (store, task) = spawn_store(
            DashboardState::new(MqttConfig::for_namespace("localhost", 1883, "fernhill"), 50),
            16,
        );
        task.abort();
        let _ = task.await;
        assert_err!(
            handle_publish("fernhill", &store, "fernhill/bins/SB-1/telemetry", b"{}").await
        );
    }

    #[tokio::test]
    async fn test_malformed_publish_still_logged() {
        let store = seeded_store();
        store.start_logging().await.unwrap();
        handle_publish("fernhill", &store, "fernhill/bins/SB-101/telemetry", b"not json")
            .await
            .unwrap();

        let log = store.device_log().await.unwrap();
        assert_eq!(log.entries.len(), 1);
        assert_eq!(log.entries[0].payload, "not json");
    }

    #[tokio::test]
    async fn test_transport_error_without_reconnect() {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let result = timeout(
            Duration::from_secs(10),
            run_mqtt(
                unreachable_broker(false),
                seeded_store(),
                status_tx,
                CancellationToken::new(),
            ),
        )
        .await
        .expect("pump kept running after a transport error");

        assert!(matches!(result, Err(Error::Connection(_))));
        assert_eq!(*status_rx.borrow(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn test_reconnect_wait_is_cancellable() {
        let (status_tx, mut status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(run_mqtt(
            unreachable_broker(true),
            seeded_store(),
            status_tx,
            shutdown.clone(),
        ));

        timeout(
            Duration::from_secs(10),
            status_rx.wait_for(|s| *s == ConnectionStatus::Error),
        )
        .await
        .expect("transport error never reported")
        .unwrap();
        assert!(!pump.is_finished());

        shutdown.cancel();
        let result = timeout(Duration::from_secs(5), pump)
            .await
            .expect("pump ignored cancellation")
            .unwrap();
        assert_ok!(result);
        assert_eq!(*status_rx.borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_before_connect() {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = timeout(
            Duration::from_secs(5),
            run_mqtt(unreachable_broker(false), seeded_store(), status_tx, shutdown),
        )
        .await
        .expect("disconnect did not finish");
        assert_ok!(result);
        assert_eq!(*status_rx.borrow(), ConnectionStatus::Disconnected);
    }
}
