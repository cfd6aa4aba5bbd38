//! Needs a broker on localhost:1883. Run with `cargo test -- --ignored`.

use dashboard::model::{ConnectionStatus, DeviceStatus, MqttConfig};
use dashboard::mqtt::{run_mqtt, MqttSettings};
use dashboard::seed;
use dashboard::state::DashboardState;
use dashboard::store::spawn_store;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore]
async fn test_telemetry_over_broker() {
    let namespace = format!("it-{}", uuid::Uuid::new_v4());
    let state = DashboardState::new(MqttConfig::for_namespace("localhost", 1883, &namespace), 100)
        .with_devices(seed::demo_devices());
    let (store, _task) = spawn_store(state, 64);

    let (status_tx, mut status_rx) = watch::channel(ConnectionStatus::Disconnected);
    let shutdown = CancellationToken::new();
    let settings = MqttSettings {
        broker: "localhost".to_string(),
        port: 1883,
        client_id: format!("dashboard-it-{}", uuid::Uuid::new_v4()),
        namespace: namespace.clone(),
        reconnect: false,
        reconnect_delay: Duration::from_secs(1),
    };
    let pump = tokio::spawn(run_mqtt(settings, store.clone(), status_tx, shutdown.clone()));

    timeout(
        Duration::from_secs(5),
        status_rx.wait_for(|s| *s == ConnectionStatus::Connected),
    )
    .await
    .expect("dashboard did not connect")
    .unwrap();
    // give the SUBSCRIBE time to land
    sleep(Duration::from_millis(500)).await;

    let mut options = MqttOptions::new("bin-publisher-it", "localhost", 1883);
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(options, 100);
    tokio::spawn(async move {
        while eventloop.poll().await.is_ok() {}
    });

    let topic = format!("{}/bins/SB-104/telemetry", namespace);
    client
        .publish(&topic, QoS::AtLeastOnce, false, r#"{"fillLevel": 97, "batteryLevel": 8}"#)
        .await
        .unwrap();
    client
        .publish(&topic, QoS::AtLeastOnce, false, "garbage")
        .await
        .unwrap();

    let mut devices = store.subscribe_devices();
    timeout(
        Duration::from_secs(5),
        devices.wait_for(|roster| {
            roster
                .iter()
                .any(|d| d.id == "SB-104" && d.status == DeviceStatus::Critical)
        }),
    )
    .await
    .expect("telemetry never applied")
    .unwrap();

    let ids: Vec<String> = store
        .notifications()
        .iter()
        .filter(|n| n.device_id == "SB-104")
        .map(|n| n.id.clone())
        .collect();
    assert_eq!(ids, vec!["SB-104-critical-fill", "SB-104-low-battery"]);

    shutdown.cancel();
    pump.await.unwrap().unwrap();
    assert_eq!(*status_rx.borrow(), ConnectionStatus::Disconnected);
}
