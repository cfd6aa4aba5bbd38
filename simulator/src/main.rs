mod telemetry;

use clap::Parser;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use telemetry::{telemetry_topic, SimulatedBin};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Publishes smart bin telemetry to an MQTT broker
#[derive(Debug, Parser)]
#[command(name = "simulator", version)]
struct Args {
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    mqtt_broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    mqtt_port: u16,

    #[arg(long, env = "MQTT_NAMESPACE", default_value = "fernhill")]
    mqtt_namespace: String,

    /// Messages per second across all bins
    #[arg(long, env = "RATE", default_value_t = 10)]
    rate: u64,

    /// Number of simulated bins
    #[arg(long, env = "DEVICES", default_value_t = 4)]
    devices: usize,

    /// Device id prefix; bins are numbered from 101
    #[arg(long, env = "PREFIX", default_value = "SB-")]
    prefix: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting smart bin simulator");
    info!(
        "Broker: {}:{}, Rate: {} msg/s, Devices: {}",
        args.mqtt_broker, args.mqtt_port, args.rate, args.devices
    );

    if args.rate == 0 || args.devices == 0 {
        error!("Rate and device count must both be positive");
        std::process::exit(2);
    }

    let client_id = format!("bin-sim-{}", uuid::Uuid::new_v4());

    let mut mqtt_options = MqttOptions::new(&client_id, &args.mqtt_broker, args.mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 1000);

    // Spawn eventloop handler
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                error!("MQTT eventloop error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;

    info!("Connected to MQTT broker, starting to publish telemetry");

    let mut rng = rand::thread_rng();
    let mut bins: Vec<SimulatedBin> = (0..args.devices)
        .map(|n| SimulatedBin::new(format!("{}{}", args.prefix, 101 + n), &mut rng))
        .collect();

    let mut ticker = tokio::time::interval(Duration::from_micros((1_000_000 / args.rate).max(1)));
    let mut counter = 0u64;

    loop {
        ticker.tick().await;

        let bin = &mut bins[(counter % args.devices as u64) as usize];
        bin.step(&mut rng);
        let reading = bin.reading(&mut rng);

        let topic = telemetry_topic(&args.mqtt_namespace, &bin.id);
        let payload = match serde_json::to_string(&reading) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize telemetry: {}", e);
                continue;
            }
        };

        match client.publish(&topic, QoS::AtMostOnce, false, payload).await {
            Ok(_) => {
                counter += 1;
            }
            Err(e) => {
                warn!("Failed to publish: {}", e);
            }
        }

        if counter > 0 && counter % 1000 == 0 {
            info!("Published {} messages", counter);
        }
    }
}
