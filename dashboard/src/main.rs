use axum::{routing::get, Router};
use clap::Parser;
use dashboard::config::Config;
use dashboard::model::ConnectionStatus;
use dashboard::state::DashboardState;
use dashboard::{metrics, mqtt, rest, seed, store};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting smart bin dashboard");
    info!("MQTT broker: {}:{}", config.mqtt_broker, config.mqtt_port);
    info!("Telemetry namespace: {}", config.mqtt_namespace);
    info!("HTTP server: {}", config.http_addr);

    metrics::init_metrics();

    let mut state = DashboardState::new(config.initial_mqtt_config(), config.transition_capacity);
    if config.seed_demo {
        info!("Seeding demo roster");
        state = state
            .with_devices(seed::demo_devices())
            .with_users(seed::demo_users())
            .with_floors(seed::demo_floors());
    }

    let (store, store_task) = store::spawn_store(state, config.command_capacity);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
    let shutdown = CancellationToken::new();

    let client_id = format!("dashboard-{}", uuid::Uuid::new_v4());
    let mqtt_settings = config.mqtt_settings(client_id);
    let mqtt_store = store.clone();
    let mqtt_shutdown = shutdown.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt::run_mqtt(mqtt_settings, mqtt_store, status_tx, mqtt_shutdown).await {
            error!("MQTT task failed: {}", e);
        }
    });

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(store, status_rx));

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("HTTP server listening on {}", config.http_addr);

    let server_shutdown = shutdown.clone();
    let mut server_handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!("HTTP server error: {}", e);
        }
    });

    // Losing the broker only affects the status indicator; the API keeps serving.
    let server_finished = tokio::select! {
        _ = &mut server_handle => {
            error!("HTTP server terminated");
            true
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            false
        }
    };

    info!("Shutting down");
    shutdown.cancel();
    let _ = mqtt_handle.await;
    if !server_finished {
        let _ = server_handle.await;
    }
    // every StoreHandle is gone once the tasks above have finished
    let _ = store_task.await;

    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
